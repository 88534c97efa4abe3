//! Color theme for the TUI - ANSI colors, one palette per theme mode

use ratatui::style::{Color, Modifier, Style};

use crate::config::ThemeMode;

/// Palette for the active [`ThemeMode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    mode: ThemeMode,
    accent: Color,
    text: Color,
    muted: Color,
    user: Color,
    assistant: Color,
    badge_fg: Color,
}

impl Theme {
    pub fn new(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Dark => Self {
                mode,
                accent: Color::Cyan,
                text: Color::Reset,
                muted: Color::DarkGray,
                user: Color::Cyan,
                assistant: Color::Green,
                badge_fg: Color::Black,
            },
            ThemeMode::Light => Self {
                mode,
                accent: Color::Blue,
                text: Color::Black,
                muted: Color::Gray,
                user: Color::Blue,
                assistant: Color::Magenta,
                badge_fg: Color::White,
            },
        }
    }

    pub fn mode(&self) -> ThemeMode {
        self.mode
    }

    /// Glyph shown next to the theme toggle
    pub fn mode_glyph(&self) -> &'static str {
        match self.mode {
            ThemeMode::Dark => "☾",
            ThemeMode::Light => "☀",
        }
    }

    pub fn title(&self) -> Style {
        Style::default().fg(self.accent).add_modifier(Modifier::BOLD)
    }

    pub fn text(&self) -> Style {
        Style::default().fg(self.text)
    }

    pub fn dim(&self) -> Style {
        Style::default().add_modifier(Modifier::DIM)
    }

    pub fn accent(&self) -> Style {
        Style::default().fg(self.accent)
    }

    pub fn muted(&self) -> Style {
        Style::default().fg(self.muted)
    }

    pub fn success(&self) -> Style {
        Style::default().fg(Color::Green)
    }

    pub fn warning(&self) -> Style {
        Style::default().fg(Color::Yellow)
    }

    pub fn error(&self) -> Style {
        Style::default().fg(Color::Red)
    }

    pub fn code(&self) -> Style {
        match self.mode {
            ThemeMode::Dark => Style::default().fg(Color::Yellow),
            ThemeMode::Light => Style::default().fg(Color::Red),
        }
    }

    pub fn link(&self) -> Style {
        Style::default()
            .fg(self.accent)
            .add_modifier(Modifier::UNDERLINED)
    }

    pub fn border(&self) -> Style {
        Style::default().fg(self.muted)
    }

    pub fn border_focused(&self) -> Style {
        Style::default().fg(self.accent)
    }

    pub fn user_badge(&self) -> Style {
        Style::default()
            .bg(self.user)
            .fg(self.badge_fg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn assistant_badge(&self) -> Style {
        Style::default()
            .bg(self.assistant)
            .fg(self.badge_fg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn thinking(&self) -> Style {
        Style::default().fg(self.muted).add_modifier(Modifier::ITALIC)
    }

    pub fn key(&self) -> Style {
        Style::default().fg(self.accent).add_modifier(Modifier::BOLD)
    }

    pub fn key_desc(&self) -> Style {
        Style::default().fg(self.muted)
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::new(ThemeMode::default())
    }
}
