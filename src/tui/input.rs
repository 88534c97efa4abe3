//! Input line editing for the TUI

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Result of handling a key event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    None,
    /// Enter pressed with a non-empty buffer
    Submit(String),
    /// Ctrl+C / Ctrl+D
    Quit,
    /// Ctrl+L, the "clear the chat" shortcut
    ClearChat,
    /// Ctrl+T
    ToggleTheme,
    /// F2
    ToggleSaved,
    ScrollUp,
    ScrollDown,
    /// Buffer changed by typing or deleting
    Edited,
    Tab,
    Escape,
}

/// Single-line input buffer with history.
///
/// `cursor` is a character index, not a byte index, so multi-byte input
/// edits correctly.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    pub buffer: String,
    pub cursor: usize,
    history: Vec<String>,
    /// `None` while editing fresh input
    history_index: Option<usize>,
    /// Fresh input stashed while browsing history
    saved_input: String,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    fn char_count(&self) -> usize {
        self.buffer.chars().count()
    }

    fn char_to_byte_index(&self, char_idx: usize) -> usize {
        self.buffer
            .char_indices()
            .nth(char_idx)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.buffer.len())
    }

    fn insert_char(&mut self, c: char) {
        let byte_idx = self.char_to_byte_index(self.cursor);
        self.buffer.insert(byte_idx, c);
        self.cursor += 1;
    }

    fn remove_char_before_cursor(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.remove_char_at_cursor();
        }
    }

    fn remove_char_at_cursor(&mut self) {
        let byte_idx = self.char_to_byte_index(self.cursor);
        if let Some(ch) = self.buffer[byte_idx..].chars().next() {
            self.buffer.replace_range(byte_idx..byte_idx + ch.len_utf8(), "");
        }
    }

    /// Handle a key event and return the action for the app
    pub fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('d') if ctrl => InputAction::Quit,
            KeyCode::Char('l') if ctrl => InputAction::ClearChat,
            KeyCode::Char('t') if ctrl => InputAction::ToggleTheme,
            KeyCode::F(2) => InputAction::ToggleSaved,

            KeyCode::Enter => {
                if self.buffer.trim().is_empty() {
                    return InputAction::None;
                }
                let input = std::mem::take(&mut self.buffer);
                self.history.push(input.clone());
                self.cursor = 0;
                self.history_index = None;
                InputAction::Submit(input)
            }

            KeyCode::Backspace => {
                self.remove_char_before_cursor();
                InputAction::Edited
            }
            KeyCode::Delete => {
                self.remove_char_at_cursor();
                InputAction::Edited
            }
            KeyCode::Char('u') if ctrl => {
                self.buffer.clear();
                self.cursor = 0;
                InputAction::Edited
            }
            KeyCode::Char('w') if ctrl => {
                self.delete_word();
                InputAction::Edited
            }

            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
                InputAction::None
            }
            KeyCode::Right => {
                if self.cursor < self.char_count() {
                    self.cursor += 1;
                }
                InputAction::None
            }
            KeyCode::Home => {
                self.cursor = 0;
                InputAction::None
            }
            KeyCode::Char('a') if ctrl => {
                self.cursor = 0;
                InputAction::None
            }
            KeyCode::End => {
                self.cursor = self.char_count();
                InputAction::None
            }
            KeyCode::Char('e') if ctrl => {
                self.cursor = self.char_count();
                InputAction::None
            }

            KeyCode::Up => {
                self.history_prev();
                InputAction::Edited
            }
            KeyCode::Down => {
                self.history_next();
                InputAction::Edited
            }
            KeyCode::PageUp => InputAction::ScrollUp,
            KeyCode::PageDown => InputAction::ScrollDown,

            KeyCode::Tab => InputAction::Tab,
            KeyCode::Esc => InputAction::Escape,

            KeyCode::Char(c) if !ctrl => {
                self.insert_char(c);
                InputAction::Edited
            }

            _ => InputAction::None,
        }
    }

    /// Text after `/` up to the first space, if the buffer is a command
    pub fn slash_prefix(&self) -> Option<&str> {
        let rest = self.buffer.strip_prefix('/')?;
        Some(rest.split(' ').next().unwrap_or(""))
    }

    /// Replace the buffer (autocomplete, restoring rejected input)
    pub fn set_buffer(&mut self, content: &str) {
        self.buffer = content.to_string();
        self.cursor = self.char_count();
    }

    fn delete_word(&mut self) {
        let chars: Vec<char> = self.buffer.chars().collect();
        let mut start = self.cursor.min(chars.len());
        while start > 0 && chars[start - 1] == ' ' {
            start -= 1;
        }
        while start > 0 && chars[start - 1] != ' ' {
            start -= 1;
        }
        let from = self.char_to_byte_index(start);
        let to = self.char_to_byte_index(self.cursor);
        self.buffer.replace_range(from..to, "");
        self.cursor = start;
    }

    fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let next = match self.history_index {
            None => {
                self.saved_input = self.buffer.clone();
                0
            }
            Some(i) if i + 1 < self.history.len() => i + 1,
            Some(i) => i,
        };
        self.history_index = Some(next);
        let entry = self.history[self.history.len() - 1 - next].clone();
        self.set_buffer(&entry);
    }

    fn history_next(&mut self) {
        match self.history_index {
            Some(0) => {
                self.history_index = None;
                let stashed = std::mem::take(&mut self.saved_input);
                self.set_buffer(&stashed);
            }
            Some(i) => {
                self.history_index = Some(i - 1);
                let entry = self.history[self.history.len() - i].clone();
                self.set_buffer(&entry);
            }
            None => {}
        }
    }

    /// Cursor position in terminal columns (wide characters take two)
    pub fn cursor_display_width(&self) -> usize {
        self.buffer
            .chars()
            .take(self.cursor)
            .map(|c| unicode_width::UnicodeWidthChar::width(c).unwrap_or(0))
            .sum()
    }
}
