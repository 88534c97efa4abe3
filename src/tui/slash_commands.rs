//! Slash command system
//!
//! Input starting with `/` is a local command; everything else is a
//! question for the backend.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    Clear,
    Save,
    Unsave,
    Saved,
    Theme,
    Upload,
    Help,
    Quit,
}

impl ChatCommand {
    pub fn all() -> &'static [ChatCommand] {
        &[
            ChatCommand::Clear,
            ChatCommand::Save,
            ChatCommand::Unsave,
            ChatCommand::Saved,
            ChatCommand::Theme,
            ChatCommand::Upload,
            ChatCommand::Help,
            ChatCommand::Quit,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChatCommand::Clear => "clear",
            ChatCommand::Save => "save",
            ChatCommand::Unsave => "unsave",
            ChatCommand::Saved => "saved",
            ChatCommand::Theme => "theme",
            ChatCommand::Upload => "upload",
            ChatCommand::Help => "help",
            ChatCommand::Quit => "quit",
        }
    }

    pub fn usage(&self) -> &'static str {
        match self {
            ChatCommand::Save => "/save [n]",
            ChatCommand::Unsave => "/unsave <n>",
            ChatCommand::Upload => "/upload <path>",
            ChatCommand::Clear => "/clear",
            ChatCommand::Saved => "/saved",
            ChatCommand::Theme => "/theme",
            ChatCommand::Help => "/help",
            ChatCommand::Quit => "/quit",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ChatCommand::Clear => "clear the conversation",
            ChatCommand::Save => "save answer n (default: latest)",
            ChatCommand::Unsave => "remove saved message n",
            ChatCommand::Saved => "show or hide saved messages",
            ChatCommand::Theme => "switch dark/light mode",
            ChatCommand::Upload => "upload a file",
            ChatCommand::Help => "list commands",
            ChatCommand::Quit => "exit",
        }
    }

    pub fn takes_args(&self) -> bool {
        matches!(
            self,
            ChatCommand::Save | ChatCommand::Unsave | ChatCommand::Upload
        )
    }

    pub fn matches(prefix: &str) -> Vec<ChatCommand> {
        let prefix = prefix.to_lowercase();
        Self::all()
            .iter()
            .filter(|cmd| cmd.name().starts_with(&prefix))
            .copied()
            .collect()
    }

    pub fn parse(name: &str) -> Option<ChatCommand> {
        let name = name.to_lowercase();
        Self::all().iter().find(|cmd| cmd.name() == name).copied()
    }
}

impl fmt::Display for ChatCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    /// Known command with its (trimmed) argument string
    Command(ChatCommand, String),
    Unknown(String),
}

/// Parse input as a slash command; `None` for plain text
pub fn parse_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim().strip_prefix('/')?;
    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    match ChatCommand::parse(name) {
        Some(cmd) => Some(ParsedCommand::Command(cmd, args.trim().to_string())),
        None => Some(ParsedCommand::Unknown(name.to_string())),
    }
}

/// Command completion popup shown above the input box
#[derive(Debug, Clone, Default)]
pub struct SlashPopup {
    pub visible: bool,
    pub filter: String,
    pub matches: Vec<ChatCommand>,
    pub selected: usize,
}

impl SlashPopup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self) {
        self.visible = true;
        self.set_filter("");
    }

    pub fn close(&mut self) {
        self.visible = false;
        self.filter.clear();
        self.matches.clear();
        self.selected = 0;
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.filter = filter.to_string();
        self.matches = ChatCommand::matches(filter);
        if self.selected >= self.matches.len() {
            self.selected = 0;
        }
    }

    pub fn select_prev(&mut self) {
        let total = self.matches.len();
        if total > 0 {
            self.selected = (self.selected + total - 1) % total;
        }
    }

    pub fn select_next(&mut self) {
        let total = self.matches.len();
        if total > 0 {
            self.selected = (self.selected + 1) % total;
        }
    }

    /// Input text for the selected command
    pub fn complete(&self) -> Option<String> {
        self.matches.get(self.selected).map(|cmd| {
            if cmd.takes_args() {
                format!("{cmd} ")
            } else {
                cmd.to_string()
            }
        })
    }

    /// (usage, description, selected) rows for rendering
    pub fn display_items(&self) -> Vec<(&'static str, &'static str, bool)> {
        self.matches
            .iter()
            .enumerate()
            .map(|(i, cmd)| (cmd.usage(), cmd.description(), i == self.selected))
            .collect()
    }
}
