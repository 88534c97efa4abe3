//! Loading indicator sequencing
//!
//! While a request is outstanding the backend announces the stages it moves
//! through ("searching", "thinking", ...). They queue up here until the first
//! piece of the answer arrives.

use super::transcript::{Role, Transcript};

/// Presentation hint for a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseIcon {
    Thinking,
    Searching,
    Understanding,
    Documents,
    #[default]
    None,
}

impl PhaseIcon {
    /// Map a backend icon name, unknown names fall back to `None`
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "thinking" => PhaseIcon::Thinking,
            "searching" => PhaseIcon::Searching,
            "understanding" => PhaseIcon::Understanding,
            "documents" => PhaseIcon::Documents,
            _ => PhaseIcon::None,
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            PhaseIcon::Thinking => "💭",
            PhaseIcon::Searching => "🔍",
            PhaseIcon::Understanding => "🧠",
            PhaseIcon::Documents => "📄",
            PhaseIcon::None => "•",
        }
    }
}

/// One stage of producing a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorPhase {
    pub status: String,
    pub icon: PhaseIcon,
}

impl IndicatorPhase {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            icon: PhaseIcon::None,
        }
    }

    pub fn with_icon(mut self, icon: PhaseIcon) -> Self {
        self.icon = icon;
        self
    }
}

/// Ordered queue of active phases; empty when idle
#[derive(Debug, Clone, Default)]
pub struct IndicatorSequencer {
    phases: Vec<IndicatorPhase>,
}

impl IndicatorSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, phase: IndicatorPhase) {
        self.phases.push(phase);
    }

    /// Drop every queued phase
    pub fn clear(&mut self) {
        self.phases.clear();
    }

    pub fn is_active(&self) -> bool {
        !self.phases.is_empty()
    }

    pub fn phases(&self) -> &[IndicatorPhase] {
        &self.phases
    }

    /// Most recently announced phase
    pub fn current(&self) -> Option<&IndicatorPhase> {
        self.phases.last()
    }
}

/// The indicator shows only while phases are queued and the user's turn is
/// still unanswered. Recomputed on every call.
pub fn indicator_visible(indicator: &IndicatorSequencer, transcript: &Transcript) -> bool {
    indicator.is_active() && transcript.last_role() == Some(Role::User)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Turn;

    #[test]
    fn test_push_and_clear() {
        let mut indicator = IndicatorSequencer::new();
        assert!(!indicator.is_active());

        indicator.push(IndicatorPhase::new("searching"));
        indicator.push(IndicatorPhase::new("thinking"));
        assert!(indicator.is_active());
        assert_eq!(indicator.phases().len(), 2);
        assert_eq!(indicator.current().unwrap().status, "thinking");

        indicator.clear();
        assert!(!indicator.is_active());
        assert!(indicator.current().is_none());
    }

    #[test]
    fn test_visibility_needs_both_conditions() {
        let mut indicator = IndicatorSequencer::new();
        let mut transcript = Transcript::new();

        indicator.push(IndicatorPhase::new("searching"));
        // No user turn yet
        assert!(!indicator_visible(&indicator, &transcript));

        transcript.append(Turn::user("hello"));
        assert!(indicator_visible(&indicator, &transcript));

        transcript.append(Turn::assistant("hi"));
        assert!(!indicator_visible(&indicator, &transcript));
    }

    #[test]
    fn test_icon_names() {
        assert_eq!(PhaseIcon::from_name("Searching"), PhaseIcon::Searching);
        assert_eq!(PhaseIcon::from_name("documents"), PhaseIcon::Documents);
        assert_eq!(PhaseIcon::from_name("sparkles"), PhaseIcon::None);
    }
}
