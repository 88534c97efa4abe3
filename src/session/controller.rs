//! Session controller: the state machine that owns the transcript and the
//! loading indicator.
//!
//! ```text
//! Idle --submit--> Submitting --first fragment--> Streaming --done--> Idle
//!                  Submitting --phase--> Submitting
//!   any --failed--> Idle        any --clear--> Idle (generation bumped)
//! ```
//!
//! Every request is tagged with a [`Generation`]. Events carrying any other
//! generation are dropped, so a stream abandoned by [`SessionController::clear`]
//! can never write into the fresh transcript.

use std::fmt;

use tracing::{debug, warn};

use super::indicator::{indicator_visible, IndicatorSequencer};
use super::transcript::{Citation, Role, Transcript, Turn, TurnStatus};
use crate::backend::StreamEvent;

/// Monotonic tag identifying one request attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Why a submission was refused. The caller simply ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputRejected {
    #[error("input is empty")]
    Empty,
    #[error("a request is already outstanding")]
    Busy,
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No request outstanding
    #[default]
    Idle,
    /// User turn appended, waiting for the first fragment
    Submitting,
    /// Assistant turn open and growing
    Streaming,
}

/// An accepted submission: what the caller needs to open the stream
#[derive(Debug, Clone)]
pub struct Submission {
    pub generation: Generation,
    /// Transcript snapshot including the new user turn
    pub history: Vec<Turn>,
}

/// What happened to an incoming stream event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Accepted,
    /// Wrong generation or nothing outstanding; dropped silently
    Stale,
    /// Valid generation but meaningless in the current state
    Ignored,
}

#[derive(Debug, Default)]
pub struct SessionController {
    transcript: Transcript,
    indicator: IndicatorSequencer,
    state: SessionState,
    generation: Generation,
    /// Citations announced before the answer's first fragment
    pending_citations: Vec<Citation>,
    last_error: Option<String>,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept user input and start a new request.
    pub fn submit(&mut self, input: &str) -> Result<Submission, InputRejected> {
        let text = input.trim();
        if text.is_empty() {
            return Err(InputRejected::Empty);
        }
        if self.state != SessionState::Idle {
            return Err(InputRejected::Busy);
        }

        if !self.transcript.append(Turn::user(text)) {
            // Idle always leaves the transcript sealed
            warn!("transcript refused a user turn while idle");
            return Err(InputRejected::Busy);
        }

        self.generation = self.generation.next();
        self.indicator.clear();
        self.pending_citations.clear();
        self.last_error = None;
        self.state = SessionState::Submitting;
        debug!(generation = %self.generation, "request submitted");

        Ok(Submission {
            generation: self.generation,
            history: self.transcript.turns().to_vec(),
        })
    }

    /// Feed one stream event tagged with the generation it belongs to.
    pub fn apply(&mut self, generation: Generation, event: StreamEvent) -> Applied {
        if generation != self.generation || self.state == SessionState::Idle {
            debug!(%generation, current = %self.generation, "dropping stale stream event");
            return Applied::Stale;
        }

        match (self.state, event) {
            (SessionState::Submitting, StreamEvent::Phase(phase)) => {
                debug!(status = %phase.status, "indicator phase");
                self.indicator.push(phase);
                Applied::Accepted
            }
            (SessionState::Streaming, StreamEvent::Phase(_)) => Applied::Ignored,

            (SessionState::Submitting, StreamEvent::Fragment(text)) => {
                if text.is_empty() {
                    return Applied::Ignored;
                }
                self.transcript.open_assistant();
                self.transcript.extend_open(&text);
                let pending = std::mem::take(&mut self.pending_citations);
                if !pending.is_empty() {
                    self.transcript.attach_citations(pending);
                }
                self.indicator.clear();
                self.state = SessionState::Streaming;
                debug!(generation = %self.generation, "answer started");
                Applied::Accepted
            }
            (SessionState::Streaming, StreamEvent::Fragment(text)) => {
                self.transcript.extend_open(&text);
                Applied::Accepted
            }

            (SessionState::Submitting, StreamEvent::Citations(citations)) => {
                self.pending_citations.extend(citations);
                Applied::Accepted
            }
            (SessionState::Streaming, StreamEvent::Citations(citations)) => {
                self.transcript.attach_citations(citations);
                Applied::Accepted
            }

            (state, StreamEvent::Done) => {
                if state == SessionState::Streaming {
                    self.transcript.seal(TurnStatus::Complete);
                } else {
                    warn!(generation = %self.generation, "response finished without content");
                }
                self.finish();
                Applied::Accepted
            }

            (state, StreamEvent::Failed(message)) => {
                warn!(generation = %self.generation, "response stream failed: {}", message);
                if state == SessionState::Streaming {
                    // Keep whatever arrived
                    self.transcript.seal(TurnStatus::Interrupted);
                }
                self.last_error = Some(message);
                self.finish();
                Applied::Accepted
            }

            (SessionState::Idle, _) => Applied::Stale,
        }
    }

    /// Empty the conversation and abandon any outstanding request.
    pub fn clear(&mut self) {
        if self.state != SessionState::Idle {
            debug!(generation = %self.generation, "abandoning outstanding request");
        }
        self.transcript.clear();
        self.indicator.clear();
        self.pending_citations.clear();
        self.last_error = None;
        self.state = SessionState::Idle;
        self.generation = self.generation.next();
    }

    fn finish(&mut self) {
        self.indicator.clear();
        self.pending_citations.clear();
        self.state = SessionState::Idle;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state != SessionState::Idle
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn indicator(&self) -> &IndicatorSequencer {
        &self.indicator
    }

    /// Whether the loading indicator should be drawn right now
    pub fn indicator_visible(&self) -> bool {
        indicator_visible(&self.indicator, &self.transcript)
    }

    /// Message of the most recent stream failure, cleared on the next submit
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether the newest turn is a user turn still waiting for an answer
    pub fn awaiting_answer(&self) -> bool {
        self.transcript.last_role() == Some(Role::User)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::IndicatorPhase;
    use pretty_assertions::assert_eq;

    fn visible_matches_rule(controller: &SessionController) -> bool {
        controller.indicator_visible()
            == (controller.indicator().is_active()
                && controller.transcript().last_role() == Some(Role::User))
    }

    #[test]
    fn test_hello_scenario() {
        let mut controller = SessionController::new();
        let submission = controller.submit("hello").unwrap();
        let generation = submission.generation;

        assert_eq!(controller.state(), SessionState::Submitting);
        assert_eq!(controller.transcript().len(), 1);
        assert_eq!(controller.transcript().turns()[0].content, "hello");
        assert!(!controller.indicator().is_active());

        controller.apply(generation, StreamEvent::Phase(IndicatorPhase::new("searching")));
        assert_eq!(controller.indicator().phases()[0].status, "searching");
        assert!(controller.indicator_visible());

        controller.apply(generation, StreamEvent::Fragment("Hi".into()));
        assert_eq!(controller.state(), SessionState::Streaming);
        assert_eq!(controller.transcript().len(), 2);
        assert_eq!(controller.transcript().turns()[1].role, Role::Assistant);
        assert_eq!(controller.transcript().turns()[1].content, "Hi");
        assert!(!controller.indicator().is_active());
        assert!(!controller.indicator_visible());

        controller.apply(generation, StreamEvent::Fragment(" there".into()));
        assert_eq!(controller.transcript().turns()[1].content, "Hi there");

        controller.apply(generation, StreamEvent::Done);
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.transcript().turns()[1].status, TurnStatus::Complete);
    }

    #[test]
    fn test_empty_submit_is_rejected() {
        let mut controller = SessionController::new();
        assert_eq!(controller.submit("").unwrap_err(), InputRejected::Empty);
        assert_eq!(controller.submit("   \n\t").unwrap_err(), InputRejected::Empty);
        assert!(controller.transcript().is_empty());
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn test_submit_while_busy_is_rejected() {
        let mut controller = SessionController::new();
        let first = controller.submit("first").unwrap();

        assert_eq!(controller.submit("second").unwrap_err(), InputRejected::Busy);
        assert_eq!(controller.generation(), first.generation);
        assert_eq!(controller.transcript().len(), 1);

        controller.apply(first.generation, StreamEvent::Fragment("answer".into()));
        assert_eq!(controller.submit("third").unwrap_err(), InputRejected::Busy);

        controller.apply(first.generation, StreamEvent::Done);
        assert!(controller.submit("fourth").is_ok());
    }

    #[test]
    fn test_clear_discards_stale_fragments() {
        let mut controller = SessionController::new();
        let old = controller.submit("hello").unwrap();
        controller.apply(old.generation, StreamEvent::Fragment("partial".into()));

        controller.clear();
        assert!(controller.transcript().is_empty());
        assert_eq!(controller.state(), SessionState::Idle);

        assert_eq!(
            controller.apply(old.generation, StreamEvent::Fragment("late".into())),
            Applied::Stale
        );
        assert_eq!(controller.apply(old.generation, StreamEvent::Done), Applied::Stale);
        assert!(controller.transcript().is_empty());

        // A new request must not pick up the old stream either
        let fresh = controller.submit("again").unwrap();
        assert_ne!(fresh.generation, old.generation);
        assert_eq!(
            controller.apply(old.generation, StreamEvent::Fragment("late".into())),
            Applied::Stale
        );
        assert_eq!(controller.transcript().len(), 1);
    }

    #[test]
    fn test_failure_before_phases_clears_indicator() {
        let mut controller = SessionController::new();
        let submission = controller.submit("hello").unwrap();

        controller.apply(submission.generation, StreamEvent::Failed("network".into()));
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(!controller.indicator().is_active());
        assert_eq!(controller.last_error(), Some("network"));
        assert_eq!(controller.transcript().len(), 1);
    }

    #[test]
    fn test_failure_keeps_partial_answer() {
        let mut controller = SessionController::new();
        let submission = controller.submit("hello").unwrap();
        let generation = submission.generation;

        controller.apply(generation, StreamEvent::Phase(IndicatorPhase::new("thinking")));
        controller.apply(generation, StreamEvent::Fragment("Half an".into()));
        controller.apply(generation, StreamEvent::Failed("reset".into()));

        let last = controller.transcript().last().unwrap();
        assert_eq!(last.content, "Half an");
        assert_eq!(last.status, TurnStatus::Interrupted);
        assert!(!controller.indicator().is_active());

        // Next submit clears the error
        controller.submit("retry").unwrap();
        assert!(controller.last_error().is_none());
    }

    #[test]
    fn test_phase_after_answer_started_is_ignored() {
        let mut controller = SessionController::new();
        let generation = controller.submit("hello").unwrap().generation;
        controller.apply(generation, StreamEvent::Fragment("Hi".into()));

        assert_eq!(
            controller.apply(generation, StreamEvent::Phase(IndicatorPhase::new("late"))),
            Applied::Ignored
        );
        assert!(!controller.indicator().is_active());
    }

    #[test]
    fn test_citations_before_first_fragment_are_attached() {
        let mut controller = SessionController::new();
        let generation = controller.submit("hello").unwrap().generation;
        let citation = Citation {
            source_url: "https://example.com".into(),
            source_description: String::new(),
        };

        controller.apply(generation, StreamEvent::Citations(vec![citation.clone()]));
        controller.apply(generation, StreamEvent::Fragment("Hi".into()));
        controller.apply(generation, StreamEvent::Done);

        assert_eq!(controller.transcript().last().unwrap().citations, vec![citation]);
    }

    #[test]
    fn test_done_without_content_returns_idle() {
        let mut controller = SessionController::new();
        let generation = controller.submit("hello").unwrap().generation;
        controller.apply(generation, StreamEvent::Phase(IndicatorPhase::new("searching")));
        controller.apply(generation, StreamEvent::Done);

        assert_eq!(controller.state(), SessionState::Idle);
        assert!(!controller.indicator_visible());
        assert_eq!(controller.transcript().len(), 1);
    }

    #[test]
    fn test_visibility_rule_holds_across_transitions() {
        let mut controller = SessionController::new();
        assert!(visible_matches_rule(&controller));

        let generation = controller.submit("hello").unwrap().generation;
        let events = vec![
            StreamEvent::Phase(IndicatorPhase::new("searching")),
            StreamEvent::Phase(IndicatorPhase::new("thinking")),
            StreamEvent::Fragment("Hi".into()),
            StreamEvent::Phase(IndicatorPhase::new("ignored")),
            StreamEvent::Fragment(" there".into()),
            StreamEvent::Done,
        ];
        for event in events {
            assert!(visible_matches_rule(&controller));
            controller.apply(generation, event);
            assert!(visible_matches_rule(&controller));
        }

        let generation = controller.submit("again").unwrap().generation;
        controller.apply(generation, StreamEvent::Phase(IndicatorPhase::new("searching")));
        assert!(visible_matches_rule(&controller));
        controller.clear();
        assert!(visible_matches_rule(&controller));
        assert!(!controller.indicator_visible());
    }
}
