//! Conversation session core
//!
//! Holds the transcript, the loading indicator queue, the saved-messages
//! collection and the controller that ties the first two to a response
//! stream.

mod controller;
mod indicator;
mod saved;
pub mod stream;
mod transcript;

pub use controller::{Applied, Generation, InputRejected, SessionController, SessionState, Submission};
pub use indicator::{indicator_visible, IndicatorPhase, IndicatorSequencer, PhaseIcon};
pub use saved::SavedMessages;
pub use transcript::{Citation, Role, Transcript, Turn, TurnStatus};
