//! Shared vocabulary for the ambient companion: identifiers, the injected
//! clock, the completion and messaging boundaries, memory document names and
//! conversation transcripts.

pub mod clock;
pub mod completion;
pub mod documents;
pub mod errors;
pub mod ids;
pub mod messaging;
pub mod transcript;

pub use clock::{Clock, ManualClock, SystemClock};
pub use completion::{CompletionRequest, CompletionService, ModelTier};
pub use documents::{DocumentName, MemorySnapshot};
pub use errors::{CompletionError, MessagingError};
pub use ids::{CycleId, SessionId};
pub use messaging::{Messenger, UserId};
pub use transcript::{Transcript, Turn};
