mod dedup;
mod dispatch;
mod error;
mod followup;
mod premeeting;

pub use dedup::{request_fingerprint, DedupDecision, DedupGuard};
pub use dispatch::{DispatchOutcome, MeetingDispatcher};
pub use error::ClarifyError;
pub use followup::ChatFollowupController;
pub use premeeting::{
    render_enriched_task, CompleteOutcome, InitOutcome, IterateOutcome, PreMeetingOrchestrator,
    MAX_USER_TURNS,
};
