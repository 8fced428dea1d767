mod record;
mod state;

pub use record::{RunOutcome, RunRecord};
pub use state::{RunState, StateMachine};
