pub mod actor;
pub mod messages;

pub use actor::{AnalysisContext, Orchestrator};
pub use messages::{Command, UiEvent};
