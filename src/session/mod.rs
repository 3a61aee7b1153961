pub mod export;
pub mod manager;

pub use manager::{AnalysisSession, Conversation, SessionError, WizardStep};
