mod dto;
mod format;
mod log;
pub mod services;

pub use dto::{Completion, ComposerDraft, ConversationMessage, MessageStatus, Role};
pub use format::{format_analysis, format_saved};
pub use log::{AnalysisTicket, ConversationLog, LookupTicket, SaveTicket};
pub use services::{local_now, Session};
