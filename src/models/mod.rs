pub mod analysis;
pub mod conversation;
pub mod enums;

pub use analysis::AnalysisRecord;
pub use conversation::{Conversation, Message};
pub use enums::{MessageRole, UploadKind};
