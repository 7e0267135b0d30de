//! 宿主聊天协作者：消息模型、索引辅助、生成目标、待定元数据、生成令牌与内联追踪器

pub mod inline;
pub mod message;
pub mod mutex;
pub mod session;

pub use message::{
    is_system_message, last_message_with_tracker, last_non_system_index, next_non_system_index,
    previous_non_system_index, ChatMessage,
};
pub use mutex::GenerationMutex;
pub use session::{
    should_generate_tracker, should_show_popup, ChatLog, ChatMetadata, GenerationKind,
    GenerationTarget, InMemoryChat,
};
