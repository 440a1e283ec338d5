//! 记忆层：单会话内存中的对话账本（持久化由调用方负责）

pub mod conversation;

pub use conversation::{InvocationRequest, Message, MessageLedger, Role};
