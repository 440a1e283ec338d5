//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock / 脚本化）

pub mod mock;
pub mod openai;
pub mod parse;
pub mod traits;

pub use mock::{MockLlmClient, ScriptedLlmClient, ScriptedReply};
pub use openai::OpenAiClient;
pub use parse::{find_json_span, strip_code_fence, unwrap_code_fence};
pub use traits::{LlmClient, LlmError};
