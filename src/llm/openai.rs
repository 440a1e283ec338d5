//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。
//! 账本中的调用请求与 tool_result 以文本形式回放给模型：请求渲染为 JSON，结果渲染为 Observation。

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// 限流错误的 code / type 标记（OpenAI 与多数兼容端点一致）
const RATE_LIMIT_MARKERS: [&str; 3] = ["rate_limit_exceeded", "insufficient_quota", "rate_limit"];

fn is_rate_limit(code: Option<&str>, kind: Option<&str>) -> bool {
    [code, kind]
        .into_iter()
        .flatten()
        .any(|v| RATE_LIMIT_MARKERS.iter().any(|m| v.eq_ignore_ascii_case(m)))
}

/// async_openai 错误归类：请求超时、限流单独标出，其余按 API / 请求错误处理
fn map_openai_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) if e.is_timeout() => LlmError::Timeout,
        OpenAIError::ApiError(api) if is_rate_limit(api.code.as_deref(), api.r#type.as_deref()) => {
            LlmError::RateLimited(api.message)
        }
        OpenAIError::InvalidArgument(msg) => LlmError::InvalidRequest(msg),
        other => LlmError::ApiError(other.to_string()),
    }
}

/// 将 assistant 的调用请求渲染为与 Decider 解析格式一致的 JSON
pub fn render_invocations(msg: &Message) -> String {
    let invocations: Vec<serde_json::Value> = msg
        .invocation_requests
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "tool": r.capability_name,
                "args": r.arguments,
            })
        })
        .collect();
    serde_json::json!({ "invocations": invocations }).to_string()
}

/// tool_result 回放为 user 消息时的文本
pub fn render_observation(msg: &Message) -> String {
    format!(
        "Observation [{}] from {}: {}",
        msg.in_reply_to.as_deref().unwrap_or("?"),
        msg.capability_name.as_deref().unwrap_or("capability"),
        msg.content
    )
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，complete 时转 Message 为 API 格式并取首条 content
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let invalid = |e: OpenAIError| LlmError::InvalidRequest(e.to_string());
        messages
            .iter()
            .map(|m| {
                let msg = match m.role {
                    Role::System => ChatCompletionRequestMessage::System(
                        ChatCompletionRequestSystemMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(invalid)?,
                    ),
                    Role::User => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(invalid)?,
                    ),
                    Role::ToolResult => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(render_observation(m))
                            .build()
                            .map_err(invalid)?,
                    ),
                    Role::Assistant => {
                        let content = if m.requests_capabilities() {
                            render_invocations(m)
                        } else {
                            m.content.clone()
                        };
                        ChatCompletionRequestMessage::Assistant(
                            ChatCompletionRequestAssistantMessageArgs::default()
                                .content(content)
                                .build()
                                .map_err(invalid)?,
                        )
                    }
                };
                Ok(msg)
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(messages)?)
            .build()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "oracle usage"
            );
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }
}
