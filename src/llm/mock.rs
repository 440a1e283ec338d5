//! Mock / 脚本化 LLM 客户端（用于离线运行与测试，无需 API）
//!
//! - MockLlmClient：用户消息 → 请求 echo 能力；看到 tool_result 后直接把结果作为回复。
//! - ScriptedLlmClient：按顺序返回预设回复（文本 / 错误 / 延迟），并记录每次收到的上下文。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let last = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User | Role::ToolResult));

        match last {
            Some(m) if m.role == Role::ToolResult => {
                Ok(format!("Mock answer based on the observation: {}", m.content))
            }
            Some(m) => Ok(serde_json::json!({
                "tool": "echo",
                "args": { "text": format!("Echo from Mock: {}", m.content) }
            })
            .to_string()),
            None => Ok("(no input)".to_string()),
        }
    }
}

/// 脚本中的一步
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Error(LlmError),
    /// 先等待再返回文本（用于触发超时）
    Delayed(Duration, String),
}

/// 脚本化客户端：队列耗尽后若设置了 repeat 则一直返回它，否则返回 ApiError
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    repeat: Option<String>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    /// 便捷构造：全部为文本回复
    pub fn texts<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            replies
                .into_iter()
                .map(|s| ScriptedReply::Text(s.into()))
                .collect(),
        )
    }

    /// 每次都返回同一段文本
    pub fn repeating(text: impl Into<String>) -> Self {
        Self {
            repeat: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// 每次调用收到的完整上下文
    pub fn recorded_calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(ScriptedReply::Text(t)) => Ok(t),
            Some(ScriptedReply::Error(e)) => Err(e),
            Some(ScriptedReply::Delayed(d, t)) => {
                tokio::time::sleep(d).await;
                Ok(t)
            }
            None => self
                .repeat
                .clone()
                .ok_or_else(|| LlmError::ApiError("script exhausted".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_requests_echo_then_answers() {
        let mock = MockLlmClient;
        let first = mock.complete(&[Message::user("hi \"there\"")]).await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(v["tool"], "echo");
        assert_eq!(v["args"]["text"], "Echo from Mock: hi \"there\"");

        let second = mock
            .complete(&[
                Message::user("hi"),
                Message::tool_result("call_0", "echo", "\"Echo from Mock: hi\""),
            ])
            .await
            .unwrap();
        assert!(second.starts_with("Mock answer"));
    }

    #[tokio::test]
    async fn test_scripted_sequence_and_exhaustion() {
        let client = ScriptedLlmClient::new(vec![
            ScriptedReply::Text("one".to_string()),
            ScriptedReply::Error(LlmError::Timeout),
        ]);
        assert_eq!(client.complete(&[]).await.unwrap(), "one");
        assert_eq!(client.complete(&[]).await, Err(LlmError::Timeout));
        assert!(client.complete(&[]).await.is_err());
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_repeating() {
        let client = ScriptedLlmClient::repeating("again");
        for _ in 0..3 {
            assert_eq!(client.complete(&[]).await.unwrap(), "again");
        }
    }
}
