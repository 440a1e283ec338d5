//! 对话账本：一次会话内按顺序追加的消息记录
//!
//! 只追加、不删除、不重排；顺序即语义。Decision / Planning 通过 snapshot() 拿到防御性拷贝，
//! UI 侧通过 display_messages() 按角色过滤出需要渲染的条目。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色（System 只能由程序合成，不来自用户输入）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    ToolResult,
    System,
}

/// 一次能力调用请求：id 在所属 assistant 消息内唯一
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub id: String,
    pub capability_name: String,
    pub arguments: Value,
}

impl InvocationRequest {
    pub fn new(id: impl Into<String>, capability_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            capability_name: capability_name.into(),
            arguments,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// 仅 assistant 请求能力时非空
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocation_requests: Vec<InvocationRequest>,
    /// 仅 tool_result：回应的请求 id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    /// 仅 tool_result：产生结果的能力名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            invocation_requests: Vec::new(),
            in_reply_to: None,
            capability_name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content.into())
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content.into())
    }

    /// 只携带调用请求的 assistant 消息（content 为空）
    pub fn invocation(requests: Vec<InvocationRequest>) -> Self {
        Self {
            invocation_requests: requests,
            ..Self::plain(Role::Assistant, String::new())
        }
    }

    pub fn tool_result(
        in_reply_to: impl Into<String>,
        capability_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            in_reply_to: Some(in_reply_to.into()),
            capability_name: Some(capability_name.into()),
            ..Self::plain(Role::ToolResult, content.into())
        }
    }

    pub fn requests_capabilities(&self) -> bool {
        self.role == Role::Assistant && !self.invocation_requests.is_empty()
    }

    /// 面向用户的最终回复（assistant 且不含调用请求）
    pub fn is_final_reply(&self) -> bool {
        self.role == Role::Assistant && self.invocation_requests.is_empty()
    }
}

/// 会话账本：只追加的有序消息序列
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageLedger {
    messages: Vec<Message>,
}

impl MessageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// 防御性拷贝，交给 Oracle 组装上下文
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 最近一条 assistant 消息中尚未被 tool_result 回应的请求（按原顺序）
    pub fn pending_requests(&self) -> Vec<&InvocationRequest> {
        let Some(idx) = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant)
        else {
            return Vec::new();
        };
        let answered: HashSet<&str> = self.messages[idx + 1..]
            .iter()
            .filter(|m| m.role == Role::ToolResult)
            .filter_map(|m| m.in_reply_to.as_deref())
            .collect();
        self.messages[idx]
            .invocation_requests
            .iter()
            .filter(|r| !answered.contains(r.id.as_str()))
            .collect()
    }

    /// UI 过滤：只保留用户输入与最终回复
    pub fn display_messages(&self) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User || m.is_final_reply())
            .collect()
    }
}
