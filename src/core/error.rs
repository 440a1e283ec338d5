//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：除步数预算耗尽外，所有错误都在循环内被转成对话上下文或兜底回复。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

/// 错误信息最多保留的字符数（避免把大段内部诊断喂回 Oracle）
const MAX_ERROR_CHARS: usize = 300;

/// 能力调用失败的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityErrorKind {
    /// 注册表中不存在该能力
    Unknown,
    /// 参数不符合声明的输入结构
    InvalidArguments,
    /// 能力自身返回错误
    Failed,
    /// 能力实现 panic
    Panicked,
    /// 超过调用超时
    Timeout,
}

/// 能力调用错误：message 已经过清洗（单行、限长）
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{capability_name}: {message}")]
pub struct CapabilityError {
    pub capability_name: String,
    pub kind: CapabilityErrorKind,
    pub message: String,
}

impl CapabilityError {
    pub fn new(
        capability_name: impl Into<String>,
        kind: CapabilityErrorKind,
        message: impl AsRef<str>,
    ) -> Self {
        Self {
            capability_name: capability_name.into(),
            kind,
            message: sanitize_message(message.as_ref()),
        }
    }

    pub fn unknown(capability_name: &str) -> Self {
        Self::new(capability_name, CapabilityErrorKind::Unknown, "capability is not registered")
    }

    pub fn invalid_arguments(capability_name: &str, detail: impl AsRef<str>) -> Self {
        Self::new(
            capability_name,
            CapabilityErrorKind::InvalidArguments,
            format!("invalid arguments: {}", detail.as_ref()),
        )
    }

    pub fn failed(capability_name: &str, detail: impl AsRef<str>) -> Self {
        Self::new(capability_name, CapabilityErrorKind::Failed, detail)
    }

    pub fn panicked(capability_name: &str, detail: impl AsRef<str>) -> Self {
        Self::new(
            capability_name,
            CapabilityErrorKind::Panicked,
            format!("capability crashed: {}", detail.as_ref()),
        )
    }

    pub fn timeout(capability_name: &str, after: Duration) -> Self {
        Self::new(
            capability_name,
            CapabilityErrorKind::Timeout,
            format!("timed out after {}s", after.as_secs_f32()),
        )
    }
}

/// 只保留首个非空行并截断，去掉堆栈等内部细节
pub fn sanitize_message(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown error");
    if line.chars().count() > MAX_ERROR_CHARS {
        format!("{}...", line.chars().take(MAX_ERROR_CHARS).collect::<String>())
    } else {
        line.to_string()
    }
}

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Oracle timeout after {0:?}")]
    OracleTimeout(Duration),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Step budget exceeded (max {max_steps} round trips)")]
    StepBudgetExceeded { max_steps: usize },

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 恢复引擎根据错误类型给出的动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 作为 tool_result 内容喂回下一轮 DECIDE
    FeedBack(String),
    /// 以固定文本作为 Final 结束本轮
    FallbackFinal(String),
    /// 终止本轮（ABORTED），附带面向用户的固定文本
    Abort(String),
}

impl RecoveryAction {
    pub fn text(&self) -> &str {
        match self {
            RecoveryAction::FeedBack(t)
            | RecoveryAction::FallbackFinal(t)
            | RecoveryAction::Abort(t) => t,
        }
    }
}
