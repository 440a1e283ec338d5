//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction：能力类错误喂回对话，Oracle 类错误兜底为 Final，
//! 仅步数预算耗尽终止本轮。

use crate::core::{AgentError, RecoveryAction};

/// 未知能力 tool_result 的固定开头（Oracle 下一轮据此重试）
pub const UNKNOWN_CAPABILITY_SENTINEL: &str = "Unknown capability";

/// 未知能力的完整提示：`Unknown capability '<name>'. Retry with one of the available capabilities.`
pub fn unknown_capability_message(name: &str) -> String {
    format!("{UNKNOWN_CAPABILITY_SENTINEL} '{name}'. Retry with one of the available capabilities.")
}

/// Oracle 失败 / 超时 / 空输出时的固定致歉文本
pub const ORACLE_APOLOGY: &str =
    "Sorry, I could not work out an answer this time. Please try again.";

/// 步数预算耗尽时写入账本的固定文本
pub const STEP_BUDGET_MESSAGE: &str =
    "Sorry, I could not complete your request within the step budget.";

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default, Clone)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::UnknownCapability(name) => {
                RecoveryAction::FeedBack(unknown_capability_message(name))
            }
            AgentError::Capability(e) => RecoveryAction::FeedBack(format!(
                "Error from {}: {}",
                e.capability_name, e.message
            )),
            AgentError::OracleTimeout(_) | AgentError::Llm(_) => RecoveryAction::FallbackFinal(ORACLE_APOLOGY.to_string()),
            AgentError::StepBudgetExceeded { .. } => {
                RecoveryAction::Abort(STEP_BUDGET_MESSAGE.to_string())
            }
            AgentError::ConfigError(msg) => RecoveryAction::Abort(format!("Configuration error: {msg}")),
        }
    }
}
