//! 循环过程事件：用于 CLI 调试面板展示规划、思考、能力调用与观察

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 步数更新（已完成的往返次数）
    StepUpdate { step: usize, max_steps: usize },
    /// 规划结果
    Planning { intent: String },
    /// 正在调用模型决策
    Thinking,
    /// 调用能力
    Invocation {
        id: String,
        capability: String,
        args: serde_json::Value,
    },
    /// 能力返回（预览，避免过长）
    Observation {
        id: String,
        capability: String,
        preview: String,
    },
    /// 能力调用失败
    CapabilityFailure { capability: String, reason: String },
    Final { text: String },
    /// 超出步数预算
    Aborted { text: String },
}
