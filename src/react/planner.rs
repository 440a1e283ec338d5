//! Planning 节点：在 DECIDE 之前做一次意图分析，结果作为附加上下文交给 Decider
//!
//! 规划失败（调用出错、超时、输出无法解析）时给出中性 Plan，绝不阻塞 DECIDE。

use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::llm::{find_json_span, LlmClient};
use crate::memory::Message;

/// 结构化意图摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// 用户意图，如 "route", "find_places", "small_talk"
    pub intent: String,
    #[serde(default)]
    pub rationale: String,
    /// 建议使用的能力名
    #[serde(default)]
    pub recommended_capabilities: Vec<String>,
}

impl Plan {
    /// 规划失败时的中性结果
    pub fn neutral() -> Self {
        Self {
            intent: "unknown".to_string(),
            rationale: String::new(),
            recommended_capabilities: Vec::new(),
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.intent == "unknown" && self.recommended_capabilities.is_empty()
    }

    /// 供 Decider 前置的 system 消息
    pub fn as_system_message(&self) -> Message {
        let mut text = format!("Current plan\nIntent: {}", self.intent);
        if !self.rationale.is_empty() {
            text.push_str(&format!("\nRationale: {}", self.rationale));
        }
        if !self.recommended_capabilities.is_empty() {
            text.push_str(&format!(
                "\nRecommended capabilities: {}",
                self.recommended_capabilities.join(", ")
            ));
        }
        Message::system(text)
    }
}

/// 解析规划输出；intent 为空视为无法解析
pub fn parse_plan(raw: &str) -> Option<Plan> {
    let span = find_json_span(raw, '{', '}')?;
    let plan: Plan = serde_json::from_str(span).ok()?;
    (!plan.intent.trim().is_empty()).then_some(plan)
}

const PLANNING_PROMPT: &str = "You analyse a conversation with a travel assistant before it answers.\n\
Describe what the user wants in the latest turn and which capabilities could help.\n\
Respond ONLY with JSON: {\"intent\": \"...\", \"rationale\": \"...\", \"recommended_capabilities\": [\"...\"]}";

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    capability_names: Vec<String>,
    timeout: Duration,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, capability_names: Vec<String>, timeout: Duration) -> Self {
        Self {
            llm,
            capability_names,
            timeout,
        }
    }

    fn context(&self, snapshot: &[Message]) -> Vec<Message> {
        let system = format!(
            "{}\nAvailable capabilities: {}",
            PLANNING_PROMPT,
            self.capability_names.join(", ")
        );
        let mut messages = Vec::with_capacity(snapshot.len() + 1);
        messages.push(Message::system(system));
        messages.extend(snapshot.iter().filter(|m| m.role != crate::memory::Role::System).cloned());
        messages
    }

    /// 规划；任何失败都退回 Plan::neutral()
    pub async fn plan(&self, snapshot: &[Message]) -> Plan {
        let raw = match tokio::time::timeout(self.timeout, self.llm.complete(&self.context(snapshot))).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "planning call failed, using neutral plan");
                return Plan::neutral();
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "planning timed out, using neutral plan");
                return Plan::neutral();
            }
        };

        match parse_plan(&raw) {
            Some(mut plan) => {
                plan.recommended_capabilities
                    .retain(|c| self.capability_names.iter().any(|n| n == c));
                plan
            }
            None => {
                tracing::warn!("planning output unparsable, using neutral plan");
                Plan::neutral()
            }
        }
    }
}
