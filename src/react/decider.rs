//! 决策适配器：包装 Oracle 调用，把原始输出分类为 Final 或 Invoke
//!
//! 分类是纯函数：同样的原始文本总得到同样的结果（调用 id 也是按序号确定性生成）。
//! 只认三种合法的调用格式（可整体包在 ```json 代码块里；代码块外夹带文字时按最终回复处理）：
//! - `{"tool": "...", "args": {...}}`
//! - `[{"tool": ...}, ...]`
//! - `{"invocations": [{"id": "...", "tool": ..., "args": ...}, ...]}`
//!
//! 其余一律视为最终回复原文；空输出与调用失败 / 超时给出固定致歉文本。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::core::recovery::ORACLE_APOLOGY;
use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::llm::{unwrap_code_fence, LlmClient, LlmError};
use crate::memory::{InvocationRequest, Message};
use crate::react::Plan;
use crate::tools::{invocation_schema_json, CapabilityRegistry};

/// 决策结果
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    Final { text: String },
    Invoke { requests: Vec<InvocationRequest> },
}

#[derive(Debug, Deserialize)]
struct RawInvocation {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "name", alias = "capability")]
    tool: String,
    #[serde(default, alias = "arguments")]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InvocationPayload {
    Batch { invocations: Vec<RawInvocation> },
    List(Vec<RawInvocation>),
    Single(RawInvocation),
}

impl InvocationPayload {
    fn into_list(self) -> Vec<RawInvocation> {
        match self {
            InvocationPayload::Batch { invocations } => invocations,
            InvocationPayload::List(list) => list,
            InvocationPayload::Single(one) => vec![one],
        }
    }
}

fn well_formed(list: &[RawInvocation]) -> bool {
    !list.is_empty()
        && list
            .iter()
            .all(|r| !r.tool.trim().is_empty() && (r.args.is_object() || r.args.is_null()))
}

/// 分类原始输出（纯函数）
pub fn classify(raw: &str) -> DecisionOutcome {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DecisionOutcome::Final {
            text: ORACLE_APOLOGY.to_string(),
        };
    }

    let body = unwrap_code_fence(trimmed).unwrap_or(trimmed);
    let list = if body.starts_with('{') || body.starts_with('[') {
        serde_json::from_str::<InvocationPayload>(body)
            .ok()
            .map(InvocationPayload::into_list)
            .filter(|l| well_formed(l))
    } else {
        None
    };

    match list {
        Some(list) => DecisionOutcome::Invoke {
            requests: assign_ids(list),
        },
        None => DecisionOutcome::Final {
            text: trimmed.to_string(),
        },
    }
}

/// 缺失或重复的 id 以 call_<序号> 代替；仍冲突时追加后缀
fn assign_ids(list: Vec<RawInvocation>) -> Vec<InvocationRequest> {
    let explicit: HashSet<String> = list
        .iter()
        .filter_map(|r| r.id.as_deref().map(str::trim))
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();
    let mut used: HashSet<String> = HashSet::new();

    list.into_iter()
        .enumerate()
        .map(|(i, raw)| {
            let wanted = raw
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty() && !used.contains(*id))
                .map(String::from);
            let id = match wanted {
                Some(id) => id,
                None => {
                    let base = format!("call_{i}");
                    let mut id = base.clone();
                    let mut n = 1;
                    while used.contains(&id) || explicit.contains(&id) {
                        id = format!("{base}_{n}");
                        n += 1;
                    }
                    id
                }
            };
            used.insert(id.clone());
            let args = if raw.args.is_null() {
                Value::Object(Default::default())
            } else {
                raw.args
            };
            InvocationRequest::new(id, raw.tool.trim(), args)
        })
        .collect()
}

/// 决策适配器
pub struct Decider {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    timeout: Duration,
    recovery: RecoveryEngine,
}

impl Decider {
    /// system prompt = 基础提示 + 能力清单（名称 / 描述 / 参数 schema）+ 调用格式
    pub fn new(
        llm: Arc<dyn LlmClient>,
        base_prompt: &str,
        registry: &CapabilityRegistry,
        timeout: Duration,
    ) -> Self {
        let system_prompt = format!(
            "{}\n\n## Available capabilities\n{}\n\n## Calling capabilities\n\
             To call capabilities, respond ONLY with JSON in this shape (several calls may be batched):\n{}\n\
             A single call may also be written as {{\"tool\": \"name\", \"args\": {{...}}}}.\n\
             Results arrive as observations in the next turn. When you can answer, reply in plain text.",
            base_prompt.trim(),
            registry.to_schema_json(),
            invocation_schema_json()
        );
        Self {
            llm,
            system_prompt,
            timeout,
            recovery: RecoveryEngine::new(),
        }
    }

    /// Oracle 输入：system prompt，可选的 plan system 消息，然后是账本快照
    pub fn build_context(&self, snapshot: &[Message], plan: Option<&Plan>) -> Vec<Message> {
        let mut messages = Vec::with_capacity(snapshot.len() + 2);
        messages.push(Message::system(self.system_prompt.clone()));
        if let Some(plan) = plan {
            messages.push(plan.as_system_message());
        }
        messages.extend_from_slice(snapshot);
        messages
    }

    pub async fn decide(&self, snapshot: &[Message], plan: Option<&Plan>) -> DecisionOutcome {
        let context = self.build_context(snapshot, plan);
        let result = match tokio::time::timeout(self.timeout, self.llm.complete(&context)).await {
            Ok(Ok(raw)) => return classify(&raw),
            Ok(Err(e)) => AgentError::from(e),
            Err(_) => AgentError::OracleTimeout(self.timeout),
        };

        match &result {
            AgentError::Llm(LlmError::RateLimited(detail)) => {
                tracing::warn!(detail = %detail, "oracle rate limited")
            }
            AgentError::Llm(LlmError::Timeout) | AgentError::OracleTimeout(_) => {
                tracing::warn!(error = %result, "oracle timed out")
            }
            _ => tracing::warn!(error = %result, "oracle call failed"),
        }
        match self.recovery.handle(&result) {
            RecoveryAction::FallbackFinal(text) => DecisionOutcome::Final { text },
            other => DecisionOutcome::Final {
                text: other.text().to_string(),
            },
        }
    }
}
