//! 决策 / 执行主循环
//!
//! DECIDE -> (Invoke) -> EXECUTE -> DECIDE ... -> DONE；步数预算耗尽时 -> ABORTED。
//! 可选 Planning 在每次 DECIDE 之前运行，不计入步数；可选 event_tx 向调试面板推送过程事件。

use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentError, AgentState, LoopState, RecoveryEngine, TerminalState};
use crate::memory::{InvocationRequest, Message};
use crate::react::{DecisionOutcome, Decider, Planner, ReactEvent};
use crate::tools::ExecutionNode;

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 一次循环所需的协作者
pub struct ReactSession<'a> {
    pub decider: &'a Decider,
    pub executor: &'a ExecutionNode,
    pub recovery: RecoveryEngine,
    /// DECIDE/EXECUTE 往返上限
    pub max_steps: usize,
    pub planner: Option<&'a Planner>,
    pub event_tx: Option<&'a UnboundedSender<ReactEvent>>,
}

impl<'a> ReactSession<'a> {
    pub fn new(decider: &'a Decider, executor: &'a ExecutionNode, max_steps: usize) -> Self {
        Self {
            decider,
            executor,
            recovery: RecoveryEngine::new(),
            max_steps,
            planner: None,
            event_tx: None,
        }
    }

    pub fn with_planner(mut self, planner: &'a Planner) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send(&self, ev: ReactEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", text.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 运行状态机直到终止；不会返回错误，所有失败都已在循环内转换
pub async fn react_loop(session: &ReactSession<'_>, state: &mut AgentState) -> TerminalState {
    loop {
        match state.phase() {
            LoopState::Decide => {
                session.send(ReactEvent::StepUpdate {
                    step: state.step_count,
                    max_steps: session.max_steps,
                });

                let snapshot = state.ledger.snapshot();
                if let Some(planner) = session.planner {
                    let plan = planner.plan(&snapshot).await;
                    session.send(ReactEvent::Planning {
                        intent: plan.intent.clone(),
                    });
                    state.plan = Some(plan);
                }

                session.send(ReactEvent::Thinking);
                match session.decider.decide(&snapshot, state.plan.as_ref()).await {
                    DecisionOutcome::Final { text } => {
                        state.ledger.append(Message::assistant(text.clone()));
                        session.send(ReactEvent::Final { text });
                        state.finish(TerminalState::Done);
                    }
                    DecisionOutcome::Invoke { requests } => {
                        if state.step_count + 1 > session.max_steps {
                            let err = AgentError::StepBudgetExceeded {
                                max_steps: session.max_steps,
                            };
                            tracing::warn!(session = %state.session_id, error = %err, "aborting turn");
                            let text = session.recovery.handle(&err).text().to_string();
                            state.ledger.append(Message::assistant(text.clone()));
                            session.send(ReactEvent::Aborted { text });
                            state.finish(TerminalState::Aborted);
                            continue;
                        }
                        for r in &requests {
                            session.send(ReactEvent::Invocation {
                                id: r.id.clone(),
                                capability: r.capability_name.clone(),
                                args: r.arguments.clone(),
                            });
                        }
                        state.ledger.append(Message::invocation(requests));
                        state.enter(LoopState::Execute);
                    }
                }
            }
            LoopState::Execute => {
                let requests: Vec<InvocationRequest> =
                    state.ledger.pending_requests().into_iter().cloned().collect();
                let records = session.executor.execute_detailed(&requests).await;
                for record in records {
                    let capability = record.message.capability_name.clone().unwrap_or_default();
                    if let Some(err) = &record.error {
                        session.send(ReactEvent::CapabilityFailure {
                            capability: capability.clone(),
                            reason: err.to_string(),
                        });
                    }
                    session.send(ReactEvent::Observation {
                        id: record.message.in_reply_to.clone().unwrap_or_default(),
                        capability,
                        preview: preview(&record.message.content),
                    });
                    state.ledger.append(record.message);
                }
                state.step_count += 1;
                state.enter(LoopState::Decide);
            }
            LoopState::Done => return TerminalState::Done,
            LoopState::Aborted => return TerminalState::Aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recovery::STEP_BUDGET_MESSAGE;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::{MessageLedger, Role};
    use crate::tools::{CapabilityRegistry, EchoTool};
    use std::sync::Arc;
    use std::time::Duration;

    fn parts(llm: ScriptedLlmClient) -> (Decider, ExecutionNode) {
        let registry = Arc::new(CapabilityRegistry::builder().register(EchoTool).build());
        let decider = Decider::new(Arc::new(llm), "test", &registry, Duration::from_secs(1));
        (decider, ExecutionNode::new(registry))
    }

    #[tokio::test]
    async fn test_direct_answer_takes_no_steps() {
        let (decider, executor) = parts(ScriptedLlmClient::texts(["Hello!"]));
        let session = ReactSession::new(&decider, &executor, 3);
        let mut state = AgentState::for_turn(MessageLedger::new(), "hi");
        assert_eq!(react_loop(&session, &mut state).await, TerminalState::Done);
        assert_eq!(state.step_count, 0);
        assert_eq!(state.final_text(), Some("Hello!"));
        assert!(state.is_terminal());
    }

    #[tokio::test]
    async fn test_events_follow_the_loop() {
        let (decider, executor) = parts(ScriptedLlmClient::texts([
            r#"{"tool": "echo", "args": {"text": "ping"}}"#,
            "pong",
        ]));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let session = ReactSession::new(&decider, &executor, 3).with_event_tx(&tx);
        let mut state = AgentState::for_turn(MessageLedger::new(), "ping please");
        react_loop(&session, &mut state).await;
        drop(session);
        drop(tx);

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert!(matches!(events[0], ReactEvent::StepUpdate { step: 0, .. }));
        assert!(events.iter().any(|e| matches!(e, ReactEvent::Invocation { capability, .. } if capability == "echo")));
        assert!(events.iter().any(|e| matches!(e, ReactEvent::Observation { preview, .. } if preview == "\"ping\"")));
        assert_eq!(
            events.last(),
            Some(&ReactEvent::Final {
                text: "pong".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_zero_budget_aborts_on_first_invoke() {
        let (decider, executor) = parts(ScriptedLlmClient::repeating(r#"{"tool": "echo"}"#));
        let session = ReactSession::new(&decider, &executor, 0);
        let mut state = AgentState::for_turn(MessageLedger::new(), "loop");
        assert_eq!(react_loop(&session, &mut state).await, TerminalState::Aborted);
        assert_eq!(state.step_count, 0);
        let last = state.ledger.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, STEP_BUDGET_MESSAGE);
        assert!(state.ledger.pending_requests().is_empty());
    }
}
