//! 编排器：把 Decider / ExecutionNode / 可选 Planner 接成有界的状态机
//!
//! 对外只暴露 submit(user_text, prior_ledger) -> TurnOutcome；
//! spawn_session 建立 cmd/state 两条通道，在后台任务中串行消费用户命令（Submit/Clear/Quit）并更新 UI 状态。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::config::AppConfig;
use crate::core::{AgentPhase, AgentState, TerminalState, UiState};
use crate::llm::LlmClient;
use crate::memory::MessageLedger;
use crate::react::{react_loop, Decider, Planner, ReactEvent, ReactSession};
use crate::tools::{CapabilityRegistry, ExecutionNode};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Explorer, a friendly travel assistant for Budapest. \
Help with public transport routes, places to visit and itineraries. \
Use the available capabilities when you need live route or place data; otherwise answer directly.";

/// 循环参数
#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub max_steps: usize,
    pub planning_enabled: bool,
    pub parallel_execution: bool,
    pub max_concurrent_capabilities: usize,
    /// Oracle 单次调用超时
    pub decision_timeout: Duration,
    pub system_prompt: String,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_steps: 5,
            planning_enabled: false,
            parallel_execution: true,
            max_concurrent_capabilities: 3,
            decision_timeout: Duration::from_secs(60),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl LoopOptions {
    pub fn from_config(cfg: &AppConfig, system_prompt: impl Into<String>) -> Self {
        Self {
            max_steps: cfg.agent.max_steps,
            planning_enabled: cfg.agent.planning_enabled,
            parallel_execution: cfg.agent.parallel_execution,
            max_concurrent_capabilities: cfg.agent.max_concurrent_capabilities,
            decision_timeout: Duration::from_secs(cfg.llm.timeouts.request),
            system_prompt: system_prompt.into(),
        }
    }
}

/// 一轮处理的结果
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub ledger: MessageLedger,
    pub final_text: String,
    pub terminal_state: TerminalState,
    pub step_count: usize,
}

pub struct Orchestrator {
    decider: Decider,
    executor: ExecutionNode,
    planner: Option<Planner>,
    max_steps: usize,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<CapabilityRegistry>, options: LoopOptions) -> Self {
        let decider = Decider::new(
            llm.clone(),
            &options.system_prompt,
            &registry,
            options.decision_timeout,
        );
        let planner = options
            .planning_enabled
            .then(|| Planner::new(llm, registry.names(), options.decision_timeout));
        let mut executor = ExecutionNode::new(registry);
        if options.parallel_execution {
            executor = executor.with_parallelism(options.max_concurrent_capabilities);
        }
        Self {
            decider,
            executor,
            planner,
            max_steps: options.max_steps,
        }
    }

    fn session<'a>(&'a self, event_tx: Option<&'a mpsc::UnboundedSender<ReactEvent>>) -> ReactSession<'a> {
        let mut session = ReactSession::new(&self.decider, &self.executor, self.max_steps);
        if let Some(planner) = &self.planner {
            session = session.with_planner(planner);
        }
        if let Some(tx) = event_tx {
            session = session.with_event_tx(tx);
        }
        session
    }

    /// 调用方边界：提交一条用户输入，返回更新后的账本与最终回复
    pub async fn submit(&self, user_text: &str, prior_ledger: MessageLedger) -> TurnOutcome {
        self.submit_with_events(user_text, prior_ledger, None).await
    }

    pub async fn submit_with_events(
        &self,
        user_text: &str,
        prior_ledger: MessageLedger,
        event_tx: Option<&mpsc::UnboundedSender<ReactEvent>>,
    ) -> TurnOutcome {
        let mut state = AgentState::for_turn(prior_ledger, user_text);
        let span = tracing::info_span!("turn", session = %state.session_id);
        async move {
            tracing::info!(ledger_len = state.ledger.len(), "turn started");
            let terminal_state = react_loop(&self.session(event_tx), &mut state).await;
            let final_text = state.final_text().unwrap_or_default().to_string();
            tracing::info!(
                terminal = ?terminal_state,
                steps = state.step_count,
                "turn finished"
            );
            TurnOutcome {
                final_text,
                terminal_state,
                step_count: state.step_count,
                ledger: state.ledger,
            }
        }
        .instrument(span)
        .await
    }
}

/// 从 UI 发往会话任务的命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 提交用户输入，触发一轮循环
    Submit(String),
    /// 清空对话
    Clear,
    Quit,
}

/// 启动后台会话任务：返回命令发送端与状态接收端。
/// 同一会话的轮次在任务内串行处理，账本只由该任务持有。
pub fn spawn_session(
    orchestrator: Arc<Orchestrator>,
) -> (mpsc::UnboundedSender<Command>, watch::Receiver<UiState>) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (state_tx, state_rx) = watch::channel(UiState::default());

    tokio::spawn(async move {
        let mut ledger = MessageLedger::new();
        let mut turn: u64 = 0;

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                Command::Submit(input) => {
                    state_tx.send_modify(|s| {
                        s.phase = AgentPhase::Working;
                        s.input_locked = true;
                        s.trace.clear();
                    });

                    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
                    let outcome = orchestrator
                        .submit_with_events(&input, std::mem::take(&mut ledger), Some(&event_tx))
                        .await;
                    drop(event_tx);
                    let mut trace = Vec::new();
                    while let Ok(ev) = event_rx.try_recv() {
                        trace.push(ev);
                    }

                    turn += 1;
                    ledger = outcome.ledger;
                    let _ = state_tx.send(UiState {
                        phase: AgentPhase::Idle,
                        turn,
                        history: ledger.display_messages().into_iter().cloned().collect(),
                        last_reply: Some(outcome.final_text),
                        terminal: Some(outcome.terminal_state),
                        trace,
                        input_locked: false,
                    });
                }
                Command::Clear => {
                    ledger = MessageLedger::new();
                    let _ = state_tx.send(UiState {
                        turn,
                        ..UiState::default()
                    });
                }
                Command::Quit => break,
            }
        }
    });

    (cmd_tx, state_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::tools::EchoTool;

    fn orchestrator(llm: ScriptedLlmClient) -> Arc<Orchestrator> {
        let registry = Arc::new(CapabilityRegistry::builder().register(EchoTool).build());
        Arc::new(Orchestrator::new(Arc::new(llm), registry, LoopOptions::default()))
    }

    #[tokio::test]
    async fn test_submit_carries_ledger_across_turns() {
        let orch = orchestrator(ScriptedLlmClient::texts(["first", "second"]));
        let one = orch.submit("hello", MessageLedger::new()).await;
        assert_eq!(one.final_text, "first");
        assert_eq!(one.ledger.len(), 2);

        let two = orch.submit("again", one.ledger).await;
        assert_eq!(two.final_text, "second");
        assert_eq!(two.terminal_state, TerminalState::Done);
        assert_eq!(two.ledger.len(), 4);
    }

    #[tokio::test]
    async fn test_session_task_updates_ui_state() {
        let orch = orchestrator(ScriptedLlmClient::texts([
            r#"{"tool": "echo", "args": {"text": "x"}}"#,
            "done",
        ]));
        let (cmd_tx, mut state_rx) = spawn_session(orch);
        cmd_tx.send(Command::Submit("go".to_string())).unwrap();

        let state = loop {
            state_rx.changed().await.unwrap();
            let s = state_rx.borrow_and_update().clone();
            if s.turn == 1 {
                break s;
            }
        };
        assert_eq!(state.last_reply.as_deref(), Some("done"));
        assert_eq!(state.terminal, Some(TerminalState::Done));
        assert!(!state.input_locked);
        // 只投影用户输入与最终回复
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[1].content, "done");
        assert!(state.trace.iter().any(|e| matches!(e, ReactEvent::Observation { .. })));

        cmd_tx.send(Command::Clear).unwrap();
        state_rx.changed().await.unwrap();
        assert!(state_rx.borrow().history.is_empty());
        cmd_tx.send(Command::Quit).unwrap();
    }
}
