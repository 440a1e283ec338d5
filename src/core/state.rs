//! 状态定义：单轮 AgentState、循环状态机阶段与 UiState 投影
//!
//! AgentState 由一次 run() 独占；UI 只持有轻量的 UiState（阶段、历史、锁、最近一次回复）。

use serde::Serialize;

use crate::memory::{Message, MessageLedger};
use crate::react::{Plan, ReactEvent};

/// 循环状态机阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Decide,
    Execute,
    Done,
    Aborted,
}

/// 终止状态（Done / Aborted）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Done,
    Aborted,
}

impl From<TerminalState> for LoopState {
    fn from(t: TerminalState) -> Self {
        match t {
            TerminalState::Done => LoopState::Done,
            TerminalState::Aborted => LoopState::Aborted,
        }
    }
}

/// 一次处理用户消息的工作状态
#[derive(Clone, Debug)]
pub struct AgentState {
    pub session_id: String,
    pub ledger: MessageLedger,
    /// DECIDE→EXECUTE→DECIDE 往返次数，只由编排器修改
    pub step_count: usize,
    /// 最近一次 Planning 的结果，每轮整体替换
    pub plan: Option<Plan>,
    phase: LoopState,
    terminal: bool,
}

/// 上一轮遗留、没有结果的调用请求统一补上的内容
const INTERRUPTED_RESULT: &str = "Interrupted: no result was produced for this request.";

impl AgentState {
    pub fn new(ledger: MessageLedger) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            ledger,
            step_count: 0,
            plan: None,
            phase: LoopState::Decide,
            terminal: false,
        }
    }

    /// 为新一轮用户输入创建状态：先补齐历史里悬空的请求，再追加 user 消息
    pub fn for_turn(prior: MessageLedger, user_text: &str) -> Self {
        let mut state = Self::new(prior);
        let dangling: Vec<(String, String)> = state
            .ledger
            .pending_requests()
            .into_iter()
            .map(|r| (r.id.clone(), r.capability_name.clone()))
            .collect();
        for (id, name) in dangling {
            state
                .ledger
                .append(Message::tool_result(id, name, INTERRUPTED_RESULT));
        }
        state.ledger.append(Message::user(user_text));
        state
    }

    pub fn phase(&self) -> LoopState {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub(crate) fn enter(&mut self, phase: LoopState) {
        debug_assert!(!self.terminal, "state already terminal");
        tracing::debug!(session = %self.session_id, from = ?self.phase, to = ?phase, "transition");
        self.phase = phase;
    }

    /// 进入终止状态；terminal 只被置位一次
    pub(crate) fn finish(&mut self, terminal: TerminalState) {
        self.enter(terminal.into());
        self.terminal = true;
    }

    /// 最后一条 assistant 文本（终止后即本轮回复）
    pub fn final_text(&self) -> Option<&str> {
        self.ledger
            .messages()
            .iter()
            .rev()
            .find(|m| m.is_final_reply())
            .map(|m| m.content.as_str())
    }
}

/// UI 看到的「投影」状态，轻量且易于渲染
#[derive(Clone, Debug, Serialize)]
pub struct UiState {
    pub phase: AgentPhase,
    /// 已完成的轮数（每次 Submit 结束后 +1）
    pub turn: u64,
    /// 渲染用历史：用户输入与最终回复
    pub history: Vec<Message>,
    pub last_reply: Option<String>,
    pub terminal: Option<TerminalState>,
    /// 最近一轮的过程事件（调试面板）
    pub trace: Vec<ReactEvent>,
    pub input_locked: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            phase: AgentPhase::Idle,
            turn: 0,
            history: Vec::new(),
            last_reply: None,
            terminal: None,
            trace: Vec::new(),
            input_locked: false,
        }
    }
}

/// Agent 阶段（UI 投影用）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum AgentPhase {
    Idle,
    Working,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InvocationRequest, Role};
    use serde_json::json;

    #[test]
    fn test_for_turn_appends_user() {
        let state = AgentState::for_turn(MessageLedger::new(), "hello");
        assert_eq!(state.ledger.len(), 1);
        assert_eq!(state.ledger.messages()[0].role, Role::User);
        assert_eq!(state.phase(), LoopState::Decide);
        assert!(!state.is_terminal());
        assert_eq!(state.step_count, 0);
    }

    #[test]
    fn test_for_turn_closes_dangling_requests() {
        let mut prior = MessageLedger::new();
        prior.append(Message::user("A to B"));
        prior.append(Message::invocation(vec![InvocationRequest::new(
            "call_0",
            "route_lookup",
            json!({}),
        )]));
        let state = AgentState::for_turn(prior, "again");
        let msgs = state.ledger.messages();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[2].role, Role::ToolResult);
        assert_eq!(msgs[2].in_reply_to.as_deref(), Some("call_0"));
        assert_eq!(msgs[3].content, "again");
        assert!(state.ledger.pending_requests().is_empty());
    }

    #[test]
    fn test_finish_sets_terminal() {
        let mut state = AgentState::for_turn(MessageLedger::new(), "hi");
        state.ledger.append(Message::assistant("hello"));
        state.finish(TerminalState::Done);
        assert!(state.is_terminal());
        assert_eq!(state.phase(), LoopState::Done);
        assert_eq!(state.final_text(), Some("hello"));
    }
}
