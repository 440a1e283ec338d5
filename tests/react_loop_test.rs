//! 决策 / 执行循环集成测试：脚本化 Oracle + 假能力

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use explorer::core::recovery::{ORACLE_APOLOGY, STEP_BUDGET_MESSAGE, UNKNOWN_CAPABILITY_SENTINEL};
use explorer::core::{LoopOptions, Orchestrator, TerminalState};
use explorer::llm::{LlmClient, ScriptedLlmClient, ScriptedReply};
use explorer::memory::{MessageLedger, Role};
use explorer::tools::{Capability, CapabilityRegistry};

#[derive(Deserialize, JsonSchema)]
struct RouteArgs {
    from: String,
    to: String,
}

#[derive(Serialize)]
struct Route {
    summary: String,
}

/// 假路线能力：from 含 "bad" 时 panic，模拟异常的外部服务
#[derive(Default)]
struct FakeRoute {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Capability for FakeRoute {
    const NAME: &'static str = "route_lookup";
    type Args = RouteArgs;
    type Output = Route;

    fn description(&self) -> &str {
        "Route between two places"
    }

    async fn call(&self, args: RouteArgs) -> Result<Route, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if args.from.contains("bad") {
            panic!("upstream payload malformed");
        }
        Ok(Route {
            summary: format!("{} -> {} by tram 2", args.from, args.to),
        })
    }
}

#[derive(Deserialize, JsonSchema)]
struct SleepArgs {
    ms: u64,
    tag: String,
}

struct Sleeper;

#[async_trait]
impl Capability for Sleeper {
    const NAME: &'static str = "sleeper";
    type Args = SleepArgs;
    type Output = String;

    fn description(&self) -> &str {
        "Sleep for ms then return the tag"
    }

    async fn call(&self, args: SleepArgs) -> Result<String, String> {
        tokio::time::sleep(Duration::from_millis(args.ms)).await;
        Ok(args.tag)
    }
}

fn options(max_steps: usize) -> LoopOptions {
    LoopOptions {
        max_steps,
        decision_timeout: Duration::from_millis(200),
        ..LoopOptions::default()
    }
}

fn orchestrator(llm: Arc<dyn LlmClient>, max_steps: usize) -> (Orchestrator, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = CapabilityRegistry::builder()
        .register(FakeRoute {
            calls: calls.clone(),
        })
        .register(Sleeper)
        .timeout(Duration::from_secs(2))
        .build();
    (
        Orchestrator::new(llm, Arc::new(registry), options(max_steps)),
        calls,
    )
}

/// 每个调用请求都紧跟着恰好一条同 id、同序的 tool_result
fn assert_ordering(ledger: &MessageLedger) {
    let msgs = ledger.messages();
    let mut i = 0;
    while i < msgs.len() {
        let msg = &msgs[i];
        if msg.requests_capabilities() {
            let ids: Vec<String> = msg.invocation_requests.iter().map(|r| r.id.clone()).collect();
            let replies: Vec<String> = msgs[i + 1..i + 1 + ids.len()]
                .iter()
                .map(|m| {
                    assert_eq!(m.role, Role::ToolResult);
                    m.in_reply_to.clone().unwrap()
                })
                .collect();
            assert_eq!(ids, replies);
            i += 1 + ids.len();
        } else {
            assert_ne!(msg.role, Role::ToolResult, "orphan tool_result at {i}");
            i += 1;
        }
    }
}

#[tokio::test]
async fn test_route_then_answer_in_one_round_trip() {
    let llm = Arc::new(ScriptedLlmClient::texts([
        r#"{"tool": "route_lookup", "args": {"from": "A", "to": "B"}}"#,
        "Here is your route: take tram 2.",
    ]));
    let (orch, calls) = orchestrator(llm.clone(), 5);

    let outcome = orch.submit("A to B", MessageLedger::new()).await;
    assert_eq!(outcome.terminal_state, TerminalState::Done);
    assert_eq!(outcome.step_count, 1);
    assert_eq!(outcome.final_text, "Here is your route: take tram 2.");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_ordering(&outcome.ledger);

    // 第二次决策看到了观察结果
    let second_context = &llm.recorded_calls()[1];
    let observation = second_context.last().unwrap();
    assert_eq!(observation.role, Role::ToolResult);
    assert!(observation.content.contains("A -> B by tram 2"));
}

#[tokio::test]
async fn test_failing_capability_then_retry() {
    let llm = Arc::new(ScriptedLlmClient::texts([
        r#"{"tool": "route_lookup", "args": {"from": "bad A", "to": "B"}}"#,
        r#"{"tool": "route_lookup", "args": {"from": "A", "to": "B"}}"#,
        "Here is your route.",
    ]));
    let (orch, calls) = orchestrator(llm, 5);

    let outcome = orch.submit("A to B", MessageLedger::new()).await;
    assert_eq!(outcome.terminal_state, TerminalState::Done);
    assert_eq!(outcome.step_count, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_ordering(&outcome.ledger);

    let first_result = outcome
        .ledger
        .messages()
        .iter()
        .find(|m| m.role == Role::ToolResult)
        .unwrap();
    assert!(first_result.content.starts_with("Error from route_lookup:"));
    assert!(first_result.content.contains("upstream payload malformed"));
}

#[tokio::test]
async fn test_malformed_json_is_final_without_steps() {
    let raw = r#"{"tool": "route_lookup", "args": {"from": "A""#;
    let llm = Arc::new(ScriptedLlmClient::texts([raw]));
    let (orch, calls) = orchestrator(llm, 5);

    let outcome = orch.submit("A to B", MessageLedger::new()).await;
    assert_eq!(outcome.terminal_state, TerminalState::Done);
    assert_eq!(outcome.step_count, 0);
    assert_eq!(outcome.final_text, raw);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_capability_every_round_aborts_at_budget() {
    let llm = Arc::new(ScriptedLlmClient::repeating(
        r#"{"tool": "teleport", "args": {"to": "B"}}"#,
    ));
    let max_steps = 3;
    let (orch, _) = orchestrator(llm.clone(), max_steps);

    let outcome = orch.submit("A to B", MessageLedger::new()).await;
    assert_eq!(outcome.terminal_state, TerminalState::Aborted);
    assert_eq!(outcome.step_count, max_steps);
    assert_eq!(outcome.final_text, STEP_BUDGET_MESSAGE);
    assert_eq!(llm.call_count(), max_steps + 1);
    assert_ordering(&outcome.ledger);

    let results: Vec<_> = outcome
        .ledger
        .messages()
        .iter()
        .filter(|m| m.role == Role::ToolResult)
        .collect();
    assert_eq!(results.len(), max_steps);
    assert!(results
        .iter()
        .all(|m| m.content.starts_with(UNKNOWN_CAPABILITY_SENTINEL)));
    assert!(outcome.ledger.pending_requests().is_empty());
}

#[tokio::test]
async fn test_batch_results_keep_request_order() {
    let llm = Arc::new(ScriptedLlmClient::texts([
        r#"{"invocations": [
            {"id": "slow", "tool": "sleeper", "args": {"ms": 80, "tag": "first"}},
            {"id": "fast", "tool": "sleeper", "args": {"ms": 1, "tag": "second"}}
        ]}"#,
        "Both done.",
    ]));
    let (orch, _) = orchestrator(llm, 5);

    let outcome = orch.submit("do both", MessageLedger::new()).await;
    assert_eq!(outcome.step_count, 1);
    assert_ordering(&outcome.ledger);
    let results: Vec<_> = outcome
        .ledger
        .messages()
        .iter()
        .filter(|m| m.role == Role::ToolResult)
        .map(|m| (m.in_reply_to.clone().unwrap(), m.content.clone()))
        .collect();
    assert_eq!(
        results,
        vec![
            ("slow".to_string(), "\"first\"".to_string()),
            ("fast".to_string(), "\"second\"".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_panicking_sibling_does_not_skip_batch() {
    let llm = Arc::new(ScriptedLlmClient::texts([
        r#"[
            {"tool": "route_lookup", "args": {"from": "bad", "to": "B"}},
            {"tool": "route_lookup", "args": {"from": "C", "to": "D"}},
            {"tool": "sleeper", "args": {"ms": 0, "tag": "still here"}}
        ]"#,
        "Partial answer.",
    ]));
    let (orch, calls) = orchestrator(llm, 5);

    let outcome = orch.submit("go", MessageLedger::new()).await;
    assert_eq!(outcome.terminal_state, TerminalState::Done);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_ordering(&outcome.ledger);

    let contents: Vec<&str> = outcome
        .ledger
        .messages()
        .iter()
        .filter(|m| m.role == Role::ToolResult)
        .map(|m| m.content.as_str())
        .collect();
    assert!(contents[0].starts_with("Error from route_lookup"));
    assert!(contents[1].contains("C -> D"));
    assert_eq!(contents[2], "\"still here\"");
}

#[tokio::test]
async fn test_capability_timeout_lands_at_its_position_and_loop_continues() {
    let llm = Arc::new(ScriptedLlmClient::texts([
        r#"{"invocations": [
            {"id": "a", "tool": "sleeper", "args": {"ms": 0, "tag": "before"}},
            {"id": "b", "tool": "sleeper", "args": {"ms": 3000, "tag": "never"}},
            {"id": "c", "tool": "sleeper", "args": {"ms": 0, "tag": "after"}}
        ]}"#,
        "Two of three done.",
    ]));
    let registry = CapabilityRegistry::builder()
        .register(Sleeper)
        .timeout(Duration::from_millis(50))
        .build();
    let orch = Orchestrator::new(llm.clone(), Arc::new(registry), options(5));

    let outcome = orch.submit("three things", MessageLedger::new()).await;
    assert_eq!(outcome.terminal_state, TerminalState::Done);
    assert_eq!(outcome.step_count, 1);
    assert_eq!(outcome.final_text, "Two of three done.");
    assert_ordering(&outcome.ledger);

    let results: Vec<(String, String)> = outcome
        .ledger
        .messages()
        .iter()
        .filter(|m| m.role == Role::ToolResult)
        .map(|m| (m.in_reply_to.clone().unwrap(), m.content.clone()))
        .collect();
    assert_eq!(results[0], ("a".to_string(), "\"before\"".to_string()));
    assert_eq!(results[1].0, "b");
    assert!(results[1].1.starts_with("Error from sleeper: timed out"));
    assert_eq!(results[2], ("c".to_string(), "\"after\"".to_string()));

    // 超时结果也回到了下一次决策的上下文里
    let second = &llm.recorded_calls()[1];
    assert!(second
        .iter()
        .any(|m| m.role == Role::ToolResult && m.content.contains("timed out")));
}

#[tokio::test]
async fn test_unknown_capability_message_names_the_capability() {
    let llm = Arc::new(ScriptedLlmClient::texts([
        r#"{"tool": "teleport", "args": {}}"#,
        "Sorry, walking then.",
    ]));
    let (orch, _) = orchestrator(llm, 5);
    let outcome = orch.submit("beam me", MessageLedger::new()).await;
    let result = outcome
        .ledger
        .messages()
        .iter()
        .find(|m| m.role == Role::ToolResult)
        .unwrap();
    assert_eq!(
        result.content,
        "Unknown capability 'teleport'. Retry with one of the available capabilities."
    );
    assert_eq!(outcome.terminal_state, TerminalState::Done);
}

#[tokio::test]
async fn test_oracle_timeout_falls_back_to_apology() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![ScriptedReply::Delayed(
        Duration::from_secs(5),
        "too late".to_string(),
    )]));
    let (orch, _) = orchestrator(llm, 5);

    let outcome = orch.submit("hello", MessageLedger::new()).await;
    assert_eq!(outcome.terminal_state, TerminalState::Done);
    assert_eq!(outcome.final_text, ORACLE_APOLOGY);
    assert_eq!(outcome.step_count, 0);
}

#[tokio::test]
async fn test_planning_failure_does_not_block_decide() {
    // 规划调用拿到非 JSON，退回中性 Plan；随后的决策照常进行
    let llm = Arc::new(ScriptedLlmClient::texts([
        "I am not a plan",
        "Hi there!",
    ]));
    let registry = CapabilityRegistry::builder().register(Sleeper).build();
    let orch = Orchestrator::new(
        llm.clone(),
        Arc::new(registry),
        LoopOptions {
            planning_enabled: true,
            ..options(3)
        },
    );

    let outcome = orch.submit("hello", MessageLedger::new()).await;
    assert_eq!(outcome.final_text, "Hi there!");
    let decide_context = &llm.recorded_calls()[1];
    assert!(decide_context
        .iter()
        .any(|m| m.role == Role::System && m.content.contains("Intent: unknown")));
}

#[tokio::test]
async fn test_terminates_for_any_budget() {
    for max_steps in 0..4 {
        let llm = Arc::new(ScriptedLlmClient::repeating(
            r#"{"tool": "sleeper", "args": {"ms": 0, "tag": "again"}}"#,
        ));
        let (orch, _) = orchestrator(llm, max_steps);
        let outcome = orch.submit("loop forever", MessageLedger::new()).await;
        assert_eq!(outcome.terminal_state, TerminalState::Aborted);
        assert!(outcome.step_count <= max_steps);
        assert_ordering(&outcome.ledger);
    }
}

#[tokio::test]
async fn test_dangling_requests_are_closed_on_next_turn() {
    let llm = Arc::new(ScriptedLlmClient::texts(["Fine."]));
    let (orch, _) = orchestrator(llm, 5);

    let mut prior = MessageLedger::new();
    prior.append(explorer::memory::Message::user("earlier"));
    prior.append(explorer::memory::Message::invocation(vec![
        explorer::memory::InvocationRequest::new("old", "sleeper", serde_json::json!({})),
    ]));

    let outcome = orch.submit("next", prior).await;
    assert_ordering(&outcome.ledger);
    assert!(outcome.ledger.pending_requests().is_empty());
    assert_eq!(outcome.final_text, "Fine.");
}
