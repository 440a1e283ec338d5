//! 执行节点
//!
//! 对一批调用请求逐个解析并调用注册表，为每个请求生成一条 tool_result（顺序与请求一致，带请求 id）。
//! 未知能力与调用失败都转成固定格式的文本交给下一轮 DECIDE；每次调用输出结构化审计日志（JSON）。
//! 同一批请求可并发执行（信号量限流），结果按原顺序回收。

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::core::{AgentError, RecoveryEngine};
use crate::memory::{InvocationRequest, Message};
use crate::tools::CapabilityRegistry;

/// 单个请求的执行记录
#[derive(Debug)]
pub struct ExecutionRecord {
    pub message: Message,
    pub error: Option<AgentError>,
    pub duration_ms: u64,
}

/// 执行节点：持有共享的注册表与并发许可
pub struct ExecutionNode {
    registry: Arc<CapabilityRegistry>,
    recovery: RecoveryEngine,
    parallel: bool,
    permits: Arc<Semaphore>,
}

impl ExecutionNode {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            recovery: RecoveryEngine::new(),
            parallel: false,
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// 允许同批请求并发执行，最多 max_concurrent 个同时进行
    pub fn with_parallelism(mut self, max_concurrent: usize) -> Self {
        self.parallel = max_concurrent > 1;
        self.permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
        self
    }

    /// 执行一批请求，返回同序的 tool_result 消息
    pub async fn execute(&self, requests: &[InvocationRequest]) -> Vec<Message> {
        self.execute_detailed(requests)
            .await
            .into_iter()
            .map(|r| r.message)
            .collect()
    }

    pub async fn execute_detailed(&self, requests: &[InvocationRequest]) -> Vec<ExecutionRecord> {
        if self.parallel && requests.len() > 1 {
            // join_all 保持输入顺序
            futures_util::future::join_all(requests.iter().map(|r| self.execute_one(r))).await
        } else {
            let mut records = Vec::with_capacity(requests.len());
            for request in requests {
                records.push(self.execute_one(request).await);
            }
            records
        }
    }

    async fn execute_one(&self, request: &InvocationRequest) -> ExecutionRecord {
        // 信号量不会被关闭，拿不到许可时直接执行
        let _permit = self.permits.clone().acquire_owned().await.ok();
        let start = Instant::now();
        let name = request.capability_name.as_str();

        let result: Result<String, AgentError> = match self.registry.resolve(name) {
            Err(e) => Err(e),
            Ok(_) => self
                .registry
                .invoke(name, request.arguments.clone())
                .await
                .map_err(AgentError::from),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(AgentError::UnknownCapability(_)) => "unknown",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "capability_audit",
            "capability": name,
            "request_id": request.id,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview(&request.arguments),
        });
        tracing::info!(audit = %audit, "capability");

        match result {
            Ok(content) => ExecutionRecord {
                message: Message::tool_result(&request.id, name, content),
                error: None,
                duration_ms,
            },
            Err(e) => {
                tracing::warn!(capability = %name, error = %e, "capability failed");
                let content = self.recovery.handle(&e).text().to_string();
                ExecutionRecord {
                    message: Message::tool_result(&request.id, name, content),
                    error: Some(e),
                    duration_ms,
                }
            }
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
