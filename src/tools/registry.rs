//! 能力注册表
//!
//! 每个能力实现 Capability trait（名称 / 描述 / 类型化参数与输出 / 异步调用），
//! 通过 CapabilityRegistryBuilder 在构造期注册，build() 之后不可再注册。
//! invoke 是唯一的隔离边界：参数校验、panic 捕获、超时都在这里转换成 CapabilityError。

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::core::{AgentError, CapabilityError};

/// 外部能力：声明式的参数类型（反序列化即校验）与可序列化的输出
#[async_trait]
pub trait Capability: Send + Sync + 'static {
    /// 能力名称（调用 JSON 中的 "tool" 字段）
    const NAME: &'static str;

    /// 参数类型，JSON Schema 由 schemars 生成
    type Args: DeserializeOwned + JsonSchema + Send;

    type Output: Serialize + Send;

    /// 能力描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    async fn call(&self, args: Self::Args) -> Result<Self::Output, String>;
}

/// 类型擦除后的处理函数
#[async_trait]
trait Handler: Send + Sync {
    async fn handle(&self, args: Value) -> Result<String, CapabilityError>;
}

struct TypedHandler<C>(C);

#[async_trait]
impl<C: Capability> Handler for TypedHandler<C> {
    async fn handle(&self, args: Value) -> Result<String, CapabilityError> {
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };
        let parsed: C::Args = serde_json::from_value(args)
            .map_err(|e| CapabilityError::invalid_arguments(C::NAME, e.to_string()))?;
        let output = self
            .0
            .call(parsed)
            .await
            .map_err(|e| CapabilityError::failed(C::NAME, e))?;
        serde_json::to_string(&output)
            .map_err(|e| CapabilityError::failed(C::NAME, format!("unserializable output: {e}")))
    }
}

/// 供 prompt 使用的能力说明
#[derive(Debug, Clone, Serialize)]
pub struct CapabilitySpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 注册表中的一项：名称、输入结构、处理函数
#[derive(Clone)]
pub struct CapabilityDescriptor {
    name: String,
    description: String,
    input_schema: Value,
    handler: Arc<dyn Handler>,
}

impl CapabilityDescriptor {
    fn of<C: Capability>(capability: C) -> Self {
        let schema = schemars::schema_for!(C::Args);
        Self {
            name: C::NAME.to_string(),
            description: capability.description().to_string(),
            input_schema: serde_json::to_value(&schema).unwrap_or(Value::Null),
            handler: Arc::new(TypedHandler(capability)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    pub fn spec(&self) -> CapabilitySpec {
        CapabilitySpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }
}

impl std::fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// 构造期注册器
#[derive(Default)]
pub struct CapabilityRegistryBuilder {
    descriptors: Vec<CapabilityDescriptor>,
    timeout: Option<Duration>,
}

impl CapabilityRegistryBuilder {
    pub fn register<C: Capability>(mut self, capability: C) -> Self {
        let descriptor = CapabilityDescriptor::of(capability);
        if let Some(pos) = self.descriptors.iter().position(|d| d.name == descriptor.name) {
            tracing::warn!(capability = %descriptor.name, "duplicate capability, replacing");
            self.descriptors[pos] = descriptor;
        } else {
            self.descriptors.push(descriptor);
        }
        self
    }

    /// 单次调用超时；不设置则不限时
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> CapabilityRegistry {
        let order = self.descriptors.iter().map(|d| d.name.clone()).collect();
        let capabilities = self
            .descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        CapabilityRegistry {
            capabilities,
            order,
            timeout: self.timeout,
        }
    }
}

/// 不可变的能力注册表
pub struct CapabilityRegistry {
    capabilities: HashMap<String, CapabilityDescriptor>,
    /// 注册顺序（prompt 输出稳定）
    order: Vec<String>,
    timeout: Option<Duration>,
}

impl CapabilityRegistry {
    pub fn builder() -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder::default()
    }

    pub fn resolve(&self, name: &str) -> Result<&CapabilityDescriptor, AgentError> {
        self.capabilities
            .get(name)
            .ok_or_else(|| AgentError::UnknownCapability(name.to_string()))
    }

    /// 调用能力；任何失败（含 panic、超时）都不会越过这里
    pub async fn invoke(&self, name: &str, args: Value) -> Result<String, CapabilityError> {
        let descriptor = self
            .capabilities
            .get(name)
            .ok_or_else(|| CapabilityError::unknown(name))?;

        let guarded = AssertUnwindSafe(descriptor.handler.handle(args)).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .map_err(|_| CapabilityError::timeout(name, limit))?,
            None => guarded.await,
        };

        match outcome {
            Ok(result) => result,
            Err(payload) => Err(CapabilityError::panicked(name, panic_message(&*payload))),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn specs(&self) -> Vec<CapabilitySpec> {
        self.order
            .iter()
            .filter_map(|n| self.capabilities.get(n))
            .map(CapabilityDescriptor::spec)
            .collect()
    }

    /// 能力列表 JSON（名称 / 描述 / 参数 schema），拼入 system prompt
    pub fn to_schema_json(&self) -> String {
        serde_json::to_string_pretty(&self.specs()).unwrap_or_else(|_| "[]".to_string())
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.order)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
