//! 调用格式 JSON Schema 生成（schemars 自动生成）
//!
//! 用于将「合法调用列表」的 JSON 结构注入 system prompt，减少 LLM 输出格式错误。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 单个调用：与 Decider 解析的 `{"tool": "...", "args": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct InvocationFormat {
    /// 可选的调用 id，省略时按序号生成
    pub id: Option<String>,
    /// 能力名，如 route_lookup、nearby_places
    pub tool: String,
    /// 能力参数，结构见各能力的 parameters
    pub args: Value,
}

/// 一次回复中的调用列表
#[allow(dead_code)]
#[derive(JsonSchema)]
struct InvocationBatchFormat {
    pub invocations: Vec<InvocationFormat>,
}

/// 返回调用列表的 JSON Schema 字符串，可拼入 system prompt
pub fn invocation_schema_json() -> String {
    let schema = schema_for!(InvocationBatchFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
