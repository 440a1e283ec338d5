//! Echo 能力（离线 Mock 模式与测试用）

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::tools::Capability;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EchoArgs {
    /// 要回显的文本
    #[serde(default)]
    pub text: Option<String>,
}

/// Echo 能力：回显文本
pub struct EchoTool;

#[async_trait]
impl Capability for EchoTool {
    const NAME: &'static str = "echo";
    type Args = EchoArgs;
    type Output = String;

    fn description(&self) -> &str {
        "Echo text (for testing). Args: {\"text\": \"message\"}"
    }

    async fn call(&self, args: EchoArgs) -> Result<String, String> {
        Ok(args.text.unwrap_or_else(|| "(empty)".to_string()))
    }
}
