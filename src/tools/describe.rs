//! 景点介绍能力（describe_attractions）：交给带网页检索能力的模型（search_model）生成简介

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::Capability;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DescribeAttractionsArgs {
    /// 景点名列表
    pub attractions: Vec<String>,
    /// 所在城市，默认 Budapest
    #[serde(default)]
    pub city: Option<String>,
}

pub struct DescribeAttractionsTool {
    search_llm: Arc<dyn LlmClient>,
}

impl DescribeAttractionsTool {
    pub fn new(search_llm: Arc<dyn LlmClient>) -> Self {
        Self { search_llm }
    }
}

pub(crate) fn describe_prompt(city: &str, attractions: &[String]) -> String {
    let list = serde_json::to_string(attractions).unwrap_or_default();
    format!(
        "You have web search access to give accurate information about attractions in {city}.\n\
         Give a short but detailed description of each of these attractions based on current web information:\n\
         {list}\n\n\
         For each attraction cover:\n\
         1. What it is (museum, landmark, ...)\n\
         2. Its historical significance\n\
         3. Main features and what visitors can see\n\
         4. Where it is in {city}\n\
         5. Practical visitor information, if available\n\n\
         Use the attraction name as a heading followed by 3-4 informative sentences."
    )
}

#[async_trait]
impl Capability for DescribeAttractionsTool {
    const NAME: &'static str = "describe_attractions";
    type Args = DescribeAttractionsArgs;
    type Output = String;

    fn description(&self) -> &str {
        "Describe attractions using web-backed information. \
         Args: {\"attractions\": [\"Parlament\", \"Halászbástya\"], \"city\": \"Budapest\"}"
    }

    async fn call(&self, args: DescribeAttractionsArgs) -> Result<String, String> {
        let names: Vec<String> = args
            .attractions
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if names.is_empty() {
            return Err("attractions must not be empty".to_string());
        }
        let city = args.city.as_deref().unwrap_or("Budapest");
        self.search_llm
            .complete(&[Message::user(describe_prompt(city, &names))])
            .await
            .map_err(|e| e.to_string())
    }
}
