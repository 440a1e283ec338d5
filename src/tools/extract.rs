//! 文本抽取能力：extract_trip（起点 / 终点）与 extract_attractions（景点名）
//!
//! 都由 LLM 输出 JSON；解析失败时 extract_trip 退回正则 `from X to Y`，
//! extract_attractions 返回空列表。

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::llm::{find_json_span, LlmClient};
use crate::memory::Message;
use crate::tools::Capability;

static FROM_TO: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)from\s+(.*?)\s+to\s+(.*)").ok());

/// 起点与终点；都为空表示没识别出来
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripEndpoints {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

impl TripEndpoints {
    pub fn is_empty(&self) -> bool {
        self.from.is_empty() && self.to.is_empty()
    }
}

/// 从模型回复中解析 {"from": .., "to": ..}
pub fn parse_trip_reply(reply: &str) -> Option<TripEndpoints> {
    let span = find_json_span(reply, '{', '}')?;
    let trip: TripEndpoints = serde_json::from_str(span).ok()?;
    (!trip.is_empty()).then_some(trip)
}

/// 正则兜底：from X to Y
pub fn trip_from_pattern(text: &str) -> TripEndpoints {
    FROM_TO
        .as_ref()
        .and_then(|re| re.captures(text))
        .map(|caps| TripEndpoints {
            from: caps[1].trim().to_string(),
            to: caps[2].trim().trim_end_matches(['.', '?', '!']).to_string(),
        })
        .unwrap_or_default()
}

/// 从模型回复中解析景点名数组（也接受 {"attractions": [...]}）
pub fn parse_attraction_names(reply: &str) -> Vec<String> {
    #[derive(Deserialize)]
    struct Wrapped {
        attractions: Vec<String>,
    }

    let names = find_json_span(reply, '[', ']')
        .and_then(|span| serde_json::from_str::<Vec<String>>(span).ok())
        .or_else(|| {
            find_json_span(reply, '{', '}')
                .and_then(|span| serde_json::from_str::<Wrapped>(span).ok())
                .map(|w| w.attractions)
        })
        .unwrap_or_default();

    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.trim().to_string();
        if !name.is_empty() && !out.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            out.push(name);
        }
    }
    out
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExtractTextArgs {
    /// 待抽取的自由文本
    pub text: String,
}

/// 起终点抽取
pub struct ExtractTripTool {
    llm: Arc<dyn LlmClient>,
}

impl ExtractTripTool {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Capability for ExtractTripTool {
    const NAME: &'static str = "extract_trip";
    type Args = ExtractTextArgs;
    type Output = TripEndpoints;

    fn description(&self) -> &str {
        "Extract the origin and destination from a sentence in any language. \
         Args: {\"text\": \"I want to go from Deák tér to the Parliament\"}"
    }

    async fn call(&self, args: ExtractTextArgs) -> Result<TripEndpoints, String> {
        let prompt = format!(
            "You are a multilingual assistant. Extract two locations from this sentence.\n\
             Respond ONLY with a JSON like:\n{{\"from\": \"X\", \"to\": \"Y\"}}\n\
             Input: \"{}\"",
            args.text
        );
        match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(reply) => {
                if let Some(trip) = parse_trip_reply(&reply) {
                    return Ok(trip);
                }
                tracing::debug!("trip extraction reply was not JSON, using pattern");
            }
            Err(e) => tracing::warn!(error = %e, "trip extraction call failed, using pattern"),
        }
        Ok(trip_from_pattern(&args.text))
    }
}

/// 景点名抽取
pub struct ExtractAttractionsTool {
    llm: Arc<dyn LlmClient>,
}

impl ExtractAttractionsTool {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Capability for ExtractAttractionsTool {
    const NAME: &'static str = "extract_attractions";
    type Args = ExtractTextArgs;
    type Output = Vec<String>;

    fn description(&self) -> &str {
        "Extract the names of tourist attractions mentioned in a text. \
         Args: {\"text\": \"...\"}"
    }

    async fn call(&self, args: ExtractTextArgs) -> Result<Vec<String>, String> {
        let prompt = format!(
            "Extract the names of the tourist attractions or landmarks mentioned in the text below.\n\
             Respond ONLY with a JSON array of strings, e.g. [\"Parlament\", \"Halászbástya\"].\n\
             Respond with [] if there are none.\n\
             Text: \"{}\"",
            args.text
        );
        let reply = self
            .llm
            .complete(&[Message::user(prompt)])
            .await
            .map_err(|e| e.to_string())?;
        Ok(parse_attraction_names(&reply))
    }
}
