//! 路线查询能力（route_lookup）
//!
//! 调用 Directions API（默认公共交通：bus|subway|train|tram），把原始响应压缩为
//! 路段 / 步骤 / 上下车站点的摘要，避免把整段 JSON 喂回模型。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::maps::{LatLng, MapsClient};
use crate::tools::Capability;

/// 出行方式（同时作为命令行 --mode 的取值）
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Transit,
    Walking,
    Bicycling,
    Driving,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Transit => "transit",
            TravelMode::Walking => "walking",
            TravelMode::Bicycling => "bicycling",
            TravelMode::Driving => "driving",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLocation {
    pub name: String,
    pub location: LatLng,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub travel_mode: String,
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_stops: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_stop: Option<StopLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_stop: Option<StopLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub start_address: String,
    pub end_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_location: Option<LatLng>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<String>,
    pub steps: Vec<RouteStep>,
}

/// 路线摘要（取第一条候选路线）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub summary: String,
    pub legs: Vec<RouteLeg>,
}

impl RouteSummary {
    /// 一行描述：起点 → 终点（时长，距离）
    pub fn headline(&self) -> String {
        match (self.legs.first(), self.legs.last()) {
            (Some(first), Some(last)) => {
                let mut line = format!("{} → {}", first.start_address, last.end_address);
                if let Some(d) = &first.duration {
                    line.push_str(&format!(" ({d}"));
                    if let Some(dist) = &first.distance {
                        line.push_str(&format!(", {dist}"));
                    }
                    line.push(')');
                }
                line
            }
            _ => "no route".to_string(),
        }
    }

    /// 所有公共交通步骤的上下车站点，去重并保持出现顺序
    pub fn transit_stops(&self) -> Vec<StopLocation> {
        let mut seen = HashSet::new();
        let mut stops = Vec::new();
        for step in self.legs.iter().flat_map(|l| l.steps.iter()) {
            if step.travel_mode != "TRANSIT" {
                continue;
            }
            for stop in [&step.departure_stop, &step.arrival_stop].into_iter().flatten() {
                let key = format!("{:.6},{:.6}", stop.location.lat, stop.location.lng);
                if seen.insert(key) {
                    stops.push(stop.clone());
                }
            }
        }
        stops
    }
}

fn text_of(v: &Value, field: &str) -> Option<String> {
    v.get(field)?.get("text")?.as_str().map(String::from)
}

fn str_of(v: &Value, field: &str) -> String {
    v.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn stop_of(v: Option<&Value>) -> Option<StopLocation> {
    let v = v?;
    Some(StopLocation {
        name: v.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        location: LatLng::from_value(v.get("location")?)?,
    })
}

/// html2text 渲染宽度：足够宽，避免一条指令被折行
const INSTRUCTION_RENDER_WIDTH: usize = 1000;

/// html_instructions 转纯文本：html2text 负责标签与实体（&amp; / &nbsp;），随后合并空白
pub fn instruction_text(html: &str) -> String {
    let config = html2text::config::with_decorator(
        html2text::render::TrivialDecorator::new(),
    );
    match config.string_from_read(html.as_bytes(), INSTRUCTION_RENDER_WIDTH) {
        Ok(text) if !text.trim().is_empty() => {
            text.split_whitespace().collect::<Vec<_>>().join(" ")
        }
        _ => strip_tags(html),
    }
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 将 Directions API 原始响应压缩为 RouteSummary
pub fn summarize_route(body: &Value) -> Result<RouteSummary, String> {
    let route = body
        .get("routes")
        .and_then(Value::as_array)
        .and_then(|r| r.first())
        .ok_or_else(|| "No route found".to_string())?;

    let legs = route
        .get("legs")
        .and_then(Value::as_array)
        .map(|legs| legs.iter().map(summarize_leg).collect())
        .unwrap_or_default();

    Ok(RouteSummary {
        summary: str_of(route, "summary"),
        legs,
    })
}

fn summarize_leg(leg: &Value) -> RouteLeg {
    let steps = leg
        .get("steps")
        .and_then(Value::as_array)
        .map(|steps| steps.iter().map(summarize_step).collect())
        .unwrap_or_default();
    RouteLeg {
        start_address: str_of(leg, "start_address"),
        end_address: str_of(leg, "end_address"),
        start_location: leg.get("start_location").and_then(LatLng::from_value),
        duration: text_of(leg, "duration"),
        distance: text_of(leg, "distance"),
        departure_time: text_of(leg, "departure_time"),
        arrival_time: text_of(leg, "arrival_time"),
        steps,
    }
}

fn summarize_step(step: &Value) -> RouteStep {
    let transit = step.get("transit_details");
    let line = transit.and_then(|t| t.get("line"));
    RouteStep {
        travel_mode: str_of(step, "travel_mode"),
        instruction: instruction_text(step.get("html_instructions").and_then(Value::as_str).unwrap_or_default()),
        duration: text_of(step, "duration"),
        line: line.and_then(|l| {
            l.get("short_name")
                .or_else(|| l.get("name"))
                .and_then(Value::as_str)
                .map(String::from)
        }),
        vehicle: line
            .and_then(|l| l.get("vehicle"))
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .map(String::from),
        num_stops: transit.and_then(|t| t.get("num_stops")).and_then(Value::as_u64),
        departure_stop: stop_of(transit.and_then(|t| t.get("departure_stop"))),
        arrival_stop: stop_of(transit.and_then(|t| t.get("arrival_stop"))),
    }
}

/// 查询路线（供 route_lookup / attractions_near_route / 行程规划复用）
pub async fn fetch_route(
    maps: &MapsClient,
    from_place: &str,
    to_place: &str,
    mode: TravelMode,
) -> Result<RouteSummary, String> {
    let mut params = vec![
        ("origin", from_place.to_string()),
        ("destination", to_place.to_string()),
        ("mode", mode.as_str().to_string()),
    ];
    if mode == TravelMode::Transit {
        params.push(("transit_mode", "bus|subway|train|tram".to_string()));
    }
    let body = maps.get_json("directions", &params).await?;
    summarize_route(&body)
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RouteLookupArgs {
    /// 出发地（地名或地址）
    pub from_place: String,
    /// 目的地（地名或地址）
    pub to_place: String,
    /// 出行方式，默认 transit
    #[serde(default)]
    pub mode: TravelMode,
}

/// 路线查询能力
pub struct RouteLookupTool {
    maps: Arc<MapsClient>,
}

impl RouteLookupTool {
    pub fn new(maps: Arc<MapsClient>) -> Self {
        Self { maps }
    }
}

#[async_trait]
impl Capability for RouteLookupTool {
    const NAME: &'static str = "route_lookup";
    type Args = RouteLookupArgs;
    type Output = RouteSummary;

    fn description(&self) -> &str {
        "Get directions between two places (public transport by default). \
         Args: {\"from_place\": \"...\", \"to_place\": \"...\", \"mode\": \"transit|walking|bicycling|driving\"}"
    }

    async fn call(&self, args: RouteLookupArgs) -> Result<RouteSummary, String> {
        if args.from_place.trim().is_empty() || args.to_place.trim().is_empty() {
            return Err("from_place and to_place must not be empty".to_string());
        }
        fetch_route(&self.maps, &args.from_place, &args.to_place, args.mode).await
    }
}
