//! 行程规划：固定流水线，全部能力调用都经过注册表（同样的参数校验 / 超时 / panic 隔离）
//!
//! 1. 从特殊要求中抽取景点名
//! 2. 不足 3 个时，以起点附近为中心按兴趣搜索
//! 3. 按可用时间截取 min(hours/2+1, 5) 个，一个都没有时用默认三景点
//! 4. 检索景点介绍
//! 5. 依次规划起点 → 景点 → 景点 ... 的路线
//! 6. 交给模型排成行程
//!
//! 单个能力失败只降级，不中断整条流水线；只有最后的编排调用失败才返回错误。

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::places::Place;
use crate::tools::{CapabilityRegistry, RouteSummary, TravelMode};

const DEFAULT_ATTRACTIONS: [&str; 3] = ["Parlament", "Budai vár", "Halászbástya"];
/// 用于定位起点坐标的参考目的地
const REFERENCE_DESTINATION: &str = "Hősök tere, Budapest";
const MAX_ATTRACTIONS: u32 = 5;
const INTEREST_SEARCH_RADIUS: u32 = 1000;

const ITINERARY_PROMPT: &str = "You are an experienced Budapest travel planner. \
You write clear, realistic one-day itineraries that use public transport well.";

/// 行程偏好
#[derive(Debug, Clone)]
pub struct TripPreferences {
    pub start_location: String,
    pub interests: Vec<String>,
    pub available_hours: u32,
    pub transport_mode: TravelMode,
    pub special_requests: String,
}

impl Default for TripPreferences {
    fn default() -> Self {
        Self {
            start_location: "Deák Ferenc tér".to_string(),
            interests: Vec::new(),
            available_hours: 4,
            transport_mode: TravelMode::Transit,
            special_requests: String::new(),
        }
    }
}

/// 规划结果
#[derive(Debug, Clone)]
pub struct Itinerary {
    pub attractions: Vec<String>,
    pub text: String,
}

/// 按可用时间截取景点；为空时给默认景点
pub fn select_attractions(found: Vec<String>, available_hours: u32) -> Vec<String> {
    let max = (available_hours / 2 + 1).min(MAX_ATTRACTIONS) as usize;
    let mut selected: Vec<String> = Vec::new();
    for name in found {
        if selected.len() >= max {
            break;
        }
        let name = name.trim();
        if !name.is_empty() && !selected.iter().any(|s| s.eq_ignore_ascii_case(name)) {
            selected.push(name.to_string());
        }
    }
    if selected.is_empty() {
        selected = DEFAULT_ATTRACTIONS.iter().map(|s| s.to_string()).collect();
    }
    selected
}

fn describe_route(route: &RouteSummary) -> String {
    let mut lines = vec![route.headline()];
    for step in route.legs.iter().flat_map(|l| l.steps.iter()) {
        let mut line = format!("- {}", step.instruction);
        if let Some(l) = &step.line {
            line.push_str(&format!(" [{l}]"));
        }
        if let Some(d) = &step.duration {
            line.push_str(&format!(" ({d})"));
        }
        lines.push(line);
    }
    lines.join("\n")
}

pub struct ItineraryPlanner {
    registry: Arc<CapabilityRegistry>,
    llm: Arc<dyn LlmClient>,
}

impl ItineraryPlanner {
    pub fn new(registry: Arc<CapabilityRegistry>, llm: Arc<dyn LlmClient>) -> Self {
        Self { registry, llm }
    }

    /// 调用能力并把 JSON 输出还原为类型；失败只记日志
    async fn call<T: DeserializeOwned>(&self, name: &str, args: Value) -> Option<T> {
        let raw = match self.registry.invoke(name, args).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "itinerary step degraded");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(capability = %name, error = %e, "unexpected capability output");
                None
            }
        }
    }

    async fn gather_attractions(&self, prefs: &TripPreferences) -> Vec<String> {
        let mut attractions: Vec<String> = Vec::new();

        if !prefs.special_requests.trim().is_empty() {
            if let Some(names) = self
                .call::<Vec<String>>("extract_attractions", json!({ "text": prefs.special_requests }))
                .await
            {
                attractions.extend(names);
            }
        }

        if attractions.len() < 3 && !prefs.interests.is_empty() {
            let route: Option<RouteSummary> = self
                .call(
                    "route_lookup",
                    json!({
                        "from_place": prefs.start_location,
                        "to_place": REFERENCE_DESTINATION,
                        "mode": prefs.transport_mode,
                    }),
                )
                .await;
            let origin = route
                .as_ref()
                .and_then(|r| r.legs.first())
                .and_then(|l| l.start_location);
            match origin {
                Some(origin) => {
                    for interest in &prefs.interests {
                        let places: Option<Vec<Place>> = self
                            .call(
                                "nearby_places",
                                json!({
                                    "lat": origin.lat,
                                    "lng": origin.lng,
                                    "category": interest,
                                    "radius": INTEREST_SEARCH_RADIUS,
                                }),
                            )
                            .await;
                        attractions.extend(places.unwrap_or_default().into_iter().map(|p| p.name));
                    }
                }
                None => tracing::warn!(start = %prefs.start_location, "start location could not be resolved"),
            }
        }

        attractions
    }

    pub async fn create_itinerary(&self, prefs: &TripPreferences) -> Result<Itinerary, AgentError> {
        tracing::info!(start = %prefs.start_location, hours = prefs.available_hours, "planning itinerary");

        let found = self.gather_attractions(prefs).await;
        let selected = select_attractions(found, prefs.available_hours);

        let descriptions: String = self
            .call("describe_attractions", json!({ "attractions": selected }))
            .await
            .unwrap_or_else(|| "(no descriptions available)".to_string());

        let mut routes = Vec::with_capacity(selected.len());
        let mut current = prefs.start_location.clone();
        for attraction in &selected {
            let destination = format!("{attraction}, Budapest");
            let route: Option<RouteSummary> = self
                .call(
                    "route_lookup",
                    json!({
                        "from_place": current,
                        "to_place": destination,
                        "mode": prefs.transport_mode,
                    }),
                )
                .await;
            routes.push(match route {
                Some(r) => describe_route(&r),
                None => format!("{current} → {destination}: route unavailable"),
            });
            current = destination;
        }

        let prompt = format!(
            "Create a Budapest itinerary from these details:\n\n\
             Start: {}\nInterests: {}\nAvailable time: {} hours\nTransport mode: {}\nSpecial requests: {}\n\n\
             Selected attractions:\n{}\n\n\
             Attraction information (from web search):\n{}\n\n\
             Routes between stops:\n{}\n\n\
             Format the itinerary with:\n\
             1. A title and a short introduction\n\
             2. A schedule starting at 10:00\n\
             3. Details for each attraction: description, time needed, transport directions\n\
             4. Meal suggestions at suitable times",
            prefs.start_location,
            prefs.interests.join(", "),
            prefs.available_hours,
            prefs.transport_mode.as_str(),
            prefs.special_requests,
            serde_json::to_string(&selected).unwrap_or_default(),
            descriptions,
            routes.join("\n\n"),
        );

        let text = self
            .llm
            .complete(&[Message::system(ITINERARY_PROMPT), Message::user(prompt)])
            .await?;

        Ok(Itinerary {
            attractions: selected,
            text,
        })
    }
}
