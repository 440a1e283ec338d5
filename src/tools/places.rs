//! 周边地点能力：nearby_places 与 attractions_near_route
//!
//! Places Nearby Search 的结果压缩为 名称 / 地址 / 评分 / 坐标；
//! 沿途景点 = 先查路线，再对每个不同的公共交通站点做周边搜索，按首次出现去重。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::directions::{fetch_route, TravelMode};
use crate::tools::maps::{LatLng, MapsClient};
use crate::tools::Capability;

pub const DEFAULT_PLACES_RADIUS: u32 = 1000;
pub const DEFAULT_ROUTE_STOP_RADIUS: u32 = 800;

/// 兴趣 → Places 类型；未知兴趣归为 tourist_attraction
pub fn category_for_interest(interest: &str) -> &'static str {
    match interest.trim().to_lowercase().as_str() {
        "museums" | "museum" => "museum",
        "food" => "restaurant",
        "nature" => "park",
        "shopping" => "shopping_mall",
        "art" => "art_gallery",
        "nightlife" => "night_club",
        "religion" => "church",
        _ => "tourist_attraction",
    }
}

/// 一个地点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLng>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
}

/// 解析 Nearby Search 响应；无名称的条目丢弃
pub fn parse_places(body: &Value) -> Vec<Place> {
    let Some(results) = body.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };
    results
        .iter()
        .filter_map(|r| {
            let name = r.get("name").and_then(Value::as_str)?.trim();
            if name.is_empty() {
                return None;
            }
            Some(Place {
                name: name.to_string(),
                address: r
                    .get("vicinity")
                    .or_else(|| r.get("formatted_address"))
                    .and_then(Value::as_str)
                    .map(String::from),
                rating: r.get("rating").and_then(Value::as_f64),
                location: r
                    .get("geometry")
                    .and_then(|g| g.get("location"))
                    .and_then(LatLng::from_value),
                place_id: r.get("place_id").and_then(Value::as_str).map(String::from),
            })
        })
        .collect()
}

/// 周边搜索（供两个能力与行程规划复用）
pub async fn search_nearby(
    maps: &MapsClient,
    location: LatLng,
    category: Option<&str>,
    radius: u32,
) -> Result<Vec<Place>, String> {
    let mut params = vec![
        ("location", format!("{},{}", location.lat, location.lng)),
        ("radius", radius.to_string()),
    ];
    if let Some(category) = category.filter(|c| !c.is_empty()) {
        params.push(("type", category_for_interest(category).to_string()));
    }
    let body = maps.get_json("place/nearbysearch", &params).await?;
    Ok(parse_places(&body))
}

/// 按名称去重，保留首次出现
pub fn dedup_places(places: impl IntoIterator<Item = Place>) -> Vec<Place> {
    let mut seen = HashSet::new();
    places
        .into_iter()
        .filter(|p| seen.insert(p.name.to_lowercase()))
        .collect()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NearbyPlacesArgs {
    pub lat: f64,
    pub lng: f64,
    /// 兴趣或 Places 类型，如 museums、food、park
    #[serde(default)]
    pub category: Option<String>,
    /// 搜索半径（米）
    #[serde(default)]
    pub radius: Option<u32>,
}

pub struct NearbyPlacesTool {
    maps: Arc<MapsClient>,
    default_radius: u32,
}

impl NearbyPlacesTool {
    pub fn new(maps: Arc<MapsClient>, default_radius: u32) -> Self {
        Self {
            maps,
            default_radius,
        }
    }
}

#[async_trait]
impl Capability for NearbyPlacesTool {
    const NAME: &'static str = "nearby_places";
    type Args = NearbyPlacesArgs;
    type Output = Vec<Place>;

    fn description(&self) -> &str {
        "Find places near a coordinate. \
         Args: {\"lat\": 47.49, \"lng\": 19.04, \"category\": \"museums\", \"radius\": 1000}"
    }

    async fn call(&self, args: NearbyPlacesArgs) -> Result<Vec<Place>, String> {
        if !(-90.0..=90.0).contains(&args.lat) || !(-180.0..=180.0).contains(&args.lng) {
            return Err(format!("coordinates out of range: {},{}", args.lat, args.lng));
        }
        search_nearby(
            &self.maps,
            LatLng {
                lat: args.lat,
                lng: args.lng,
            },
            args.category.as_deref(),
            args.radius.unwrap_or(self.default_radius),
        )
        .await
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AttractionsNearRouteArgs {
    pub from_place: String,
    pub to_place: String,
}

/// 沿途景点结果
#[derive(Debug, Clone, Serialize)]
pub struct RouteAttractions {
    pub route: String,
    pub stops: Vec<String>,
    pub attractions: Vec<Place>,
}

pub struct AttractionsNearRouteTool {
    maps: Arc<MapsClient>,
    stop_radius: u32,
}

impl AttractionsNearRouteTool {
    pub fn new(maps: Arc<MapsClient>, stop_radius: u32) -> Self {
        Self { maps, stop_radius }
    }
}

#[async_trait]
impl Capability for AttractionsNearRouteTool {
    const NAME: &'static str = "attractions_near_route";
    type Args = AttractionsNearRouteArgs;
    type Output = RouteAttractions;

    fn description(&self) -> &str {
        "Find tourist attractions near the public transport stops along a route. \
         Args: {\"from_place\": \"...\", \"to_place\": \"...\"}"
    }

    async fn call(&self, args: AttractionsNearRouteArgs) -> Result<RouteAttractions, String> {
        let route = fetch_route(&self.maps, &args.from_place, &args.to_place, TravelMode::Transit).await?;
        let stops = route.transit_stops();

        let mut found = Vec::new();
        for stop in &stops {
            match search_nearby(&self.maps, stop.location, Some("tourist_attraction"), self.stop_radius).await {
                Ok(places) => found.extend(places),
                Err(e) => tracing::warn!(stop = %stop.name, error = %e, "nearby search failed, skipping stop"),
            }
        }

        Ok(RouteAttractions {
            route: route.headline(),
            stops: stops.into_iter().map(|s| s.name).collect(),
            attractions: dedup_places(found),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_mapping() {
        assert_eq!(category_for_interest("Museums"), "museum");
        assert_eq!(category_for_interest("history"), "tourist_attraction");
        assert_eq!(category_for_interest("architecture"), "tourist_attraction");
        assert_eq!(category_for_interest("food"), "restaurant");
        assert_eq!(category_for_interest("nature"), "park");
        assert_eq!(category_for_interest("zoo"), "tourist_attraction");
    }

    #[test]
    fn test_parse_places() {
        let body = json!({
            "status": "OK",
            "results": [
                {
                    "name": "Hungarian National Museum",
                    "vicinity": "Múzeum krt. 14-16, Budapest",
                    "rating": 4.6,
                    "place_id": "abc",
                    "geometry": {"location": {"lat": 47.4911, "lng": 19.0619}}
                },
                {"name": "  ", "vicinity": "nowhere"},
                {"name": "Szimpla Kert"}
            ]
        });
        let places = parse_places(&body);
        assert_eq!(places.len(), 2);
        assert_eq!(places[0].name, "Hungarian National Museum");
        assert_eq!(places[0].rating, Some(4.6));
        assert_eq!(places[0].location.map(|l| l.lat), Some(47.4911));
        assert_eq!(places[1].address, None);
        assert!(parse_places(&json!({"status": "ZERO_RESULTS"})).is_empty());
    }

    #[test]
    fn test_dedup_keeps_first_seen() {
        let place = |name: &str, rating: f64| Place {
            name: name.to_string(),
            address: None,
            rating: Some(rating),
            location: None,
            place_id: None,
        };
        let deduped = dedup_places(vec![
            place("Parlament", 4.8),
            place("Halászbástya", 4.7),
            place("parlament", 1.0),
        ]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].rating, Some(4.8));
    }

    #[tokio::test]
    async fn test_nearby_rejects_bad_coordinates() {
        let maps = Arc::new(MapsClient::new(None, Some("key".to_string()), 1).unwrap());
        let tool = NearbyPlacesTool::new(maps, DEFAULT_PLACES_RADIUS);
        let err = tool
            .call(NearbyPlacesArgs {
                lat: 123.0,
                lng: 0.0,
                category: None,
                radius: None,
            })
            .await
            .unwrap_err();
        assert!(err.contains("out of range"));
    }
}
