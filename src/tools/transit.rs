//! 公共交通时刻表查找（transit_lookup）：基于本地 GTFS 文本文件
//!
//! 启动时读取 stops.txt 与 routes.txt 建立内存索引；查询按名称不区分大小写做子串匹配。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::Capability;

const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GtfsStop {
    pub stop_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GtfsRoute {
    pub route_id: String,
    pub short_name: String,
    pub long_name: String,
    /// 按 GTFS route_type 换算的交通工具名
    pub vehicle: String,
}

/// route_type → 交通工具
fn vehicle_name(route_type: &str) -> &'static str {
    match route_type.trim() {
        "0" | "900" => "tram",
        "1" => "subway",
        "2" | "109" => "rail",
        "3" | "700" => "bus",
        "4" => "ferry",
        "11" | "800" => "trolleybus",
        "7" => "funicular",
        _ => "other",
    }
}

/// 解析一行 CSV（支持双引号包裹与 "" 转义）
pub fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// 读取一个 GTFS 表：首行为表头，返回 列名 → 值 的行列表
fn read_table(path: &Path) -> Result<Vec<HashMap<String, String>>, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<String> = lines
        .next()
        .map(|h| parse_csv_line(h).into_iter().map(|c| c.trim().to_string()).collect())
        .ok_or_else(|| format!("{}: empty file", path.display()))?;
    Ok(lines
        .map(|line| {
            header
                .iter()
                .cloned()
                .zip(parse_csv_line(line))
                .collect::<HashMap<_, _>>()
        })
        .collect())
}

fn field(row: &HashMap<String, String>, key: &str) -> String {
    row.get(key).map(|v| v.trim().to_string()).unwrap_or_default()
}

/// 内存中的 GTFS 索引
#[derive(Debug, Default)]
pub struct GtfsIndex {
    stops: Vec<GtfsStop>,
    routes: Vec<GtfsRoute>,
}

impl GtfsIndex {
    /// 从目录加载 stops.txt 与 routes.txt
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, String> {
        let dir = dir.as_ref();
        let stops = read_table(&dir.join("stops.txt"))?
            .into_iter()
            .filter_map(|row| {
                let name = field(&row, "stop_name");
                if name.is_empty() {
                    return None;
                }
                Some(GtfsStop {
                    stop_id: field(&row, "stop_id"),
                    name,
                    lat: field(&row, "stop_lat").parse().ok(),
                    lng: field(&row, "stop_lon").parse().ok(),
                })
            })
            .collect();
        let routes = read_table(&dir.join("routes.txt"))?
            .into_iter()
            .map(|row| GtfsRoute {
                route_id: field(&row, "route_id"),
                short_name: field(&row, "route_short_name"),
                long_name: field(&row, "route_long_name"),
                vehicle: vehicle_name(&field(&row, "route_type")).to_string(),
            })
            .collect();
        Ok(Self { stops, routes })
    }

    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// 名称子串匹配；同名站点（不同站台）只保留第一个
    pub fn lookup(&self, query: &str, limit: usize) -> TransitMatches {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return TransitMatches::default();
        }

        let mut stops: Vec<GtfsStop> = Vec::new();
        for stop in &self.stops {
            if stops.len() >= limit {
                break;
            }
            if stop.name.to_lowercase().contains(&needle) && !stops.iter().any(|s| s.name == stop.name) {
                stops.push(stop.clone());
            }
        }

        let routes = self
            .routes
            .iter()
            .filter(|r| {
                r.short_name.to_lowercase() == needle || r.long_name.to_lowercase().contains(&needle)
            })
            .take(limit)
            .cloned()
            .collect();

        TransitMatches { stops, routes }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransitMatches {
    pub stops: Vec<GtfsStop>,
    pub routes: Vec<GtfsRoute>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TransitLookupArgs {
    /// 站点名或线路名（如 "Deák" 或 "M2"）
    pub query: String,
    /// 每类结果最多返回多少条，默认 10
    #[serde(default)]
    pub limit: Option<usize>,
}

pub struct TransitLookupTool {
    index: Arc<GtfsIndex>,
}

impl TransitLookupTool {
    pub fn new(index: Arc<GtfsIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Capability for TransitLookupTool {
    const NAME: &'static str = "transit_lookup";
    type Args = TransitLookupArgs;
    type Output = TransitMatches;

    fn description(&self) -> &str {
        "Look up public transport stops and lines from the local schedule data. \
         Args: {\"query\": \"Deák\", \"limit\": 10}"
    }

    async fn call(&self, args: TransitLookupArgs) -> Result<TransitMatches, String> {
        if args.query.trim().is_empty() {
            return Err("query must not be empty".to_string());
        }
        Ok(self.index.lookup(&args.query, args.limit.unwrap_or(DEFAULT_LIMIT).max(1)))
    }
}
