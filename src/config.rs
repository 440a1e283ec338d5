//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `EXPLORER__*` 覆盖（双下划线表示嵌套，如 `EXPLORER__AGENT__MAX_STEPS=8`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;
use crate::tools::places::{DEFAULT_PLACES_RADIUS, DEFAULT_ROUTE_STOP_RADIUS};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、system prompt 文件、回复语言
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// system prompt 文件；不存在时用内置提示
    pub system_prompt_path: Option<PathBuf>,
    /// 默认回复语言（如 "English"、"Magyar"），会作为提示拼进用户输入
    pub language: Option<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "explorer".to_string(),
            system_prompt_path: None,
            language: None,
        }
    }
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock；没有 OPENAI_API_KEY 时总是 mock
    pub provider: String,
    pub model: String,
    /// 带网页检索能力的模型（describe_attractions 使用）
    pub search_model: String,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            search_model: "gpt-4o-search-preview".to_string(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次 Oracle 调用超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [agent] 段：循环预算与执行策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// DECIDE/EXECUTE 往返上限
    pub max_steps: usize,
    /// 每次 DECIDE 前是否先做一次意图规划
    pub planning_enabled: bool,
    /// 同一批调用是否并发执行
    pub parallel_execution: bool,
    pub max_concurrent_capabilities: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: 5,
            planning_enabled: false,
            parallel_execution: true,
            max_concurrent_capabilities: 3,
        }
    }
}

/// [tools] 段：能力超时、地图服务、GTFS 数据目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次能力调用超时（秒）
    pub tool_timeout_secs: u64,
    pub maps: MapsSection,
    pub transit: TransitSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            maps: MapsSection::default(),
            transit: TransitSection::default(),
        }
    }
}

/// [tools.maps] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MapsSection {
    pub base_url: Option<String>,
    /// 未设置时读环境变量 MAPS_API_KEY
    pub api_key: Option<String>,
    /// nearby_places 默认半径（米）
    pub places_radius: u32,
    /// attractions_near_route 在每个站点周围的搜索半径（米）
    pub route_stop_radius: u32,
}

impl Default for MapsSection {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            places_radius: DEFAULT_PLACES_RADIUS,
            route_stop_radius: DEFAULT_ROUTE_STOP_RADIUS,
        }
    }
}

impl MapsSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("MAPS_API_KEY").ok())
    }
}

/// [tools.transit] 段：GTFS 目录（含 stops.txt / routes.txt），未设置则不注册 transit_lookup
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransitSection {
    pub gtfs_dir: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 EXPLORER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键；文件不存在时报错）
/// 3. 最后叠加环境变量 EXPLORER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("EXPLORER")
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| AgentError::ConfigError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_steps, 5);
        assert!(!cfg.agent.planning_enabled);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.tools.maps.route_stop_radius, 800);
        assert_eq!(cfg.llm.timeouts.request, 60);
    }

    #[test]
    fn test_load_explicit_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explorer.toml");
        std::fs::write(
            &path,
            "[agent]\nmax_steps = 2\nplanning_enabled = true\n\n[tools.maps]\nplaces_radius = 500\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.agent.max_steps, 2);
        assert!(cfg.agent.planning_enabled);
        assert!(cfg.agent.parallel_execution);
        assert_eq!(cfg.tools.maps.places_radius, 500);
        assert_eq!(cfg.tools.maps.route_stop_radius, 800);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }

    #[test]
    fn test_bad_value_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explorer.toml");
        std::fs::write(&path, "[agent]\nmax_steps = \"many\"\n").unwrap();
        let err = load_config(Some(path)).unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }
}
