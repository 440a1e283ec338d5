//! Agent 运行时装配
//!
//! 按配置选择 LLM 后端、注册能力、构建 Orchestrator 与 ItineraryPlanner；
//! TurnHints 把出行方式 / 语言等界面选项折叠进用户输入。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::orchestrator::DEFAULT_SYSTEM_PROMPT;
use crate::core::{AgentError, LoopOptions, Orchestrator};
use crate::itinerary::ItineraryPlanner;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::tools::{
    AttractionsNearRouteTool, CapabilityRegistry, DescribeAttractionsTool, EchoTool,
    ExtractAttractionsTool, ExtractTripTool, GtfsIndex, MapsClient, NearbyPlacesTool,
    RouteLookupTool, TransitLookupTool, TravelMode,
};

/// 界面选项：由调用方折叠进 user_text 后再 submit
#[derive(Debug, Clone, Default)]
pub struct TurnHints {
    pub transport_mode: Option<TravelMode>,
    pub language: Option<String>,
}

impl TurnHints {
    pub fn is_empty(&self) -> bool {
        self.transport_mode.is_none() && self.language.is_none()
    }

    pub fn apply(&self, user_text: &str) -> String {
        let mut text = user_text.trim().to_string();
        if let Some(mode) = self.transport_mode {
            text.push_str(&format!("\n(Preferred transport mode: {}.)", mode.as_str()));
        }
        if let Some(lang) = self.language.as_deref().filter(|l| !l.trim().is_empty()) {
            text.push_str(&format!("\n(Please answer in {}.)", lang.trim()));
        }
        text
    }
}

/// 是否使用离线 Mock：provider = mock 或没有 OPENAI_API_KEY
pub fn use_mock_llm(cfg: &AppConfig) -> bool {
    cfg.llm.provider.eq_ignore_ascii_case("mock") || std::env::var("OPENAI_API_KEY").is_err()
}

/// 根据配置与环境变量选择 LLM 后端；第二个返回值为带网页检索的模型（describe_attractions 用）
pub fn create_llm_from_config(cfg: &AppConfig) -> (Arc<dyn LlmClient>, Arc<dyn LlmClient>) {
    if use_mock_llm(cfg) {
        tracing::warn!("No OPENAI_API_KEY or provider = mock, using Mock LLM");
        return (Arc::new(MockLlmClient), Arc::new(MockLlmClient));
    }
    let key = std::env::var("OPENAI_API_KEY").ok();
    let base = cfg.llm.base_url.as_deref();
    tracing::info!(model = %cfg.llm.model, search_model = %cfg.llm.search_model, "Using OpenAI LLM");
    (
        Arc::new(OpenAiClient::new(base, &cfg.llm.model, key.as_deref())),
        Arc::new(OpenAiClient::new(base, &cfg.llm.search_model, key.as_deref())),
    )
}

/// 注册全部能力；echo 只在 Mock 模式注册，transit_lookup 只在 GTFS 目录可读时注册
pub fn create_registry(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    search_llm: Arc<dyn LlmClient>,
    mock: bool,
) -> Result<CapabilityRegistry, AgentError> {
    let maps = Arc::new(MapsClient::new(
        cfg.tools.maps.base_url.as_deref(),
        cfg.tools.maps.resolved_api_key(),
        cfg.tools.tool_timeout_secs,
    )?);
    if !maps.has_api_key() {
        tracing::warn!("MAPS_API_KEY not set, map capabilities will report errors");
    }

    let mut builder = CapabilityRegistry::builder()
        .timeout(Duration::from_secs(cfg.tools.tool_timeout_secs))
        .register(RouteLookupTool::new(maps.clone()))
        .register(NearbyPlacesTool::new(maps.clone(), cfg.tools.maps.places_radius))
        .register(AttractionsNearRouteTool::new(maps, cfg.tools.maps.route_stop_radius))
        .register(ExtractTripTool::new(llm.clone()))
        .register(ExtractAttractionsTool::new(llm))
        .register(DescribeAttractionsTool::new(search_llm));

    if let Some(dir) = &cfg.tools.transit.gtfs_dir {
        match GtfsIndex::load(dir) {
            Ok(index) => {
                tracing::info!(
                    stops = index.stop_count(),
                    routes = index.route_count(),
                    "GTFS data loaded"
                );
                builder = builder.register(TransitLookupTool::new(Arc::new(index)));
            }
            Err(e) => tracing::warn!(error = %e, "GTFS data unavailable, transit_lookup disabled"),
        }
    }

    if mock {
        builder = builder.register(EchoTool);
    }
    Ok(builder.build())
}

/// system prompt：配置文件指定的路径 > 内置提示
pub fn load_system_prompt(cfg: &AppConfig) -> String {
    cfg.app
        .system_prompt_path
        .as_ref()
        .and_then(|p| match std::fs::read_to_string(p) {
            Ok(s) if !s.trim().is_empty() => Some(s),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %p.display(), error = %e, "system prompt not readable, using built-in");
                None
            }
        })
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
}

/// 预构建的组件：对话编排器与行程规划器共享同一个能力注册表
pub struct AgentComponents {
    pub orchestrator: Arc<Orchestrator>,
    pub itinerary: ItineraryPlanner,
    pub registry: Arc<CapabilityRegistry>,
}

pub fn create_agent_components(cfg: &AppConfig) -> Result<AgentComponents, AgentError> {
    let mock = use_mock_llm(cfg);
    let (llm, search_llm) = create_llm_from_config(cfg);
    let registry = Arc::new(create_registry(cfg, llm.clone(), search_llm, mock)?);
    tracing::info!(capabilities = ?registry.names(), "capabilities registered");

    let options = LoopOptions::from_config(cfg, load_system_prompt(cfg));
    let orchestrator = Arc::new(Orchestrator::new(llm.clone(), registry.clone(), options));
    let itinerary = ItineraryPlanner::new(registry.clone(), llm);

    Ok(AgentComponents {
        orchestrator,
        itinerary,
        registry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[test]
    fn test_turn_hints_apply() {
        let hints = TurnHints {
            transport_mode: Some(TravelMode::Walking),
            language: Some("Magyar".to_string()),
        };
        assert_eq!(
            hints.apply("  How do I get to the Bazilika? "),
            "How do I get to the Bazilika?\n(Preferred transport mode: walking.)\n(Please answer in Magyar.)"
        );
        assert_eq!(TurnHints::default().apply("hi"), "hi");
        assert!(TurnHints::default().is_empty());
    }

    #[test]
    fn test_registry_contents() {
        let cfg = AppConfig::default();
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::repeating("x"));
        let registry = create_registry(&cfg, llm.clone(), llm.clone(), false).unwrap();
        let names = registry.names();
        assert!(names.contains(&"route_lookup".to_string()));
        assert!(names.contains(&"describe_attractions".to_string()));
        assert!(!names.contains(&"echo".to_string()));
        assert!(!names.contains(&"transit_lookup".to_string()));

        let with_echo = create_registry(&cfg, llm.clone(), llm, true).unwrap();
        assert!(with_echo.resolve("echo").is_ok());
    }

    #[test]
    fn test_gtfs_dir_registers_transit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stops.txt"), "stop_id,stop_name\n1,Astoria\n").unwrap();
        std::fs::write(dir.path().join("routes.txt"), "route_id,route_short_name\n1,M2\n").unwrap();
        let mut cfg = AppConfig::default();
        cfg.tools.transit.gtfs_dir = Some(dir.path().to_path_buf());
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::repeating("x"));
        let registry = create_registry(&cfg, llm.clone(), llm, false).unwrap();
        assert!(registry.resolve("transit_lookup").is_ok());
    }
}
