//! 能力层：注册表、执行节点与具体能力（路线 / 周边地点 / 抽取 / 介绍 / 公交时刻表）

pub mod describe;
pub mod directions;
pub mod echo;
pub mod executor;
pub mod extract;
pub mod maps;
pub mod places;
pub mod registry;
pub mod schema;
pub mod transit;

pub use describe::DescribeAttractionsTool;
pub use directions::{fetch_route, RouteLookupTool, RouteSummary, TravelMode};
pub use echo::EchoTool;
pub use executor::{ExecutionNode, ExecutionRecord};
pub use extract::{ExtractAttractionsTool, ExtractTripTool, TripEndpoints};
pub use maps::{LatLng, MapsClient};
pub use places::{AttractionsNearRouteTool, NearbyPlacesTool, Place};
pub use registry::{
    Capability, CapabilityDescriptor, CapabilityRegistry, CapabilityRegistryBuilder, CapabilitySpec,
};
pub use schema::invocation_schema_json;
pub use transit::{GtfsIndex, TransitLookupTool};
