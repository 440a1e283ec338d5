//! 认知层：Planning 节点、决策适配器与 决策 / 执行 主循环

pub mod decider;
pub mod events;
pub mod loop_;
pub mod planner;

pub use decider::{classify, DecisionOutcome, Decider};
pub use events::ReactEvent;
pub use loop_::{react_loop, ReactSession};
pub use planner::{parse_plan, Plan, Planner};
