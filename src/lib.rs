//! Explorer - Rust 出行助手智能体
//!
//! 模块划分：
//! - **agent**: 运行时装配（LLM 后端选择、能力注册、界面选项折叠）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、状态机状态、编排器与会话任务
//! - **itinerary**: 基于能力注册表的固定行程规划流水线
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / 脚本化）
//! - **memory**: 只追加的消息账本
//! - **observability**: tracing 初始化
//! - **react**: Planning 节点、决策适配器、决策 / 执行 主循环
//! - **tools**: 能力注册表、执行节点与具体能力（路线、地点、抽取、介绍、公交）

pub mod agent;
pub mod config;
pub mod core;
pub mod itinerary;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
