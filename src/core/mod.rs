//! 核心编排层：错误与恢复、状态机状态、编排器与会话任务

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod state;

pub use error::{AgentError, CapabilityError, CapabilityErrorKind, RecoveryAction};
pub use orchestrator::{spawn_session, Command, LoopOptions, Orchestrator, TurnOutcome};
pub use recovery::RecoveryEngine;
pub use state::{AgentPhase, AgentState, LoopState, TerminalState, UiState};
