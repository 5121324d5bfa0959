//! 核心模块
//!
//! 包含驱动层的核心功能：
//! - `engine` - 主入口和运行循环
//! - `context` - 模拟上下文（调度器、相机、视口、指针）
//! - `frame` - 帧循环与下一帧请求端口
//! - `clock` - 帧时钟与帧统计
//! - `error` - 错误类型定义

#[macro_use]
pub mod macros;
pub mod clock;
pub mod context;
pub mod engine;
pub mod error;
pub mod frame;

// 重新导出错误类型
pub use error::{EngineError, EngineResult, SimulationError, SimulationResult};

// 重新导出主要类型
pub use clock::{Clock, FrameStats, FrameTime};
pub use context::{pointer_from_cursor, SimulationContext};
pub use engine::Engine;
pub use frame::{FrameLoop, FrameRequester, LoopState};
