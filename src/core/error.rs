//! 统一错误处理模块
//!
//! 提供粒子系统范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **模拟核心错误** (`SimulationError`): 状态纹理、更新通道、调度器产生的错误
//! - **驱动层错误** (`EngineError`): 窗口、事件循环、配置文件等外部协作者的错误
//!
//! `EngineError` 可以包裹核心错误，驱动层只需要处理一种错误类型。

use thiserror::Error;

use crate::config::ConfigError;

/// 模拟核心错误类型
///
/// 除 `StaleHandle` 等使用错误外，所有错误都是致命的：
/// 核心不做重试，也不会渲染部分写入的状态。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// 配置错误：网格尺寸非法、设备能力缺失、着色器编译失败、分配失败
    #[error("Configuration error in {context}: {reason}")]
    Configuration { context: String, reason: String },

    /// 运行期设备错误：设备丢失或显存耗尽
    #[error("Device error: {0}")]
    RuntimeDevice(String),

    /// 句柄已过期（跨帧持有）
    #[error("Stale state handle for '{variable}': issued at frame {issued}, current frame is {current}")]
    StaleHandle {
        variable: String,
        issued: u64,
        current: u64,
    },

    /// 未知变量
    #[error("Unknown variable id {0}")]
    UnknownVariable(usize),

    /// 初始化后不允许修改依赖关系
    #[error("Dependencies of '{0}' are locked after init")]
    DependenciesLocked(String),

    /// 调度器尚未初始化
    #[error("Computation renderer is not initialized")]
    NotInitialized,

    /// 调度器已经初始化
    #[error("Computation renderer is already initialized")]
    AlreadyInitialized,
}

impl SimulationError {
    /// 创建配置错误
    pub fn configuration(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// 是否为致命错误（需要停止帧循环）
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::RuntimeDevice(_))
    }
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Initialization error: {0}")]
    Init(String),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Window creation failed: {0}")]
    Window(String),

    #[error("Event loop error: {0}")]
    EventLoop(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SimulationResult<T> = Result<T, SimulationError>;
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err = SimulationError::configuration("variable 'texturePosition'", "shader failed");
        let engine_err: EngineError = err.into();
        assert!(matches!(engine_err, EngineError::Simulation(_)));
    }

    #[test]
    fn test_error_display() {
        let err = SimulationError::configuration("update pass", "missing entry point");
        assert_eq!(
            err.to_string(),
            "Configuration error in update pass: missing entry point"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(SimulationError::RuntimeDevice("lost".into()).is_fatal());
        assert!(SimulationError::configuration("a", "b").is_fatal());
        assert!(!SimulationError::NotInitialized.is_fatal());
        assert!(!SimulationError::StaleHandle {
            variable: "p".into(),
            issued: 1,
            current: 2
        }
        .is_fatal());
    }
}
