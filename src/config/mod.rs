/// 统一配置系统
///
/// 提供TOML/JSON配置文件和环境变量覆盖
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod graphics;
pub mod simulation;

pub use graphics::{GraphicsConfig, Resolution};
pub use simulation::{CameraConfig, SimulationConfig};

use crate::gpgpu::programs::ProgramKind;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "PARTICLES_";

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 模拟配置
    pub simulation: SimulationConfig,

    /// 相机配置
    pub camera: CameraConfig,

    /// 图形配置
    pub graphics: GraphicsConfig,

    /// 日志配置
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 按扩展名加载（`.json` 为 JSON，其余按 TOML）
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 保存为JSON文件
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(format!("{}{}", ENV_PREFIX, key)).ok());
    }

    /// 从任意键值来源覆盖配置（键不带前缀），无法解析的值被忽略
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(value: Option<String>, slot: &mut T) {
            if let Some(parsed) = value.and_then(|v| v.trim().parse().ok()) {
                *slot = parsed;
            }
        }

        // 模拟配置
        parse(lookup("GRID_SIZE"), &mut self.simulation.grid_size);
        parse(lookup("POINT_SIZE"), &mut self.simulation.point_size);
        if let Some(program) = lookup("PROGRAM")
            .and_then(|v| {
                serde_json::from_value::<ProgramKind>(serde_json::Value::String(v.to_lowercase())).ok()
            })
        {
            self.simulation.program = program;
        }

        // 相机配置
        parse(lookup("FOV"), &mut self.camera.fov);
        parse(lookup("ZOOM"), &mut self.camera.zoom);

        // 图形配置
        parse(lookup("WIDTH"), &mut self.graphics.resolution.width);
        parse(lookup("HEIGHT"), &mut self.graphics.resolution.height);
        parse(lookup("VSYNC"), &mut self.graphics.vsync);

        // 日志配置
        if let Some(level) = lookup("LOG_LEVEL").and_then(|v| LogLevel::parse(&v)) {
            self.logging.level = level;
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.simulation.validate()?;
        self.camera.validate()?;
        self.graphics.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./particles.toml
    /// 2. ./particles.json
    /// 3. ~/.config/feedback_particles/config.toml
    /// 4. 使用默认配置
    ///
    /// 返回配置及其来源（日志系统此时尚未初始化，由调用方记录）。
    pub fn load_or_default() -> (Self, Option<PathBuf>) {
        let mut candidates = vec![PathBuf::from("particles.toml"), PathBuf::from("particles.json")];
        if let Some(home) = env::var_os("HOME") {
            candidates.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("feedback_particles")
                    .join("config.toml"),
            );
        }

        for path in candidates {
            if let Ok(config) = Self::from_file(&path) {
                return (config, Some(path));
            }
        }
        (Self::default(), None)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（`RUST_LOG` 优先）
    pub level: LogLevel,

    /// 帧统计输出间隔（秒）
    pub stats_interval_secs: f32,
}

use crate::impl_default;

impl_default!(LoggingConfig {
    level: LogLevel::Info,
    stats_interval_secs: 1.0,
});

impl LoggingConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.stats_interval_secs > 0.0) {
            return Err(ConfigError::ValidationError(
                "Stats interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    /// `EnvFilter` 指令
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// 解析级别名（不区分大小写）
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.grid_size, 50);
        assert_eq!(config.camera.fov, 75.0);
    }

    #[test]
    fn test_toml_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            config.graphics.resolution.width,
            parsed.graphics.resolution.width
        );
        assert_eq!(config.simulation.program, parsed.simulation.program);
    }

    #[test]
    fn test_json_serialization() {
        let config = EngineConfig::default();
        let json_str = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json_str).unwrap();
        assert_eq!(config.camera.far, parsed.camera.far);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [simulation]
            grid_size = 8
            program = "identity"
            "#,
        )
        .unwrap();
        assert_eq!(config.simulation.grid_size, 8);
        assert_eq!(config.simulation.program, ProgramKind::Identity);
        assert_eq!(config.graphics.resolution.width, 800);
    }

    #[test]
    fn test_overrides() {
        let mut config = EngineConfig::default();
        config.apply_overrides(|key| match key {
            "GRID_SIZE" => Some("16".into()),
            "PROGRAM" => Some("Identity".into()),
            "VSYNC" => Some("false".into()),
            "LOG_LEVEL" => Some("DEBUG".into()),
            "WIDTH" => Some("not a number".into()),
            _ => None,
        });
        assert_eq!(config.simulation.grid_size, 16);
        assert_eq!(config.simulation.program, ProgramKind::Identity);
        assert!(!config.graphics.vsync);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.graphics.resolution.width, 800);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            EngineConfig::from_toml_str("simulation = 3"),
            Err(ConfigError::ParseError(_))
        ));
    }
}
