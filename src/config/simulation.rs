use super::{ConfigError, ConfigResult};
use crate::gpgpu::programs::ProgramKind;
use serde::{Deserialize, Serialize};

/// 默认网格边长（2500 个粒子）
pub const DEFAULT_GRID_SIZE: u32 = 50;

/// 网格边长上限（wgpu 默认的二维纹理边长限制）
pub const MAX_GRID_SIZE: u32 = 8192;

/// 模拟配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// 网格边长 N，粒子数为 N²
    pub grid_size: u32,

    /// 位置变量名（着色器中的纹理名）
    pub variable: String,

    /// 更新程序
    pub program: ProgramKind,

    /// 覆盖程序默认参数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<[f32; 4]>,

    /// 点尺寸（世界单位）
    pub point_size: f32,

    /// 点颜色 (r, g, b, a)
    pub point_color: [f32; 4],
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            variable: "texture_position".to_string(),
            program: ProgramKind::default(),
            params: None,
            point_size: 0.1,
            point_color: [0.1, 0.1, 0.1, 1.0],
        }
    }
}

impl SimulationConfig {
    /// 粒子数量，溢出时为 `None`
    pub fn particle_count(&self) -> Option<u32> {
        self.grid_size.checked_mul(self.grid_size)
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.grid_size == 0 {
            return Err(ConfigError::ValidationError(
                "Grid size must be at least 1".to_string(),
            ));
        }
        if self.grid_size > MAX_GRID_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "Grid size {} exceeds the maximum of {}",
                self.grid_size, MAX_GRID_SIZE
            )));
        }
        if !(self.point_size.is_finite() && self.point_size > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid point size {}",
                self.point_size
            )));
        }
        if self.variable.is_empty() {
            return Err(ConfigError::ValidationError(
                "Variable name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// 相机配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// 垂直视场角（度）
    pub fov: f32,
    /// 近平面
    pub near: f32,
    /// 远平面
    pub far: f32,
    /// 缩放
    pub zoom: f32,
    /// 位置
    pub position: [f32; 3],
    /// 注视点
    pub target: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 75.0,
            near: 0.1,
            far: 15000.0,
            zoom: 1.0,
            position: [0.0, 1.0, -3.0],
            target: [0.0, 0.0, 0.0],
        }
    }
}

impl CameraConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.fov > 0.0 && self.fov < 180.0) {
            return Err(ConfigError::ValidationError(format!(
                "Field of view {} must be in (0, 180)",
                self.fov
            )));
        }
        if !(self.near > 0.0 && self.far > self.near) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid clip planes near={} far={}",
                self.near, self.far
            )));
        }
        if !(self.zoom > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "Zoom {} must be positive",
                self.zoom
            )));
        }
        if self.position == self.target {
            return Err(ConfigError::ValidationError(
                "Camera position and target coincide".to_string(),
            ));
        }
        Ok(())
    }
}
