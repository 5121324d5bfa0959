use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// 窗口标题
    pub title: String,

    /// 初始窗口分辨率
    pub resolution: Resolution,

    /// 垂直同步
    pub vsync: bool,

    /// 清屏颜色 (r, g, b, a)
    pub clear_color: [f64; 4],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            title: "Feedback Particles".to_string(),
            resolution: Resolution::default(),
            vsync: true,
            clear_color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

impl GraphicsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid resolution".to_string(),
            ));
        }
        if self.clear_color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(ConfigError::ValidationError(
                "Clear color channels must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// 清屏颜色
    pub fn clear(&self) -> wgpu::Color {
        let [r, g, b, a] = self.clear_color;
        wgpu::Color { r, g, b, a }
    }
}

/// 分辨率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// 宽度（像素）
    pub width: u32,
    /// 高度（像素）
    pub height: u32,
}

impl_default!(Resolution {
    width: 800,
    height: 600,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_white_800x600() {
        let config = GraphicsConfig::default();
        assert_eq!(config.resolution, Resolution { width: 800, height: 600 });
        assert_eq!(config.clear(), wgpu::Color::WHITE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_resolution() {
        let mut config = GraphicsConfig::default();
        config.resolution.height = 0;
        assert!(config.validate().is_err());
    }
}
