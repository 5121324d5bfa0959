//! 透视相机与相机缩放常数
//!
//! 点的像素尺寸取决于 `camera_constant = 屏幕高度 / (tan(fov / 2) / zoom)`，
//! 只在视口或相机参数变化时重新计算。

use glam::{Mat4, Vec3};

use crate::config::CameraConfig;
use crate::impl_default;

/// 透视相机
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    /// 垂直视场角（度）
    pub fov: f32,
    /// 宽高比
    pub aspect: f32,
    /// 近平面
    pub near: f32,
    /// 远平面
    pub far: f32,
    /// 缩放
    pub zoom: f32,
    /// 位置
    pub position: Vec3,
    /// 注视点
    pub target: Vec3,
}

impl_default!(PerspectiveCamera {
    fov: 75.0,
    aspect: 800.0 / 600.0,
    near: 0.1,
    far: 15000.0,
    zoom: 1.0,
    position: Vec3::new(0.0, 1.0, -3.0),
    target: Vec3::ZERO,
});

impl PerspectiveCamera {
    /// 从配置创建
    pub fn from_config(config: &CameraConfig, width: u32, height: u32) -> Self {
        let mut camera = Self {
            fov: config.fov,
            near: config.near,
            far: config.far,
            zoom: config.zoom,
            position: Vec3::from(config.position),
            target: Vec3::from(config.target),
            ..Default::default()
        };
        camera.set_viewport(width, height);
        camera
    }

    /// 视口变化时更新宽高比
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// 考虑缩放后的实际视场角（弧度）
    pub fn effective_fov(&self) -> f32 {
        2.0 * ((0.5 * self.fov.to_radians()).tan() / self.zoom).atan()
    }

    /// 视图矩阵
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    /// 投影矩阵
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.effective_fov(), self.aspect, self.near, self.far)
    }

    /// 视图投影矩阵
    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }
}

/// 相机缩放常数
pub fn camera_constant(screen_height: f32, fov_degrees: f32, zoom: f32) -> f32 {
    screen_height / ((0.5 * fov_degrees.to_radians()).tan() / zoom)
}

/// 相机缩放常数缓存
#[derive(Debug, Default)]
pub struct CameraConstantCache {
    key: Option<(u32, u32, u32)>,
    value: f32,
    recomputed: u64,
}

impl CameraConstantCache {
    /// 获取常数，输入变化时重新计算
    pub fn get(&mut self, screen_height: u32, camera: &PerspectiveCamera) -> f32 {
        let key = (screen_height, camera.fov.to_bits(), camera.zoom.to_bits());
        if self.key != Some(key) {
            self.value = camera_constant(screen_height as f32, camera.fov, camera.zoom);
            self.key = Some(key);
            self.recomputed += 1;
            tracing::debug!(
                target: "render",
                "Camera constant recomputed: {:.3} (height {}, fov {}, zoom {})",
                self.value,
                screen_height,
                camera.fov,
                camera.zoom
            );
        }
        self.value
    }

    /// 重新计算的次数
    pub fn recomputed(&self) -> u64 {
        self.recomputed
    }
}
