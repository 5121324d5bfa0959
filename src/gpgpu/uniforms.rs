//! 更新通道的 Uniform 输入

use glam::{UVec2, Vec2, Vec4};

/// 每帧推送给更新通道的输入
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateUniforms {
    /// 模拟经过时间（秒，单调递增）
    pub time: f32,
    /// 帧间隔（秒）
    pub delta: f32,
    /// 指针位置（设备归一化坐标，[-1, 1]）
    pub pointer: Vec2,
}

impl Default for UpdateUniforms {
    fn default() -> Self {
        Self {
            time: 0.0,
            delta: 0.0,
            pointer: Vec2::ZERO,
        }
    }
}

impl UpdateUniforms {
    /// 创建指定时间的输入
    pub fn at(time: f32) -> Self {
        Self {
            time,
            ..Default::default()
        }
    }
}

/// 更新通道 Uniform 的 GPU 布局（对应 WGSL `SimUniforms`）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuUpdateUniforms {
    /// 网格分辨率
    pub resolution: [f32; 2],
    /// 经过时间
    pub time: f32,
    /// 帧间隔
    pub delta: f32,
    /// 指针位置
    pub pointer: [f32; 2],
    /// 填充
    pub _padding: [f32; 2],
    /// 变量自定义参数
    pub params: [f32; 4],
}

impl GpuUpdateUniforms {
    /// 打包
    pub fn pack(uniforms: &UpdateUniforms, resolution: UVec2, params: Vec4) -> Self {
        Self {
            resolution: resolution.as_vec2().to_array(),
            time: uniforms.time,
            delta: uniforms.delta,
            pointer: uniforms.pointer.to_array(),
            _padding: [0.0; 2],
            params: params.to_array(),
        }
    }
}
