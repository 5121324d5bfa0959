//! 状态纹理
//!
//! 以 RGBA32F 像素保存粒子状态的主机端数据，用于种子填充、CPU 参考后端和回读。

use glam::{UVec2, Vec4};

use crate::core::error::{SimulationError, SimulationResult};

/// 每个像素的通道数
pub const CHANNELS: usize = 4;

/// 每个像素的字节数（RGBA32F）
pub const BYTES_PER_PIXEL: u32 = (CHANNELS * std::mem::size_of::<f32>()) as u32;

/// 状态纹理（主机端）
///
/// 行主序存储，像素 `(x, y)` 位于 `(x + y * width) * 4`。
#[derive(Debug, Clone, PartialEq)]
pub struct StateTexture {
    /// 宽度
    width: u32,
    /// 高度
    height: u32,
    /// 像素数据
    data: Vec<f32>,
}

impl StateTexture {
    /// 创建全零状态纹理
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width as usize * height as usize * CHANNELS],
        }
    }

    /// 通过种子函数填充
    ///
    /// 种子函数对每个像素恰好调用一次，参数为像素的网格坐标 `(x, y)`。
    pub fn from_seed<F>(width: u32, height: u32, mut seed: F) -> Self
    where
        F: FnMut(u32, u32) -> Vec4,
    {
        let mut texture = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let value = seed(x, y);
                texture.set(x, y, value);
            }
        }
        texture
    }

    /// 从原始数据创建
    pub fn from_raw(width: u32, height: u32, data: Vec<f32>) -> SimulationResult<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(SimulationError::configuration(
                "state texture",
                format!("expected {} floats, got {}", expected, data.len()),
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// 宽度
    pub fn width(&self) -> u32 {
        self.width
    }

    /// 高度
    pub fn height(&self) -> u32 {
        self.height
    }

    /// 尺寸
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    /// 像素总数
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (x as usize + y as usize * self.width as usize) * CHANNELS
    }

    /// 读取像素
    ///
    /// # Panics
    ///
    /// 坐标越界时 panic。
    pub fn get(&self, x: u32, y: u32) -> Vec4 {
        let i = self.offset(x, y);
        Vec4::from_slice(&self.data[i..i + CHANNELS])
    }

    /// 读取像素，坐标钳制到边缘（与 GPU `textureLoad` 越界前的钳制一致）
    pub fn load_clamped(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.get(x, y)
    }

    /// 按查找坐标最近邻采样
    pub fn sample_nearest(&self, uv: glam::Vec2) -> Vec4 {
        let max = glam::Vec2::new(
            self.width.saturating_sub(1) as f32,
            self.height.saturating_sub(1) as f32,
        );
        let texel = (uv.clamp(glam::Vec2::ZERO, glam::Vec2::ONE) * max).round();
        self.get(texel.x as u32, texel.y as u32)
    }

    /// 写入像素
    pub fn set(&mut self, x: u32, y: u32, value: Vec4) {
        let i = self.offset(x, y);
        value.write_to_slice(&mut self.data[i..i + CHANNELS]);
    }

    /// 原始浮点数据
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// 原始字节（上传到 GPU）
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// 是否所有通道都是有限值
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// 默认网格种子：粒子平铺在 XZ 平面上，间距 0.25
///
/// `(x - width/2) * 0.25, 0, (y - width/2) * 0.25, 0`
pub fn grid_seed(width: u32) -> impl FnMut(u32, u32) -> Vec4 {
    let half = width as f32 / 2.0;
    move |x, y| Vec4::new((x as f32 - half) * 0.25, 0.0, (y as f32 - half) * 0.25, 0.0)
}
