//! 状态到几何的桥接
//!
//! 每个粒子在初始化时分配一个固定的查找坐标，渲染通道按这个坐标
//! 从当前状态纹理取出位置。查找表和占位位置在之后的帧里都不会改变。

use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};

use crate::gpgpu::texture::StateTexture;

/// 粒子实例数据（顶点缓冲区）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointInstance {
    /// 占位位置，始终为原点
    pub position: [f32; 3],
    /// 状态纹理查找坐标
    pub lookup: [f32; 2],
}

impl PointInstance {
    /// 实例顶点缓冲区布局
    pub fn vertex_buffer_layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<PointInstance>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// 查找坐标表
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    grid: u32,
    coords: Vec<Vec2>,
}

impl LookupTable {
    /// 为 N×N 网格生成查找表
    ///
    /// 格子 (i, j) 的坐标为 `(i / (N-1), j / (N-1))`，j 在外层循环；
    /// N = 1 时唯一的坐标为 (0, 0)。
    pub fn new(grid: u32) -> Self {
        let denom = grid.saturating_sub(1).max(1) as f32;
        let mut coords = Vec::with_capacity((grid * grid) as usize);
        for j in 0..grid {
            for i in 0..grid {
                coords.push(Vec2::new(i as f32 / denom, j as f32 / denom));
            }
        }
        Self { grid, coords }
    }

    /// 网格边长
    pub fn grid(&self) -> u32 {
        self.grid
    }

    /// 粒子数量
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// 第 p 个粒子的坐标
    pub fn get(&self, particle: usize) -> Option<Vec2> {
        self.coords.get(particle).copied()
    }

    /// 全部坐标
    pub fn coords(&self) -> &[Vec2] {
        &self.coords
    }

    /// 组装实例数据（占位位置全为原点）
    pub fn instances(&self) -> Vec<PointInstance> {
        self.coords
            .iter()
            .map(|uv| PointInstance {
                position: [0.0; 3],
                lookup: uv.to_array(),
            })
            .collect()
    }
}

/// 查找坐标对应的纹素（与着色器中的 `round(uv * (dims - 1))` 一致）
pub fn texel_for(uv: Vec2, size: UVec2) -> UVec2 {
    let max = (size.as_vec2() - Vec2::ONE).max(Vec2::ZERO);
    (uv * max).round().clamp(Vec2::ZERO, max).as_uvec2()
}

/// 按查找表从状态纹理取出每个粒子的位置
pub fn sample_positions(table: &LookupTable, state: &StateTexture) -> Vec<Vec3> {
    table
        .coords()
        .iter()
        .map(|uv| state.sample_nearest(*uv).truncate())
        .collect()
}

/// 渲染通道的 CPU 参考投影结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    /// 裁剪空间位置
    pub clip: Vec4,
    /// 像素尺寸
    pub size_px: f32,
}

impl ProjectedPoint {
    /// 是否在视锥内（位于相机前方且在 NDC 范围内）
    pub fn is_visible(&self) -> bool {
        if self.clip.w <= 0.0 {
            return false;
        }
        let ndc = self.clip.truncate() / self.clip.w;
        ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0 && (0.0..=1.0).contains(&ndc.z)
    }
}

/// 与顶点着色器相同的投影：`size_px = point_size * camera_constant / clip.w`
pub fn project_point(
    position: Vec3,
    view_projection: Mat4,
    point_size: f32,
    camera_constant: f32,
) -> ProjectedPoint {
    let clip = view_projection * position.extend(1.0);
    let size_px = if clip.w > 0.0 {
        point_size * camera_constant / clip.w
    } else {
        0.0
    };
    ProjectedPoint { clip, size_px }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_row_major_j_outer() {
        let table = LookupTable::new(3);
        assert_eq!(table.len(), 9);
        assert_eq!(table.get(0), Some(Vec2::new(0.0, 0.0)));
        assert_eq!(table.get(1), Some(Vec2::new(0.5, 0.0)));
        assert_eq!(table.get(3), Some(Vec2::new(0.0, 0.5)));
        assert_eq!(table.get(8), Some(Vec2::new(1.0, 1.0)));
    }

    #[test]
    fn test_single_particle_lookup() {
        let table = LookupTable::new(1);
        assert_eq!(table.coords(), &[Vec2::ZERO]);
    }

    #[test]
    fn test_instances_are_placeholders() {
        let instances = LookupTable::new(4).instances();
        assert_eq!(instances.len(), 16);
        assert!(instances.iter().all(|i| i.position == [0.0; 3]));
        assert_eq!(std::mem::size_of::<PointInstance>(), 20);
    }

    #[test]
    fn test_texel_for_hits_every_cell() {
        let table = LookupTable::new(5);
        let size = UVec2::splat(5);
        for (p, uv) in table.coords().iter().enumerate() {
            let texel = texel_for(*uv, size);
            assert_eq!(texel, UVec2::new(p as u32 % 5, p as u32 / 5));
        }
    }

    #[test]
    fn test_point_size_shrinks_with_distance() {
        let vp = Mat4::perspective_rh(75.0_f32.to_radians(), 1.0, 0.1, 100.0)
            * Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let near = project_point(Vec3::new(0.0, 0.0, 2.0), vp, 0.1, 600.0);
        let far = project_point(Vec3::new(0.0, 0.0, -2.0), vp, 0.1, 600.0);
        assert!(near.is_visible() && far.is_visible());
        assert!(near.size_px > far.size_px);
    }

    #[test]
    fn test_point_behind_camera_hidden() {
        let vp = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0)
            * Mat4::look_at_rh(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::Y);
        let behind = project_point(Vec3::new(0.0, 0.0, 5.0), vp, 0.1, 600.0);
        assert!(!behind.is_visible());
        assert_eq!(behind.size_px, 0.0);
    }
}
