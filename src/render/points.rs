//! 粒子点渲染通道
//!
//! 每个粒子是一个实例化的四边形（三角形带，4 个顶点）。顶点着色器按查找坐标
//! 从当前状态纹理取出位置，按 `point_size * camera_constant / clip.w` 决定像素尺寸，
//! 片元着色器裁掉圆外的部分。渲染通道只读取状态纹理。

use std::collections::HashMap;

use glam::{Mat4, UVec2, Vec4};
use wgpu::util::DeviceExt;

use super::bridge::{LookupTable, PointInstance};
use crate::gpgpu::backend::TargetId;

/// 渲染 uniform
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RenderUniforms {
    /// 视图投影矩阵
    pub view_proj: [[f32; 4]; 4],
    /// 视口尺寸（像素）
    pub viewport: [f32; 2],
    /// 相机缩放常数
    pub camera_constant: f32,
    /// 点尺寸（世界单位）
    pub point_size: f32,
    /// 点颜色
    pub color: [f32; 4],
}

impl RenderUniforms {
    /// 组装 uniform
    pub fn new(
        view_proj: Mat4,
        viewport: UVec2,
        camera_constant: f32,
        point_size: f32,
        color: Vec4,
    ) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            viewport: viewport.as_vec2().to_array(),
            camera_constant,
            point_size,
            color: color.to_array(),
        }
    }
}

/// 点渲染器
pub struct PointsRenderer {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    instance_buffer: wgpu::Buffer,
    instance_count: u32,
    /// 每张状态纹理一个绑定组
    bind_groups: HashMap<TargetId, wgpu::BindGroup>,
}

impl PointsRenderer {
    /// 创建渲染管线和实例缓冲区
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, table: &LookupTable) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Points Shader"),
            source: wgpu::ShaderSource::Wgsl(POINTS_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Points BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Points Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Points Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[PointInstance::vertex_buffer_layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Points Uniforms"),
            size: std::mem::size_of::<RenderUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let instances = table.instances();
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Points Instances"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            pipeline,
            bind_group_layout,
            uniform_buffer,
            instance_buffer,
            instance_count: instances.len() as u32,
            bind_groups: HashMap::new(),
        }
    }

    /// 为一张状态纹理准备绑定组
    pub fn bind_state(&mut self, device: &wgpu::Device, target: TargetId, view: &wgpu::TextureView) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Points BG"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view),
                },
            ],
        });
        self.bind_groups.insert(target, bind_group);
    }

    /// 粒子数量
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// 绘制一帧
    ///
    /// `target` 必须是当前帧已解析的状态纹理；没有对应绑定组时返回 `false`。
    pub fn draw(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        output: &wgpu::TextureView,
        target: TargetId,
        uniforms: &RenderUniforms,
        clear: wgpu::Color,
    ) -> bool {
        let Some(bind_group) = self.bind_groups.get(&target) else {
            return false;
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Points Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.instance_buffer.slice(..));
        render_pass.draw(0..4, 0..self.instance_count);
        true
    }
}

const POINTS_SHADER: &str = r#"
struct RenderUniforms {
    view_proj: mat4x4<f32>,
    viewport: vec2<f32>,
    camera_constant: f32,
    point_size: f32,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> uniforms: RenderUniforms;

@group(0) @binding(1)
var state: texture_2d<f32>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) corner: vec2<f32>,
}

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @location(0) position: vec3<f32>,
    @location(1) lookup: vec2<f32>,
) -> VertexOutput {
    let dims = vec2<f32>(textureDimensions(state));
    let texel = vec2<i32>(round(lookup * (dims - vec2<f32>(1.0))));
    let sampled = textureLoad(state, texel, 0);

    let world = position + sampled.xyz;
    var clip = uniforms.view_proj * vec4<f32>(world, 1.0);

    let corner = vec2<f32>(f32(vertex_index & 1u), f32(vertex_index >> 1u)) * 2.0 - vec2<f32>(1.0);
    let size_px = uniforms.point_size * uniforms.camera_constant / clip.w;
    let offset = corner * size_px / uniforms.viewport * clip.w;
    clip = vec4<f32>(clip.xy + offset, clip.zw);

    var out: VertexOutput;
    out.clip_position = clip;
    out.corner = corner;
    return out;
}

@fragment
fn fs_main(frag: VertexOutput) -> @location(0) vec4<f32> {
    if (dot(frag.corner, frag.corner) > 1.0) {
        discard;
    }
    return uniforms.color;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_uniforms_layout() {
        // mat4 + vec2 + f32 + f32 + vec4，与 WGSL 的 16 字节对齐一致
        assert_eq!(std::mem::size_of::<RenderUniforms>(), 96);
    }

    #[test]
    fn test_render_uniforms_pack() {
        let u = RenderUniforms::new(Mat4::IDENTITY, UVec2::new(800, 600), 2.5, 0.1, Vec4::ONE);
        assert_eq!(u.viewport, [800.0, 600.0]);
        assert_eq!(u.view_proj[3][3], 1.0);
        assert_eq!(u.camera_constant, 2.5);
    }

    #[test]
    fn test_shader_entry_points() {
        assert!(POINTS_SHADER.contains("fn vs_main"));
        assert!(POINTS_SHADER.contains("fn fs_main"));
        assert!(POINTS_SHADER.contains("textureLoad(state"));
    }
}
