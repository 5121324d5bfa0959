//! WGPU 计算后端
//!
//! 状态纹理为 RGBA32F，同时可作为采样纹理（读上一帧）和只写存储纹理（写下一帧）。
//! 每个变量编译为一条计算管线，每种奇偶性预先创建一个绑定组。

use std::sync::Arc;

use glam::{UVec2, Vec4};

use super::backend::{ComputeBackend, ProgramDescriptor, TargetId};
use super::program::{ComputeShaderGenerator, WORKGROUP_SIZE};
use super::texture::{StateTexture, BYTES_PER_PIXEL};
use super::uniforms::{GpuUpdateUniforms, UpdateUniforms};
use crate::core::error::{SimulationError, SimulationResult};
use crate::render::context::{DeviceErrors, GpuContext};

/// 状态纹理格式
pub const STATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// GPU 状态纹理
pub struct GpuTarget {
    /// 纹理
    pub texture: wgpu::Texture,
    /// 纹理视图
    pub view: wgpu::TextureView,
    /// 尺寸
    pub size: UVec2,
}

/// 编译后的更新管线
pub struct WgpuProgram {
    label: String,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    dependency_count: usize,
    resolution: UVec2,
    params: Vec4,
}

/// 预先创建的绑定组
pub struct WgpuBinding {
    bind_group: wgpu::BindGroup,
}

/// WGPU 计算后端
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    errors: DeviceErrors,
    /// 状态纹理能否作为存储纹理
    storage_supported: bool,
    targets: Vec<GpuTarget>,
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuBackend {
    /// 基于共享设备创建后端
    pub fn new(context: &GpuContext) -> Self {
        let features = context.adapter.get_texture_format_features(STATE_FORMAT);
        Self {
            device: context.device.clone(),
            queue: context.queue.clone(),
            errors: context.errors.clone(),
            storage_supported: features
                .allowed_usages
                .contains(wgpu::TextureUsages::STORAGE_BINDING),
            targets: Vec::new(),
            encoder: None,
        }
    }

    /// 获取目标的纹理视图（渲染通道只读采样）
    pub fn view(&self, target: TargetId) -> Option<&wgpu::TextureView> {
        self.targets.get(target.0).map(|t| &t.view)
    }

    fn target(&self, id: TargetId) -> SimulationResult<&GpuTarget> {
        self.targets.get(id.0).ok_or_else(|| {
            SimulationError::configuration("wgpu backend", format!("unknown target {}", id.0))
        })
    }

    /// 在验证和显存错误作用域内执行，失败转为配置错误
    fn scoped<T>(&self, context: &str, f: impl FnOnce(&wgpu::Device) -> T) -> SimulationResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let memory = pollster::block_on(self.device.pop_error_scope());
        match validation.or(memory) {
            Some(error) => Err(SimulationError::configuration(context, error.to_string())),
            None => Ok(value),
        }
    }
}

impl ComputeBackend for WgpuBackend {
    type Program = WgpuProgram;
    type Binding = WgpuBinding;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn check_grid(&self, resolution: UVec2) -> SimulationResult<()> {
        if !self.storage_supported {
            return Err(SimulationError::configuration(
                "wgpu backend",
                format!("{:?} cannot be used as a storage texture on this adapter", STATE_FORMAT),
            ));
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if resolution.max_element() > max {
            return Err(SimulationError::configuration(
                "wgpu backend",
                format!(
                    "grid {}x{} exceeds max texture dimension {}",
                    resolution.x, resolution.y, max
                ),
            ));
        }
        Ok(())
    }

    fn create_target(&mut self, label: &str, resolution: UVec2) -> SimulationResult<TargetId> {
        let target = self.scoped(&format!("state texture '{}'", label), |device| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: resolution.x,
                    height: resolution.y,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: STATE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            GpuTarget {
                texture,
                view,
                size: resolution,
            }
        })?;
        self.targets.push(target);
        Ok(TargetId(self.targets.len() - 1))
    }

    fn upload(&mut self, target: TargetId, state: &StateTexture) -> SimulationResult<()> {
        let gpu = self.target(target)?;
        if gpu.size != state.size() {
            return Err(SimulationError::configuration(
                "wgpu backend",
                "upload size does not match target",
            ));
        }
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &gpu.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            state.as_bytes(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(BYTES_PER_PIXEL * state.width()),
                rows_per_image: Some(state.height()),
            },
            wgpu::Extent3d {
                width: state.width(),
                height: state.height(),
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn compile(&mut self, desc: &ProgramDescriptor<'_>) -> SimulationResult<WgpuProgram> {
        let context = desc.context();
        let body = desc
            .program
            .wgsl()
            .ok_or_else(|| SimulationError::configuration(&context, "program has no WGSL source"))?;
        let source = ComputeShaderGenerator::generate(desc.dependencies, body);
        let dependency_count = desc.dependencies.len();

        self.scoped(&context, |device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.variable),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

            let mut entries = Vec::with_capacity(dependency_count + 2);
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
            for i in 0..dependency_count {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: i as u32 + 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                });
            }
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: ComputeShaderGenerator::output_binding(dependency_count),
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: STATE_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            });

            let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Update Pass BGL"),
                entries: &entries,
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Update Pass Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(desc.variable),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: "main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            });

            let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Update Pass Uniforms"),
                size: std::mem::size_of::<GpuUpdateUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            WgpuProgram {
                label: desc.program.label().to_string(),
                pipeline,
                bind_group_layout,
                uniform_buffer,
                dependency_count,
                resolution: desc.resolution,
                params: desc.program.params(),
            }
        })
    }

    fn bind(
        &mut self,
        program: &WgpuProgram,
        inputs: &[TargetId],
        output: TargetId,
    ) -> SimulationResult<WgpuBinding> {
        let context = format!("update pass '{}'", program.label);
        if inputs.len() != program.dependency_count {
            return Err(SimulationError::configuration(
                context,
                format!("expected {} inputs, got {}", program.dependency_count, inputs.len()),
            ));
        }
        if inputs.contains(&output) {
            return Err(SimulationError::configuration(
                context,
                "output target aliases an input",
            ));
        }

        let mut entries = Vec::with_capacity(inputs.len() + 2);
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: program.uniform_buffer.as_entire_binding(),
        });
        for (i, id) in inputs.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32 + 1,
                resource: wgpu::BindingResource::TextureView(&self.target(*id)?.view),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: ComputeShaderGenerator::output_binding(inputs.len()),
            resource: wgpu::BindingResource::TextureView(&self.target(output)?.view),
        });

        let bind_group = self.scoped(&context, |device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Update Pass BG"),
                layout: &program.bind_group_layout,
                entries: &entries,
            })
        })?;
        Ok(WgpuBinding { bind_group })
    }

    fn dispatch(
        &mut self,
        program: &WgpuProgram,
        binding: &WgpuBinding,
        uniforms: &UpdateUniforms,
    ) -> SimulationResult<()> {
        let packed = GpuUpdateUniforms::pack(uniforms, program.resolution, program.params);
        self.queue
            .write_buffer(&program.uniform_buffer, 0, bytemuck::bytes_of(&packed));

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Update Pass Encoder"),
            })
        });

        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(program.label.as_str()),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(&program.pipeline);
        compute_pass.set_bind_group(0, &binding.bind_group, &[]);
        let workgroups_x = (program.resolution.x + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE;
        let workgroups_y = (program.resolution.y + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE;
        compute_pass.dispatch_workgroups(workgroups_x, workgroups_y, 1);
        Ok(())
    }

    fn submit(&mut self) -> SimulationResult<()> {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.errors.check()
    }

    fn read_target(&self, target: TargetId) -> SimulationResult<StateTexture> {
        let gpu = self.target(target)?;
        let UVec2 { x: width, y: height } = gpu.size;
        let unpadded = BYTES_PER_PIXEL * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = (unpadded + align - 1) / align * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("State Readback"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("State Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &gpu.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| SimulationError::RuntimeDevice(e.to_string()))?
            .map_err(|e| SimulationError::RuntimeDevice(e.to_string()))?;

        let mut data = Vec::with_capacity((width * height) as usize * 4);
        {
            let mapped = slice.get_mapped_range();
            for row in 0..height as usize {
                let start = row * padded as usize;
                let bytes = &mapped[start..start + unpadded as usize];
                data.extend_from_slice(bytemuck::cast_slice::<u8, f32>(bytes));
            }
        }
        buffer.unmap();
        self.errors.check()?;
        StateTexture::from_raw(width, height, data)
    }
}
