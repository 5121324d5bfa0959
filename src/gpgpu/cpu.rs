//! CPU 参考后端
//!
//! 逐像素执行 `UpdateKernel`，语义与 GPU 后端一致：
//! 输入只读上一帧，输出整体替换，不允许读写同一纹理。

use std::sync::Arc;

use glam::{UVec2, Vec4};

use super::backend::{ComputeBackend, ProgramDescriptor, TargetId};
use super::program::{KernelContext, UpdateKernel};
use super::texture::StateTexture;
use super::uniforms::UpdateUniforms;
use crate::core::error::{SimulationError, SimulationResult};

/// 默认最大纹理边长（与 wgpu 默认限制一致）
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

/// 一次更新的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    /// 程序标签
    pub label: String,
    /// 读取的目标
    pub inputs: Vec<TargetId>,
    /// 写入的目标
    pub output: TargetId,
}

/// CPU 编译结果
pub struct CpuProgram {
    label: String,
    kernel: Arc<dyn UpdateKernel>,
    names: Vec<String>,
    own: Option<usize>,
    params: Vec4,
    resolution: UVec2,
}

/// CPU 绑定
#[derive(Debug, Clone)]
pub struct CpuBinding {
    inputs: Vec<TargetId>,
    output: TargetId,
}

/// CPU 参考后端
pub struct CpuBackend {
    /// 状态纹理
    targets: Vec<StateTexture>,
    /// 已提交的更新记录
    log: Vec<DispatchRecord>,
    /// 本帧待提交数量
    pending: usize,
    /// 最大纹理边长
    max_dimension: u32,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    /// 创建 CPU 后端
    pub fn new() -> Self {
        Self::with_max_dimension(DEFAULT_MAX_DIMENSION)
    }

    /// 指定最大纹理边长
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            targets: Vec::new(),
            log: Vec::new(),
            pending: 0,
            max_dimension,
        }
    }

    /// 更新记录
    pub fn dispatch_log(&self) -> &[DispatchRecord] {
        &self.log
    }

    /// 已记录但尚未提交的更新数量
    pub fn pending_dispatches(&self) -> usize {
        self.pending
    }

    /// 目标数量
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    fn target(&self, id: TargetId) -> SimulationResult<&StateTexture> {
        self.targets.get(id.0).ok_or_else(|| {
            SimulationError::configuration("cpu backend", format!("unknown target {}", id.0))
        })
    }
}

impl ComputeBackend for CpuBackend {
    type Program = CpuProgram;
    type Binding = CpuBinding;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn check_grid(&self, resolution: UVec2) -> SimulationResult<()> {
        if resolution.max_element() > self.max_dimension {
            return Err(SimulationError::configuration(
                "cpu backend",
                format!(
                    "grid {}x{} exceeds max texture dimension {}",
                    resolution.x, resolution.y, self.max_dimension
                ),
            ));
        }
        Ok(())
    }

    fn create_target(&mut self, _label: &str, resolution: UVec2) -> SimulationResult<TargetId> {
        self.targets
            .push(StateTexture::new(resolution.x, resolution.y));
        Ok(TargetId(self.targets.len() - 1))
    }

    fn upload(&mut self, target: TargetId, state: &StateTexture) -> SimulationResult<()> {
        let slot = self.targets.get_mut(target.0).ok_or_else(|| {
            SimulationError::configuration("cpu backend", format!("unknown target {}", target.0))
        })?;
        if slot.size() != state.size() {
            return Err(SimulationError::configuration(
                "cpu backend",
                "upload size does not match target",
            ));
        }
        *slot = state.clone();
        Ok(())
    }

    fn compile(&mut self, desc: &ProgramDescriptor<'_>) -> SimulationResult<CpuProgram> {
        let kernel = desc.program.kernel().cloned().ok_or_else(|| {
            SimulationError::configuration(desc.context(), "program has no CPU kernel")
        })?;
        Ok(CpuProgram {
            label: desc.program.label().to_string(),
            kernel,
            names: desc.dependencies.iter().map(|s| s.to_string()).collect(),
            own: desc.own_slot,
            params: desc.program.params(),
            resolution: desc.resolution,
        })
    }

    fn bind(
        &mut self,
        program: &CpuProgram,
        inputs: &[TargetId],
        output: TargetId,
    ) -> SimulationResult<CpuBinding> {
        if inputs.len() != program.names.len() {
            return Err(SimulationError::configuration(
                format!("update pass '{}'", program.label),
                format!("expected {} inputs, got {}", program.names.len(), inputs.len()),
            ));
        }
        if inputs.contains(&output) {
            return Err(SimulationError::configuration(
                format!("update pass '{}'", program.label),
                "output target aliases an input",
            ));
        }
        for id in inputs.iter().chain(std::iter::once(&output)) {
            self.target(*id)?;
        }
        Ok(CpuBinding {
            inputs: inputs.to_vec(),
            output,
        })
    }

    fn dispatch(
        &mut self,
        program: &CpuProgram,
        binding: &CpuBinding,
        uniforms: &UpdateUniforms,
    ) -> SimulationResult<()> {
        let next = {
            let mut inputs = Vec::with_capacity(binding.inputs.len());
            for (name, id) in program.names.iter().zip(&binding.inputs) {
                inputs.push((name.as_str(), self.target(*id)?));
            }

            let resolution = program.resolution;
            let mut next = StateTexture::new(resolution.x, resolution.y);
            for y in 0..resolution.y {
                for x in 0..resolution.x {
                    let ctx = KernelContext::new(
                        UVec2::new(x, y),
                        resolution,
                        uniforms,
                        program.params,
                        &inputs,
                        program.own,
                    );
                    next.set(x, y, program.kernel.update(&ctx));
                }
            }
            next
        };

        self.targets[binding.output.0] = next;
        self.log.push(DispatchRecord {
            label: program.label.clone(),
            inputs: binding.inputs.clone(),
            output: binding.output,
        });
        self.pending += 1;
        Ok(())
    }

    fn submit(&mut self) -> SimulationResult<()> {
        self.pending = 0;
        Ok(())
    }

    fn read_target(&self, target: TargetId) -> SimulationResult<StateTexture> {
        self.target(target).cloned()
    }
}
