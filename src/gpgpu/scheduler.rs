//! 乒乓调度器
//!
//! 每个变量持有两张状态纹理，第 k 帧读取 `current`，写入 `1 - current`，
//! 全部变量更新完后统一翻转。状态纹理归调度器独占，外部只拿到带帧号的只读句柄。

use glam::UVec2;

use super::backend::{ComputeBackend, ProgramDescriptor, TargetId};
use super::program::{is_valid_identifier, UpdateProgram};
use super::texture::StateTexture;
use super::uniforms::UpdateUniforms;
use crate::core::error::{SimulationError, SimulationResult};

/// 生成的着色器里已占用的名称
pub const RESERVED_NAMES: [&str; 5] = ["sim", "output_state", "main", "update", "sanitize"];

/// 变量句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableId(usize);

impl VariableId {
    /// 变量序号（声明顺序）
    pub fn index(&self) -> usize {
        self.0
    }
}

/// 当前帧有效的只读状态句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHandle {
    /// 所属变量
    pub variable: VariableId,
    /// 后端目标
    pub target: TargetId,
    /// 签发时的帧号
    pub frame: u64,
}

/// 初始化前登记的变量
struct Variable {
    name: String,
    program: UpdateProgram,
    initial: StateTexture,
    /// 未声明时只读取自身
    dependencies: Option<Vec<VariableId>>,
}

/// 初始化后的变量资源
struct Compiled<B: ComputeBackend> {
    program: B::Program,
    targets: [TargetId; 2],
    /// `bindings[s]` 读取槽位 s，写入槽位 1 - s
    bindings: [B::Binding; 2],
}

/// GPU 计算渲染器
pub struct ComputationRenderer<B: ComputeBackend> {
    backend: B,
    resolution: UVec2,
    variables: Vec<Variable>,
    compiled: Vec<Compiled<B>>,
    /// 当前有效的槽位
    current: usize,
    /// 已完成的更新次数
    frame: u64,
    /// 致命错误后停止
    halted: Option<SimulationError>,
}

impl<B: ComputeBackend> ComputationRenderer<B> {
    /// 创建 `width × height` 网格的调度器
    pub fn new(backend: B, width: u32, height: u32) -> Self {
        Self {
            backend,
            resolution: UVec2::new(width, height),
            variables: Vec::new(),
            compiled: Vec::new(),
            current: 0,
            frame: 0,
            halted: None,
        }
    }

    /// 网格分辨率
    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    /// 已完成的更新次数
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// 是否已初始化
    pub fn is_initialized(&self) -> bool {
        !self.compiled.is_empty()
    }

    /// 导致停止的错误
    pub fn halted(&self) -> Option<&SimulationError> {
        self.halted.as_ref()
    }

    /// 后端只读访问
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 变量名
    pub fn variable_name(&self, variable: VariableId) -> SimulationResult<&str> {
        self.variable(variable).map(|v| v.name.as_str())
    }

    /// 按名称查找变量
    pub fn find_variable(&self, name: &str) -> Option<VariableId> {
        self.variables
            .iter()
            .position(|v| v.name == name)
            .map(VariableId)
    }

    /// 创建与网格同尺寸的种子纹理
    pub fn create_texture<F>(&self, seed: F) -> StateTexture
    where
        F: FnMut(u32, u32) -> glam::Vec4,
    {
        StateTexture::from_seed(self.resolution.x, self.resolution.y, seed)
    }

    /// 登记变量
    ///
    /// 名称即着色器中的纹理绑定名，必须是合法且未被占用的 WGSL 标识符。
    pub fn add_variable(
        &mut self,
        name: &str,
        program: UpdateProgram,
        initial: StateTexture,
    ) -> SimulationResult<VariableId> {
        if self.is_initialized() {
            return Err(SimulationError::AlreadyInitialized);
        }
        let context = format!("variable '{}'", name);
        if !is_valid_identifier(name) {
            return Err(SimulationError::configuration(
                context,
                "name is not a valid WGSL identifier",
            ));
        }
        if RESERVED_NAMES.contains(&name) {
            return Err(SimulationError::configuration(context, "name is reserved"));
        }
        if self.find_variable(name).is_some() {
            return Err(SimulationError::configuration(context, "name is already registered"));
        }
        if initial.size() != self.resolution {
            return Err(SimulationError::configuration(
                context,
                format!(
                    "initial texture is {}x{}, grid is {}x{}",
                    initial.width(),
                    initial.height(),
                    self.resolution.x,
                    self.resolution.y
                ),
            ));
        }

        self.variables.push(Variable {
            name: name.to_string(),
            program,
            initial,
            dependencies: None,
        });
        tracing::debug!(target: "gpgpu", "Registered variable '{}'", name);
        Ok(VariableId(self.variables.len() - 1))
    }

    /// 声明变量读取哪些变量的上一帧状态
    pub fn set_variable_dependencies(
        &mut self,
        variable: VariableId,
        dependencies: &[VariableId],
    ) -> SimulationResult<()> {
        let name = self.variable(variable)?.name.clone();
        if self.is_initialized() {
            return Err(SimulationError::DependenciesLocked(name));
        }
        for (i, dep) in dependencies.iter().enumerate() {
            self.variable(*dep)?;
            if dependencies[..i].contains(dep) {
                return Err(SimulationError::configuration(
                    format!("variable '{}'", name),
                    format!("dependency '{}' listed twice", self.variables[dep.0].name),
                ));
            }
        }
        self.variables[variable.0].dependencies = Some(dependencies.to_vec());
        Ok(())
    }

    fn variable(&self, id: VariableId) -> SimulationResult<&Variable> {
        self.variables
            .get(id.0)
            .ok_or(SimulationError::UnknownVariable(id.0))
    }

    fn dependencies_of(&self, index: usize) -> Vec<VariableId> {
        self.variables[index]
            .dependencies
            .clone()
            .unwrap_or_else(|| vec![VariableId(index)])
    }

    /// 初始化：校验网格、编译程序、分配纹理、上传种子、准备两种奇偶的绑定
    ///
    /// 任一步失败都返回致命的配置错误。校验阶段的失败可以修正后重试；
    /// 一旦开始分配后端纹理，失败即终止调度器，之后的 `init` 和 `compute`
    /// 都返回同一个错误，不会再次分配。
    pub fn init(&mut self) -> SimulationResult<()> {
        if let Some(error) = &self.halted {
            return Err(error.clone());
        }
        if self.is_initialized() {
            return Err(SimulationError::AlreadyInitialized);
        }
        if self.variables.is_empty() {
            return Err(SimulationError::configuration(
                "computation renderer",
                "no variables registered",
            ));
        }
        if self.resolution.x == 0 || self.resolution.y == 0 {
            return Err(SimulationError::configuration(
                "computation renderer",
                format!("invalid grid {}x{}", self.resolution.x, self.resolution.y),
            ));
        }
        self.backend.check_grid(self.resolution)?;

        let result = self.allocate_and_compile();
        if let Err(error) = &result {
            tracing::error!(target: "gpgpu", "Initialization failed: {}", error);
            self.halted = Some(error.clone());
        }
        result
    }

    fn allocate_and_compile(&mut self) -> SimulationResult<()> {
        let mut all_targets = Vec::with_capacity(self.variables.len());
        for variable in &self.variables {
            let mut pair = [TargetId(0); 2];
            for (slot, target) in pair.iter_mut().enumerate() {
                *target = self
                    .backend
                    .create_target(&format!("{}[{}]", variable.name, slot), self.resolution)?;
                self.backend.upload(*target, &variable.initial)?;
            }
            all_targets.push(pair);
        }

        let mut compiled = Vec::with_capacity(self.variables.len());
        for (index, variable) in self.variables.iter().enumerate() {
            let dependencies = self.dependencies_of(index);
            let names: Vec<&str> = dependencies
                .iter()
                .map(|d| self.variables[d.0].name.as_str())
                .collect();
            let desc = ProgramDescriptor {
                variable: &variable.name,
                program: &variable.program,
                dependencies: &names,
                own_slot: dependencies.iter().position(|d| d.0 == index),
                resolution: self.resolution,
            };
            let program = self.backend.compile(&desc)?;

            let own = all_targets[index];
            let bind_parity = |backend: &mut B, slot: usize| {
                let inputs: Vec<TargetId> =
                    dependencies.iter().map(|d| all_targets[d.0][slot]).collect();
                backend.bind(&program, &inputs, own[1 - slot])
            };
            let even = bind_parity(&mut self.backend, 0)?;
            let odd = bind_parity(&mut self.backend, 1)?;

            tracing::info!(
                target: "gpgpu",
                "Compiled '{}' for variable '{}' on {} backend ({} inputs)",
                variable.program.label(),
                variable.name,
                self.backend.name(),
                names.len()
            );
            compiled.push(Compiled {
                program,
                targets: own,
                bindings: [even, odd],
            });
        }

        self.compiled = compiled;
        self.current = 0;
        self.frame = 0;
        tracing::info!(
            target: "gpgpu",
            "Computation renderer ready: {} variables, grid {}x{}",
            self.variables.len(),
            self.resolution.x,
            self.resolution.y
        );
        Ok(())
    }

    /// 执行一次更新
    ///
    /// 所有变量按声明顺序读取当前槽位、写入另一槽位，提交后统一翻转。
    /// 致命错误会使调度器停止，之后每次调用都返回同一错误。
    pub fn compute(&mut self, uniforms: &UpdateUniforms) -> SimulationResult<()> {
        if let Some(error) = &self.halted {
            return Err(error.clone());
        }
        if !self.is_initialized() {
            return Err(SimulationError::NotInitialized);
        }

        let result = self.dispatch_all(uniforms);
        if let Err(error) = &result {
            if error.is_fatal() {
                tracing::error!(target: "gpgpu", "Computation halted: {}", error);
                self.halted = Some(error.clone());
            }
            return result;
        }

        self.current = 1 - self.current;
        self.frame += 1;
        tracing::trace!(target: "gpgpu", "Step {} done, current slot {}", self.frame, self.current);
        Ok(())
    }

    fn dispatch_all(&mut self, uniforms: &UpdateUniforms) -> SimulationResult<()> {
        for compiled in &self.compiled {
            self.backend
                .dispatch(&compiled.program, &compiled.bindings[self.current], uniforms)?;
        }
        self.backend.submit()
    }

    fn compiled(&self, variable: VariableId) -> SimulationResult<&Compiled<B>> {
        self.variable(variable)?;
        self.compiled
            .get(variable.0)
            .ok_or(SimulationError::NotInitialized)
    }

    /// 最近一次写入的状态（渲染通道读取这个）
    pub fn current_render_target(&self, variable: VariableId) -> SimulationResult<StateHandle> {
        let compiled = self.compiled(variable)?;
        Ok(StateHandle {
            variable,
            target: compiled.targets[self.current],
            frame: self.frame,
        })
    }

    /// 下一次将被写入的状态（诊断用）
    pub fn alternate_render_target(&self, variable: VariableId) -> SimulationResult<StateHandle> {
        let compiled = self.compiled(variable)?;
        Ok(StateHandle {
            variable,
            target: compiled.targets[1 - self.current],
            frame: self.frame,
        })
    }

    /// 校验句柄仍属于当前帧
    pub fn resolve(&self, handle: StateHandle) -> SimulationResult<TargetId> {
        let variable = self.variable(handle.variable)?;
        if handle.frame != self.frame {
            return Err(SimulationError::StaleHandle {
                variable: variable.name.clone(),
                issued: handle.frame,
                current: self.frame,
            });
        }
        Ok(handle.target)
    }

    /// 回读句柄对应的状态
    pub fn read_state(&self, handle: StateHandle) -> SimulationResult<StateTexture> {
        let target = self.resolve(handle)?;
        self.backend.read_target(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpgpu::cpu::CpuBackend;
    use crate::gpgpu::program::KernelContext;
    use crate::gpgpu::programs;
    use glam::{IVec2, Vec4};

    fn counter() -> UpdateProgram {
        UpdateProgram::new("counter")
            .with_kernel(|ctx: &KernelContext<'_>| ctx.previous() + Vec4::new(1.0, 0.0, 0.0, 0.0))
    }

    fn renderer(size: u32) -> ComputationRenderer<CpuBackend> {
        ComputationRenderer::new(CpuBackend::new(), size, size)
    }

    #[test]
    fn test_add_variable_validation() {
        let mut gpu = renderer(2);
        let tex = gpu.create_texture(|_, _| Vec4::ZERO);
        assert!(gpu.add_variable("texture_position", counter(), tex.clone()).is_ok());
        assert!(gpu.add_variable("texture_position", counter(), tex.clone()).is_err());
        assert!(gpu.add_variable("output_state", counter(), tex.clone()).is_err());
        assert!(gpu.add_variable("bad name", counter(), tex).is_err());
        assert!(gpu
            .add_variable("small", counter(), StateTexture::new(1, 1))
            .is_err());
    }

    #[test]
    fn test_compute_before_init() {
        let mut gpu = renderer(2);
        assert_eq!(
            gpu.compute(&UpdateUniforms::default()),
            Err(SimulationError::NotInitialized)
        );
    }

    #[test]
    fn test_init_rejects_empty_grid() {
        let mut gpu = ComputationRenderer::new(CpuBackend::new(), 0, 0);
        let tex = StateTexture::new(0, 0);
        gpu.add_variable("texture_position", counter(), tex).unwrap();
        assert!(matches!(
            gpu.init(),
            Err(SimulationError::Configuration { .. })
        ));
    }

    #[test]
    fn test_init_fails_without_runnable_program() {
        let mut gpu = renderer(2);
        let tex = gpu.create_texture(|_, _| Vec4::ZERO);
        let program = UpdateProgram::new("wgsl only").with_wgsl("fn update() {}");
        gpu.add_variable("texture_position", program, tex).unwrap();
        let err = gpu.init().unwrap_err();
        assert!(err.to_string().contains("texture_position"));
        assert!(!gpu.is_initialized());
    }

    #[test]
    fn test_failed_init_is_not_retried() {
        let mut gpu = renderer(2);
        let tex = gpu.create_texture(|_, _| Vec4::ZERO);
        let program = UpdateProgram::new("wgsl only").with_wgsl("fn update() {}");
        gpu.add_variable("texture_position", program, tex).unwrap();

        let err = gpu.init().unwrap_err();
        let allocated = gpu.backend().target_count();
        assert_eq!(allocated, 2);
        assert_eq!(gpu.halted(), Some(&err));

        // 重试返回同一错误，不再分配纹理
        assert_eq!(gpu.init(), Err(err.clone()));
        assert_eq!(gpu.backend().target_count(), allocated);
        assert_eq!(gpu.compute(&UpdateUniforms::default()), Err(err));
    }

    #[test]
    fn test_ping_pong_alternates() {
        let mut gpu = renderer(2);
        let tex = gpu.create_texture(|_, _| Vec4::ZERO);
        let pos = gpu.add_variable("texture_position", counter(), tex).unwrap();
        gpu.init().unwrap();

        let first = gpu.current_render_target(pos).unwrap().target;
        gpu.compute(&UpdateUniforms::default()).unwrap();
        let second = gpu.current_render_target(pos).unwrap().target;
        gpu.compute(&UpdateUniforms::default()).unwrap();
        let third = gpu.current_render_target(pos).unwrap().target;

        assert_ne!(first, second);
        assert_eq!(first, third);
        assert_eq!(gpu.alternate_render_target(pos).unwrap().target, second);

        let handle = gpu.current_render_target(pos).unwrap();
        let state = gpu.read_state(handle).unwrap();
        assert_eq!(state.get(1, 1), Vec4::new(2.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut gpu = renderer(2);
        let tex = gpu.create_texture(|_, _| Vec4::ZERO);
        let pos = gpu.add_variable("texture_position", counter(), tex).unwrap();
        gpu.init().unwrap();

        let handle = gpu.current_render_target(pos).unwrap();
        gpu.compute(&UpdateUniforms::default()).unwrap();
        assert!(matches!(
            gpu.resolve(handle),
            Err(SimulationError::StaleHandle { issued: 0, current: 1, .. })
        ));
    }

    #[test]
    fn test_dependencies_locked_after_init() {
        let mut gpu = renderer(2);
        let tex = gpu.create_texture(|_, _| Vec4::ZERO);
        let pos = gpu.add_variable("texture_position", counter(), tex).unwrap();
        gpu.set_variable_dependencies(pos, &[pos]).unwrap();
        gpu.init().unwrap();
        assert_eq!(
            gpu.set_variable_dependencies(pos, &[]),
            Err(SimulationError::DependenciesLocked("texture_position".into()))
        );
        assert_eq!(
            gpu.set_variable_dependencies(VariableId(7), &[]),
            Err(SimulationError::UnknownVariable(7))
        );
    }

    #[test]
    fn test_dependencies_read_previous_frame() {
        let mut gpu = renderer(1);
        let a_tex = gpu.create_texture(|_, _| Vec4::splat(1.0));
        let b_tex = gpu.create_texture(|_, _| Vec4::ZERO);
        let a = gpu.add_variable("texture_a", counter(), a_tex).unwrap();
        let copy_a = UpdateProgram::new("copy").with_kernel(|ctx: &KernelContext<'_>| {
            ctx.read("texture_a", IVec2::ZERO).unwrap_or(Vec4::NAN)
        });
        let b = gpu.add_variable("texture_b", copy_a, b_tex).unwrap();
        gpu.set_variable_dependencies(a, &[a]).unwrap();
        gpu.set_variable_dependencies(b, &[a, b]).unwrap();
        assert!(gpu.set_variable_dependencies(b, &[a, a]).is_err());
        gpu.init().unwrap();

        gpu.compute(&UpdateUniforms::default()).unwrap();
        let a_state = gpu.read_state(gpu.current_render_target(a).unwrap()).unwrap();
        let b_state = gpu.read_state(gpu.current_render_target(b).unwrap()).unwrap();
        // b 读到的是 a 在本帧更新前的值
        assert_eq!(a_state.get(0, 0).x, 2.0);
        assert_eq!(b_state.get(0, 0).x, 1.0);
    }

    #[test]
    fn test_wave_program_runs_on_cpu() {
        let mut gpu = renderer(4);
        let tex = gpu.create_texture(crate::gpgpu::texture::grid_seed(4));
        let pos = gpu
            .add_variable("texture_position", programs::wave("texture_position"), tex)
            .unwrap();
        gpu.init().unwrap();
        for i in 0..3 {
            gpu.compute(&UpdateUniforms::at(i as f32 * 0.016)).unwrap();
        }
        let state = gpu.read_state(gpu.current_render_target(pos).unwrap()).unwrap();
        assert!(state.is_finite());
        assert_eq!(gpu.frame(), 3);
    }
}
