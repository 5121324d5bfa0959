use anyhow::Result;
use feedback_particles::config::EngineConfig;
use feedback_particles::core::{FrameLoop, FrameRequester, FrameTime, SimulationContext, SimulationError};
use feedback_particles::gpgpu::{
    programs, ComputationRenderer, ComputeBackend, CpuBackend, ProgramKind, StateTexture,
    UpdateUniforms,
};
use feedback_particles::render::camera_constant;
use glam::{UVec2, Vec2, Vec3, Vec4};
use std::cell::Cell;

fn config(grid: u32, program: ProgramKind) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.simulation.grid_size = grid;
    config.simulation.program = program;
    config
}

#[test]
fn test_identity_roundtrip_through_render_bridge() -> Result<()> {
    // 2x2 网格，恒等更新：一帧后渲染通道按网格顺序取回种子位置
    let seeds = [
        Vec4::new(-0.25, 0.0, -0.25, 0.0),
        Vec4::new(0.0, 0.0, -0.25, 0.0),
        Vec4::new(-0.25, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 0.0, 0.0),
    ];
    let seed = StateTexture::from_seed(2, 2, |x, y| seeds[(x + y * 2) as usize]);
    let mut ctx = SimulationContext::with_seed(
        CpuBackend::new(),
        &config(2, ProgramKind::Identity),
        UVec2::new(800, 600),
        seed,
    )?;

    ctx.advance(FrameTime::fixed(0.016, 0.016))?;
    let positions = ctx.sample_positions()?;
    let expected: Vec<Vec3> = seeds.iter().map(|s| s.truncate()).collect();
    assert_eq!(positions, expected);

    let projected = ctx.project_particles()?;
    assert_eq!(projected.len(), 4);
    assert!(projected.iter().all(|p| p.is_visible() && p.size_px > 0.0));
    Ok(())
}

#[test]
fn test_resize_camera_constant() -> Result<()> {
    let mut ctx = SimulationContext::setup(
        CpuBackend::new(),
        &config(2, ProgramKind::Identity),
        UVec2::new(800, 600),
    )?;
    ctx.resize(1920, 1080);

    let expected = 1080.0 / 37.5_f32.to_radians().tan();
    assert!((ctx.camera_constant() - expected).abs() < 1e-2);
    assert!((camera_constant(1080.0, 75.0, 1.0) - expected).abs() < 1e-3);
    assert!((ctx.render_uniforms().camera_constant - expected).abs() < 1e-2);
    Ok(())
}

#[test]
fn test_current_buffer_alternates_every_step() -> Result<()> {
    let mut ctx = SimulationContext::setup(
        CpuBackend::new(),
        &config(3, ProgramKind::Wave),
        UVec2::new(800, 600),
    )?;

    let mut previous = ctx.current_state()?.target;
    for k in 1..=6u64 {
        let handle = ctx.advance(FrameTime::fixed(k as f32 * 0.016, 0.016))?;
        assert_eq!(handle.frame, k);
        assert_ne!(handle.target, previous);

        let log = ctx.compute().backend().dispatch_log();
        let last = log.last().ok_or_else(|| anyhow::anyhow!("no dispatch recorded"))?;
        assert_eq!(last.output, handle.target);
        assert_eq!(last.inputs, vec![previous]);
        previous = handle.target;
    }
    Ok(())
}

#[test]
fn test_stale_handle_after_advance() -> Result<()> {
    let mut ctx = SimulationContext::setup(
        CpuBackend::new(),
        &config(2, ProgramKind::Wave),
        UVec2::new(800, 600),
    )?;
    let old = ctx.advance(FrameTime::fixed(0.0, 0.0))?;
    ctx.advance(FrameTime::fixed(0.016, 0.016))?;

    match ctx.compute().resolve(old) {
        Err(SimulationError::StaleHandle { issued, current, .. }) => {
            assert_eq!((issued, current), (1, 2));
        }
        other => anyhow::bail!("expected stale handle, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_pointer_raises_particles_nearby() -> Result<()> {
    let mut ctx = SimulationContext::setup(
        CpuBackend::new(),
        &config(8, ProgramKind::Wave),
        UVec2::new(800, 600),
    )?;
    ctx.set_pointer(Vec2::ZERO);
    ctx.advance(FrameTime::fixed(0.0, 0.0))?;
    let centered = ctx.sample_positions()?;

    ctx.set_pointer(Vec2::new(1.0, 1.0));
    ctx.advance(FrameTime::fixed(0.0, 0.0))?;
    let moved = ctx.sample_positions()?;

    // 网格中心的粒子在指针移开后降低
    let center = (4 + 4 * 8) as usize;
    assert!(centered[center].y > moved[center].y);
    // x/z 网格位置不变
    assert_eq!(centered[center].x, moved[center].x);
    assert_eq!(centered[center].z, moved[center].z);
    Ok(())
}

/// 第二次提交失败的后端
struct FailingBackend {
    inner: CpuBackend,
    submits: u32,
}

impl ComputeBackend for FailingBackend {
    type Program = <CpuBackend as ComputeBackend>::Program;
    type Binding = <CpuBackend as ComputeBackend>::Binding;

    fn name(&self) -> &'static str {
        "failing"
    }

    fn check_grid(&self, resolution: UVec2) -> Result<(), SimulationError> {
        self.inner.check_grid(resolution)
    }

    fn create_target(
        &mut self,
        label: &str,
        resolution: UVec2,
    ) -> Result<feedback_particles::gpgpu::TargetId, SimulationError> {
        self.inner.create_target(label, resolution)
    }

    fn upload(
        &mut self,
        target: feedback_particles::gpgpu::TargetId,
        state: &StateTexture,
    ) -> Result<(), SimulationError> {
        self.inner.upload(target, state)
    }

    fn compile(
        &mut self,
        desc: &feedback_particles::gpgpu::ProgramDescriptor<'_>,
    ) -> Result<Self::Program, SimulationError> {
        self.inner.compile(desc)
    }

    fn bind(
        &mut self,
        program: &Self::Program,
        inputs: &[feedback_particles::gpgpu::TargetId],
        output: feedback_particles::gpgpu::TargetId,
    ) -> Result<Self::Binding, SimulationError> {
        self.inner.bind(program, inputs, output)
    }

    fn dispatch(
        &mut self,
        program: &Self::Program,
        binding: &Self::Binding,
        uniforms: &UpdateUniforms,
    ) -> Result<(), SimulationError> {
        self.inner.dispatch(program, binding, uniforms)
    }

    fn submit(&mut self) -> Result<(), SimulationError> {
        self.submits += 1;
        if self.submits >= 2 {
            return Err(SimulationError::RuntimeDevice("device lost".into()));
        }
        self.inner.submit()
    }

    fn read_target(
        &self,
        target: feedback_particles::gpgpu::TargetId,
    ) -> Result<StateTexture, SimulationError> {
        self.inner.read_target(target)
    }
}

#[derive(Default)]
struct CountingRequester {
    requests: Cell<u32>,
}

impl FrameRequester for CountingRequester {
    fn request_frame(&self) {
        self.requests.set(self.requests.get() + 1);
    }
}

#[test]
fn test_device_loss_halts_frame_loop() -> Result<()> {
    let backend = FailingBackend {
        inner: CpuBackend::new(),
        submits: 0,
    };
    let mut gpu = ComputationRenderer::new(backend, 2, 2);
    let seed = gpu.create_texture(|_, _| Vec4::ZERO);
    let pos = gpu.add_variable("texture_position", programs::identity("texture_position"), seed)?;
    gpu.set_variable_dependencies(pos, &[pos])?;
    gpu.init()?;

    let mut frame_loop = FrameLoop::new(CountingRequester::default());
    frame_loop.start();
    assert!(frame_loop.step(|| gpu.compute(&UpdateUniforms::at(0.0)))?);

    let err = frame_loop
        .step(|| gpu.compute(&UpdateUniforms::at(0.016)))
        .expect_err("second frame must fail");
    assert!(err.is_fatal());
    assert_eq!(gpu.frame(), 1);

    // 停止后不再执行，调度器也保持停止
    assert!(!frame_loop.step(|| gpu.compute(&UpdateUniforms::at(0.032)))?);
    assert_eq!(gpu.compute(&UpdateUniforms::at(0.032)), Err(err));
    Ok(())
}

#[test]
#[ignore = "requires a GPU adapter"]
fn test_wgpu_identity_readback() -> Result<()> {
    use feedback_particles::gpgpu::WgpuBackend;
    use feedback_particles::render::GpuContext;

    let gpu = pollster::block_on(GpuContext::headless())?;
    let mut compute = ComputationRenderer::new(WgpuBackend::new(&gpu), 4, 4);
    let seed = compute.create_texture(|x, y| Vec4::new(x as f32, y as f32, 0.5, 1.0));
    let pos = compute.add_variable(
        "texture_position",
        programs::identity("texture_position"),
        seed.clone(),
    )?;
    compute.init()?;
    compute.compute(&UpdateUniforms::at(0.0))?;

    let state = compute.read_state(compute.current_render_target(pos)?)?;
    assert_eq!(state.as_slice(), seed.as_slice());
    Ok(())
}
