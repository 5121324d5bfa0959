//! 模拟上下文
//!
//! 驱动层持有的唯一状态容器：调度器、查找表、相机、视口和指针。
//! 没有全局可变状态，所有每帧输入都经由这里传给更新通道和渲染通道。

use std::time::Duration;

use glam::{UVec2, Vec2, Vec3, Vec4};

use super::clock::{FrameStats, FrameTime};
use crate::config::EngineConfig;
use crate::core::error::{SimulationError, SimulationResult};
use crate::gpgpu::backend::ComputeBackend;
use crate::gpgpu::scheduler::{ComputationRenderer, StateHandle, VariableId};
use crate::gpgpu::texture::{grid_seed, StateTexture};
use crate::gpgpu::uniforms::UpdateUniforms;
use crate::render::bridge::{project_point, sample_positions, LookupTable, ProjectedPoint};
use crate::render::camera::{CameraConstantCache, PerspectiveCamera};
use crate::render::points::RenderUniforms;

/// 光标像素坐标转为设备归一化坐标（x 向右、y 向上，范围 [-1, 1]）
pub fn pointer_from_cursor(x: f64, y: f64, viewport: UVec2) -> Vec2 {
    if viewport.x == 0 || viewport.y == 0 {
        return Vec2::ZERO;
    }
    let nx = (x / viewport.x as f64) * 2.0 - 1.0;
    let ny = 1.0 - (y / viewport.y as f64) * 2.0;
    Vec2::new(nx as f32, ny as f32).clamp(Vec2::splat(-1.0), Vec2::ONE)
}

/// 模拟上下文
pub struct SimulationContext<B: ComputeBackend> {
    compute: ComputationRenderer<B>,
    position: VariableId,
    lookup: LookupTable,
    camera: PerspectiveCamera,
    camera_cache: CameraConstantCache,
    viewport: UVec2,
    uniforms: UpdateUniforms,
    point_size: f32,
    point_color: Vec4,
    stats: FrameStats,
}

impl<B: ComputeBackend> SimulationContext<B> {
    /// 按配置搭建模拟：网格种子、更新程序、自依赖、初始化
    pub fn setup(backend: B, config: &EngineConfig, viewport: UVec2) -> SimulationResult<Self> {
        let n = config.simulation.grid_size;
        if n == 0 {
            return Err(SimulationError::configuration(
                "simulation setup",
                "grid size must be at least 1",
            ));
        }
        // 先检查后端能力，再分配并填充种子
        backend.check_grid(UVec2::splat(n))?;
        let seed = StateTexture::from_seed(n, n, grid_seed(n));
        Self::with_seed(backend, config, viewport, seed)
    }

    /// 使用自定义种子搭建模拟
    pub fn with_seed(
        backend: B,
        config: &EngineConfig,
        viewport: UVec2,
        seed: StateTexture,
    ) -> SimulationResult<Self> {
        let sim = &config.simulation;
        let n = sim.grid_size;
        if seed.size() != UVec2::splat(n) {
            return Err(SimulationError::configuration(
                "simulation setup",
                format!(
                    "seed is {}x{}, grid is {}x{}",
                    seed.width(),
                    seed.height(),
                    n,
                    n
                ),
            ));
        }

        let mut program = sim.program.build(&sim.variable);
        if let Some(params) = sim.params {
            program = program.with_params(Vec4::from_array(params));
        }

        let mut compute = ComputationRenderer::new(backend, n, n);
        let position = compute.add_variable(&sim.variable, program, seed)?;
        compute.set_variable_dependencies(position, &[position])?;
        compute.init()?;

        let viewport = viewport.max(UVec2::ONE);
        let camera = PerspectiveCamera::from_config(&config.camera, viewport.x, viewport.y);
        tracing::info!(
            target: "engine",
            "Simulation ready: {} particles ({}x{}), program {:?}",
            u64::from(n) * u64::from(n),
            n,
            n,
            sim.program
        );

        Ok(Self {
            compute,
            position,
            lookup: LookupTable::new(n),
            camera,
            camera_cache: CameraConstantCache::default(),
            viewport,
            uniforms: UpdateUniforms::default(),
            point_size: sim.point_size,
            point_color: Vec4::from_array(sim.point_color),
            stats: FrameStats::new(
                Duration::try_from_secs_f32(config.logging.stats_interval_secs)
                    .unwrap_or(Duration::from_secs(1)),
            ),
        })
    }

    /// 调度器
    pub fn compute(&self) -> &ComputationRenderer<B> {
        &self.compute
    }

    /// 位置变量
    pub fn position(&self) -> VariableId {
        self.position
    }

    /// 查找表
    pub fn lookup(&self) -> &LookupTable {
        &self.lookup
    }

    /// 相机
    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    /// 修改相机参数（常数在下次读取时按需重算）
    pub fn camera_mut(&mut self) -> &mut PerspectiveCamera {
        &mut self.camera
    }

    /// 视口
    pub fn viewport(&self) -> UVec2 {
        self.viewport
    }

    /// 当前更新 uniform
    pub fn uniforms(&self) -> &UpdateUniforms {
        &self.uniforms
    }

    /// 视口变化
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.viewport = UVec2::new(width, height);
        self.camera.set_viewport(width, height);
        tracing::debug!(target: "engine", "Viewport resized to {}x{}", width, height);
    }

    /// 指针位置（设备归一化坐标）
    pub fn set_pointer(&mut self, pointer: Vec2) {
        self.uniforms.pointer = pointer.clamp(Vec2::splat(-1.0), Vec2::ONE);
    }

    /// 相机缩放常数
    pub fn camera_constant(&mut self) -> f32 {
        self.camera_cache.get(self.viewport.y, &self.camera)
    }

    /// 推进一帧：更新 uniform、执行更新通道，返回本帧有效的状态句柄
    pub fn advance(&mut self, time: FrameTime) -> SimulationResult<StateHandle> {
        self.uniforms.time = time.elapsed;
        self.uniforms.delta = time.delta;
        self.compute.compute(&self.uniforms)?;

        if let Some(report) = self.stats.record(time) {
            tracing::debug!(
                target: "engine",
                "frames={} fps={:.1} frame_ms={:.2}",
                report.frames,
                report.fps,
                report.frame_ms
            );
        }
        tracing::trace!(target: "engine", "Advanced to t={:.3}s", time.elapsed);
        self.compute.current_render_target(self.position)
    }

    /// 当前帧的状态句柄
    pub fn current_state(&self) -> SimulationResult<StateHandle> {
        self.compute.current_render_target(self.position)
    }

    /// 渲染 uniform
    pub fn render_uniforms(&mut self) -> RenderUniforms {
        let camera_constant = self.camera_constant();
        RenderUniforms::new(
            self.camera.view_projection(),
            self.viewport,
            camera_constant,
            self.point_size,
            self.point_color,
        )
    }

    /// 回读当前状态并按查找表取出每个粒子的位置
    pub fn sample_positions(&self) -> SimulationResult<Vec<Vec3>> {
        let state = self.compute.read_state(self.current_state()?)?;
        Ok(sample_positions(&self.lookup, &state))
    }

    /// 渲染通道的 CPU 参考结果：每个粒子的裁剪坐标和像素尺寸
    pub fn project_particles(&mut self) -> SimulationResult<Vec<ProjectedPoint>> {
        let positions = self.sample_positions()?;
        let view_projection = self.camera.view_projection();
        let camera_constant = self.camera_constant();
        Ok(positions
            .into_iter()
            .map(|p| project_point(p, view_projection, self.point_size, camera_constant))
            .collect())
    }
}
