//! 引擎主入口
//!
//! 定义 Engine 结构和主运行循环：窗口、GPU 上下文、模拟上下文和点渲染器
//! 都在这里组装，事件循环把窗口事件转给模拟上下文。

use std::path::PathBuf;
use std::sync::Arc;

use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::window::{Window, WindowBuilder};

use super::clock::Clock;
use super::context::{pointer_from_cursor, SimulationContext};
use super::error::{EngineError, EngineResult, SimulationError, SimulationResult};
use super::frame::FrameLoop;
use crate::config::{EngineConfig, LoggingConfig};
use crate::gpgpu::wgpu_backend::WgpuBackend;
use crate::render::context::{DeviceErrors, GpuContext};
use crate::render::points::PointsRenderer;

/// 粒子引擎主结构
///
/// `Engine` 负责：
/// - 加载配置并初始化日志
/// - 创建窗口、GPU 上下文和模拟上下文
/// - 驱动帧循环：更新通道 → 翻转 → 渲染通道 → 呈现
///
/// # 示例
///
/// ```no_run
/// use feedback_particles::core::Engine;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     Engine::run()?;
///     Ok(())
/// }
/// ```
pub struct Engine;

impl Engine {
    /// 按默认查找顺序加载配置并运行
    pub fn run() -> EngineResult<()> {
        let (config, source) = EngineConfig::load_or_default();
        Self::run_with_config(config, source)
    }

    /// 从指定配置文件加载并运行
    pub fn run_with_file(path: impl Into<PathBuf>) -> EngineResult<()> {
        let path = path.into();
        let config = EngineConfig::from_file(&path)?;
        Self::run_with_config(config, Some(path))
    }

    /// 使用给定配置运行
    pub fn run_with_config(mut config: EngineConfig, source: Option<PathBuf>) -> EngineResult<()> {
        config.apply_env_overrides();
        config.validate()?;

        Self::initialize_logging(&config.logging);
        match &source {
            Some(path) => tracing::info!(target: "config", "Loaded config from {:?}", path),
            None => tracing::info!(target: "config", "Using default configuration"),
        }

        let event_loop = EventLoop::new()
            .map_err(|e| EngineError::EventLoop(format!("Failed to create event loop: {}", e)))?;
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(config.graphics.title.as_str())
                .with_inner_size(PhysicalSize::new(
                    config.graphics.resolution.width,
                    config.graphics.resolution.height,
                ))
                .build(&event_loop)
                .map_err(|e| EngineError::Window(e.to_string()))?,
        );

        let mut app = App::new(window, &config)?;
        app.frame_loop.start();

        let mut fatal: Option<SimulationError> = None;
        let result = event_loop.run(|event, elwt| {
            elwt.set_control_flow(ControlFlow::Wait);
            if let Event::WindowEvent { event, .. } = event {
                if let Err(error) = app.handle_window_event(&event, elwt) {
                    tracing::error!(target: "engine", "Fatal error, exiting: {}", error);
                    fatal = Some(error);
                    elwt.exit();
                }
            }
        });

        tracing::info!(
            target: "engine",
            "Engine shutting down after {} frames",
            app.frame_loop.frames()
        );
        result.map_err(|e| EngineError::EventLoop(format!("Event loop error: {}", e)))?;
        match fatal {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    /// 初始化日志系统
    ///
    /// `RUST_LOG` 优先，未设置时使用配置中的级别。
    fn initialize_logging(config: &LoggingConfig) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.level.as_filter()));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        tracing::info!(target: "engine", "Engine starting");
    }
}

/// 运行期状态
struct App {
    window: Arc<Window>,
    gpu: GpuContext,
    sim: SimulationContext<WgpuBackend>,
    points: PointsRenderer,
    clock: Clock,
    frame_loop: FrameLoop<Arc<Window>>,
    clear: wgpu::Color,
}

impl App {
    fn new(window: Arc<Window>, config: &EngineConfig) -> EngineResult<Self> {
        let gpu = pollster::block_on(GpuContext::new(window.clone(), config.graphics.vsync))?;
        let size = window.inner_size();
        let viewport = glam::UVec2::new(size.width.max(1), size.height.max(1));

        let backend = WgpuBackend::new(&gpu);
        let sim = SimulationContext::setup(backend, config, viewport)?;

        let mut points = PointsRenderer::new(&gpu.device, gpu.surface_format(), sim.lookup());
        for handle in [
            sim.compute().current_render_target(sim.position())?,
            sim.compute().alternate_render_target(sim.position())?,
        ] {
            let view = sim.compute().backend().view(handle.target).ok_or_else(|| {
                EngineError::Init(format!("state target {} has no view", handle.target.index()))
            })?;
            points.bind_state(&gpu.device, handle.target, view);
        }
        gpu.errors.check()?;

        tracing::info!(
            target: "engine",
            "Rendering {} particles into {}x{}",
            points.instance_count(),
            viewport.x,
            viewport.y
        );

        Ok(Self {
            frame_loop: FrameLoop::new(window.clone()),
            window,
            gpu,
            sim,
            points,
            clock: Clock::new(),
            clear: config.graphics.clear(),
        })
    }

    fn handle_window_event(
        &mut self,
        event: &WindowEvent,
        elwt: &EventLoopWindowTarget<()>,
    ) -> SimulationResult<()> {
        match event {
            WindowEvent::CloseRequested => {
                self.frame_loop.stop();
                elwt.exit();
            }
            WindowEvent::Resized(size) => {
                self.gpu.resize(size.width, size.height);
                self.sim.resize(size.width, size.height);
                self.window.request_redraw();
            }
            WindowEvent::CursorMoved { position, .. } => {
                let pointer = pointer_from_cursor(position.x, position.y, self.sim.viewport());
                self.sim.set_pointer(pointer);
            }
            WindowEvent::RedrawRequested => {
                let Self {
                    gpu,
                    sim,
                    points,
                    clock,
                    frame_loop,
                    clear,
                    ..
                } = self;
                frame_loop.step(|| draw_frame(gpu, sim, points, clock, *clear))?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// 跳过本帧，状态不推进；设备已记录的错误仍然上报
fn skip_frame(errors: &DeviceErrors) -> SimulationResult<()> {
    tracing::trace!(target: "engine", "Surface unavailable, frame skipped");
    errors.check()
}

/// 一帧：获取表面 → 更新通道 → 渲染通道 → 呈现
///
/// 表面暂不可用时跳过整帧，状态不推进。
fn draw_frame(
    gpu: &mut GpuContext,
    sim: &mut SimulationContext<WgpuBackend>,
    points: &PointsRenderer,
    clock: &mut Clock,
    clear: wgpu::Color,
) -> SimulationResult<()> {
    let Some(frame) = gpu.acquire_frame()? else {
        return skip_frame(&gpu.errors);
    };

    let handle = sim.advance(clock.tick())?;
    let target = sim.compute().resolve(handle)?;
    let uniforms = sim.render_uniforms();

    let view = frame
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Points Encoder"),
        });
    if !points.draw(&gpu.queue, &mut encoder, &view, target, &uniforms, clear) {
        return Err(SimulationError::configuration(
            "render pass",
            format!("no bind group for state target {}", target.index()),
        ));
    }
    gpu.queue.submit(std::iter::once(encoder.finish()));
    frame.present();
    gpu.errors.check()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame::{FrameRequester, LoopState};
    use std::cell::Cell;

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
    fn test_skipped_frame_without_errors_keeps_running() {
        let errors = DeviceErrors::default();
        let mut frame_loop = FrameLoop::new(CountingRequester::default());
        frame_loop.start();
        assert_eq!(frame_loop.step(|| skip_frame(&errors)), Ok(true));
        assert_eq!(frame_loop.state(), LoopState::Running);
    }

    #[test]
    fn test_skipped_frame_surfaces_device_loss() {
        let errors = DeviceErrors::default();
        let mut frame_loop = FrameLoop::new(CountingRequester::default());
        frame_loop.start();

        errors.record("device lost (Unknown): adapter removed".into());
        let result = frame_loop.step(|| skip_frame(&errors));
        assert!(matches!(result, Err(SimulationError::RuntimeDevice(_))));
        assert_eq!(frame_loop.state(), LoopState::Stopped);
        assert_eq!(frame_loop.step(|| skip_frame(&errors)), Ok(false));
    }
}
