//! WGPU 设备上下文
//!
//! 创建实例、适配器、设备和（可选的）窗口表面。
//! 更新通道和渲染通道共享同一设备与队列。

use std::sync::{Arc, Mutex};

use winit::window::Window;

use crate::core::error::{SimulationError, SimulationResult};

/// 设备运行期错误收集器
///
/// 安装为设备的未捕获错误处理器和设备丢失回调，帧循环在每帧结束时
/// （包括跳过的帧）取出并作为致命错误上报。
#[derive(Clone, Default)]
pub struct DeviceErrors {
    slot: Arc<Mutex<Option<String>>>,
}

impl DeviceErrors {
    /// 安装到设备
    pub fn install(&self, device: &wgpu::Device) {
        let sink = self.clone();
        device.on_uncaptured_error(Box::new(move |error| {
            tracing::error!(target: "render", "Uncaptured device error: {}", error);
            sink.record(error.to_string());
        }));

        let sink = self.clone();
        device.set_device_lost_callback(move |reason, message| {
            if matches!(reason, wgpu::DeviceLostReason::Dropped) {
                return;
            }
            tracing::error!(target: "render", "Device lost ({:?}): {}", reason, message);
            sink.record(format!("device lost ({:?}): {}", reason, message));
        });
    }

    /// 记录错误（只保留第一条）
    pub fn record(&self, message: String) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.get_or_insert(message);
        }
    }

    /// 取出错误
    pub fn take(&self) -> Option<String> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }

    /// 有错误时转为 `RuntimeDevice`
    pub fn check(&self) -> SimulationResult<()> {
        match self.take() {
            Some(message) => Err(SimulationError::RuntimeDevice(message)),
            None => Ok(()),
        }
    }
}

/// 窗口表面
pub struct SurfaceState {
    /// 表面
    pub surface: wgpu::Surface<'static>,
    /// 表面配置
    pub config: wgpu::SurfaceConfiguration,
}

/// GPU 上下文
pub struct GpuContext {
    /// 适配器
    pub adapter: wgpu::Adapter,
    /// 设备
    pub device: Arc<wgpu::Device>,
    /// 队列
    pub queue: Arc<wgpu::Queue>,
    /// 窗口表面（无头模式下为空）
    pub surface: Option<SurfaceState>,
    /// 运行期错误
    pub errors: DeviceErrors,
}

impl GpuContext {
    /// 为窗口创建上下文
    pub async fn new(window: Arc<Window>, vsync: bool) -> SimulationResult<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window)
            .map_err(|e| SimulationError::configuration("surface", e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                SimulationError::configuration("adapter", "no compatible GPU found")
            })?;

        let (device, queue) = Self::request_device(&adapter).await?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| {
                SimulationError::configuration("surface", "surface reports no supported formats")
            })?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        tracing::info!(
            target: "render",
            "GPU context ready: {} ({:?}), surface {:?} {}x{}",
            adapter.get_info().name,
            adapter.get_info().backend,
            format,
            config.width,
            config.height
        );

        let errors = DeviceErrors::default();
        errors.install(&device);

        Ok(Self {
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            surface: Some(SurfaceState { surface, config }),
            errors,
        })
    }

    /// 无头上下文（离屏计算、回读）
    pub async fn headless() -> SimulationResult<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                SimulationError::configuration("adapter", "no compatible GPU found")
            })?;
        let (device, queue) = Self::request_device(&adapter).await?;

        let errors = DeviceErrors::default();
        errors.install(&device);

        Ok(Self {
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            surface: None,
            errors,
        })
    }

    async fn request_device(
        adapter: &wgpu::Adapter,
    ) -> SimulationResult<(wgpu::Device, wgpu::Queue)> {
        adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Particles Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| SimulationError::configuration("device", e.to_string()))
    }

    /// 表面格式（无头模式下为 RGBA8 sRGB）
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface
            .as_ref()
            .map(|s| s.config.format)
            .unwrap_or(wgpu::TextureFormat::Rgba8UnormSrgb)
    }

    /// 调整表面大小
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(state) = &mut self.surface {
            state.config.width = width;
            state.config.height = height;
            state.surface.configure(&self.device, &state.config);
        }
    }

    /// 获取下一帧
    ///
    /// 表面过期或丢失时重新配置并跳过本帧；超时跳过本帧；显存耗尽为致命错误。
    pub fn acquire_frame(&mut self) -> SimulationResult<Option<wgpu::SurfaceTexture>> {
        let Some(state) = &self.surface else {
            return Ok(None);
        };
        match state.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::warn!(target: "render", "Surface lost or outdated, reconfiguring");
                state.surface.configure(&self.device, &state.config);
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!(target: "render", "Surface acquire timed out, skipping frame");
                Ok(None)
            }
            Err(e) => Err(SimulationError::RuntimeDevice(format!(
                "failed to acquire surface texture: {}",
                e
            ))),
        }
    }
}
