//! 渲染模块
//!
//! - `context` - wgpu 设备、队列、窗口表面
//! - `camera` - 透视相机与相机缩放常数
//! - `bridge` - 状态纹理到粒子几何的查找表
//! - `points` - 实例化点渲染通道

pub mod bridge;
pub mod camera;
pub mod context;
pub mod points;

pub use bridge::{LookupTable, PointInstance, ProjectedPoint};
pub use camera::{camera_constant, CameraConstantCache, PerspectiveCamera};
pub use context::{DeviceErrors, GpuContext};
pub use points::{PointsRenderer, RenderUniforms};
