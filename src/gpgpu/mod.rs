//! GPU 反馈纹理计算模块
//!
//! 粒子状态编码为 RGBA32F 纹理，每帧由更新通道读取上一帧、写入下一帧。
//!
//! ## 架构设计
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              ComputationRenderer (乒乓调度)              │
//! ├─────────────────────────────────────────────────────────┤
//! │  每个变量两张状态纹理：                                   │
//! │     slot[current]      ── 只读，本帧渲染通道采样          │
//! │     slot[1 - current]  ── 只写，本帧更新通道输出          │
//! │                                                          │
//! │  compute():                                              │
//! │     1. 按声明顺序 dispatch 所有变量                       │
//! │     2. submit                                            │
//! │     3. current = 1 - current                             │
//! ├─────────────────────────────────────────────────────────┤
//! │  ComputeBackend                                          │
//! │     - WgpuBackend: 计算管线 + 存储纹理                    │
//! │     - CpuBackend:  逐像素执行 UpdateKernel（测试/参考）    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 使用示例
//!
//! ```ignore
//! let mut gpu = ComputationRenderer::new(CpuBackend::new(), 50, 50);
//! let seed = gpu.create_texture(grid_seed(50));
//! let position = gpu.add_variable("texture_position", programs::wave("texture_position"), seed)?;
//! gpu.set_variable_dependencies(position, &[position])?;
//! gpu.init()?;
//!
//! gpu.compute(&UpdateUniforms::at(elapsed))?;
//! let handle = gpu.current_render_target(position)?;
//! ```

pub mod backend;
pub mod cpu;
pub mod program;
pub mod programs;
pub mod scheduler;
pub mod texture;
pub mod uniforms;
pub mod wgpu_backend;

pub use backend::{ComputeBackend, ProgramDescriptor, TargetId};
pub use cpu::{CpuBackend, DispatchRecord};
pub use program::{ComputeShaderGenerator, KernelContext, UpdateKernel, UpdateProgram};
pub use programs::ProgramKind;
pub use scheduler::{ComputationRenderer, StateHandle, VariableId};
pub use texture::{grid_seed, StateTexture};
pub use uniforms::UpdateUniforms;
pub use wgpu_backend::WgpuBackend;
