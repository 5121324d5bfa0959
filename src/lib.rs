//! # Feedback Particles
//!
//! An animated particle field whose positions live in floating-point textures
//! and are advanced every frame by a GPU update pass that reads the previous
//! state and writes the next one.
//!
//! ## Features
//!
//! - **Feedback textures**: one RGBA32F texture pair per tracked variable,
//!   ping-ponged so an update never reads what it writes
//! - **Pluggable update programs**: a WGSL body for the GPU plus an equivalent
//!   Rust kernel for the CPU reference backend
//! - **Instanced point rendering**: each particle samples its position from
//!   the current state texture through a fixed lookup coordinate
//! - **Config driven**: TOML/JSON configuration with `PARTICLES_*` overrides
//!
//! ## Architecture Design
//!
//! ```text
//! FrameLoop ──► SimulationContext::advance
//!                 └─► ComputationRenderer::compute   (update pass, swap)
//!           ──► PointsRenderer::draw                 (render pass)
//!           ──► present
//! ```
//!
//! ### Example
//!
//! ```ignore
//! use feedback_particles::config::EngineConfig;
//! use feedback_particles::core::{FrameTime, SimulationContext};
//! use feedback_particles::gpgpu::CpuBackend;
//!
//! let mut ctx = SimulationContext::setup(CpuBackend::new(), &EngineConfig::default(), (800, 600).into())?;
//! ctx.advance(FrameTime::fixed(0.016, 0.016))?;
//! let positions = ctx.sample_positions()?;
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Engine entry point, frame loop and simulation context
//! - [`gpgpu`]: State textures, update programs, backends and the scheduler
//! - [`render`]: GPU context, camera, lookup bridge and point renderer
//! - [`config`]: Configuration loading and validation

/// Engine entry point, frame loop and simulation context
pub mod core;
/// Configuration system
pub mod config;
/// GPU feedback-texture computation
pub mod gpgpu;
/// Rendering of the particle field
pub mod render;
