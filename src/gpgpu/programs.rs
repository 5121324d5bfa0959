//! 内置更新程序
//!
//! 每个程序同时给出 WGSL 函数体和等价的 CPU 更新核，两者逐项对应。

use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

use super::program::{KernelContext, UpdateProgram};

/// 状态分量的钳制范围，防止极端种子产生 inf/NaN
pub const STATE_LIMIT: f32 = 1.0e4;

/// 内置程序种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramKind {
    /// 恒等：输出 = 输入
    Identity,
    /// 径向波动，指针附近隆起
    Wave,
}

impl Default for ProgramKind {
    fn default() -> Self {
        Self::Wave
    }
}

impl ProgramKind {
    /// 为指定变量构建程序
    pub fn build(self, variable: &str) -> UpdateProgram {
        match self {
            Self::Identity => identity(variable),
            Self::Wave => wave(variable),
        }
    }
}

/// NaN 归零并钳制到 [-STATE_LIMIT, STATE_LIMIT]
fn sanitize(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-STATE_LIMIT, STATE_LIMIT)
    }
}

// WGSL 允许实现假定不存在 NaN/inf，因此按位判断
const SANITIZE_WGSL: &str = r#"
fn sanitize(v: f32) -> f32 {
    let bits = bitcast<u32>(v);
    let magnitude = bits & 0x7fffffffu;
    if (magnitude > 0x7f800000u) {
        return 0.0;
    }
    if (magnitude == 0x7f800000u) {
        return select(10000.0, -10000.0, (bits & 0x80000000u) != 0u);
    }
    return clamp(v, -10000.0, 10000.0);
}
"#;

/// 恒等程序
pub fn identity(variable: &str) -> UpdateProgram {
    let body = format!(
        r#"
fn update(coord: vec2<u32>, uv: vec2<f32>) -> vec4<f32> {{
    return textureLoad({variable}, coord, 0);
}}
"#
    );
    UpdateProgram::new("identity")
        .with_wgsl(body)
        .with_kernel(|ctx: &KernelContext<'_>| ctx.previous())
}

/// 波动参数默认值：x = 振幅，y = 空间频率，z = 速度，w = 指针隆起高度
pub const WAVE_PARAMS: Vec4 = Vec4::new(0.5, 1.5, 2.0, 0.75);

/// 波动程序
///
/// 粒子保持 XZ 网格位置，Y 随 `amp * sin(d * freq - time * speed)` 起伏，
/// 其中 `d` 为到原点的水平距离。指针映射到网格平面上，附近的粒子额外抬高
/// `bump * exp(-dist²)`。W 通道保存本帧高度。
pub fn wave(variable: &str) -> UpdateProgram {
    let body = format!(
        r#"{SANITIZE_WGSL}
fn update(coord: vec2<u32>, uv: vec2<f32>) -> vec4<f32> {{
    let prev = textureLoad({variable}, coord, 0);
    let x = sanitize(prev.x);
    let z = sanitize(prev.z);
    let d = length(vec2<f32>(x, z));
    let height = sim.params.x * sin(d * sim.params.y - sim.time * sim.params.z);
    let half_extent = sim.resolution.x * 0.125;
    let anchor = sim.pointer * half_extent;
    let offset = vec2<f32>(x, z) - anchor;
    let bump = sim.params.w * exp(-dot(offset, offset));
    let y = sanitize(height + bump);
    return vec4<f32>(x, y, z, y);
}}
"#
    );
    UpdateProgram::new("wave")
        .with_wgsl(body)
        .with_kernel(wave_kernel)
        .with_params(WAVE_PARAMS)
}

fn wave_kernel(ctx: &KernelContext<'_>) -> Vec4 {
    let prev = ctx.previous();
    let x = sanitize(prev.x);
    let z = sanitize(prev.z);
    let p = ctx.params;
    let d = Vec2::new(x, z).length();
    let height = p.x * (d * p.y - ctx.uniforms.time * p.z).sin();
    let half_extent = ctx.resolution.x as f32 * 0.125;
    let anchor = ctx.uniforms.pointer * half_extent;
    let offset = Vec2::new(x, z) - anchor;
    let bump = p.w * (-offset.dot(offset)).exp();
    let y = sanitize(height + bump);
    Vec4::new(x, y, z, y)
}
