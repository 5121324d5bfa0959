//! 更新通道程序
//!
//! 一个更新程序是纯粹的逐像素函数 `(previousState, uniforms) -> nextState`，
//! 同时携带两种形式：
//! - WGSL 函数体 `fn update(coord: vec2<u32>, uv: vec2<f32>) -> vec4<f32>`（GPU 后端）
//! - Rust `UpdateKernel`（CPU 参考后端）
//!
//! 调度器负责在 WGSL 函数体外生成绑定头和计算入口点。

use std::fmt;
use std::sync::Arc;

use glam::{IVec2, UVec2, Vec2, Vec4};

use super::texture::StateTexture;
use super::uniforms::UpdateUniforms;

/// 计算着色器工作组边长
pub const WORKGROUP_SIZE: u32 = 8;

/// 逐像素更新核（CPU 参考实现）
///
/// 实现必须是纯函数：相同的上一帧状态和相同的输入产生相同的输出。
pub trait UpdateKernel: Send + Sync {
    /// 计算单个像素的下一帧状态
    fn update(&self, ctx: &KernelContext<'_>) -> Vec4;
}

impl<F> UpdateKernel for F
where
    F: Fn(&KernelContext<'_>) -> Vec4 + Send + Sync,
{
    fn update(&self, ctx: &KernelContext<'_>) -> Vec4 {
        self(ctx)
    }
}

/// 单个像素的执行上下文
pub struct KernelContext<'a> {
    /// 像素坐标
    pub coord: UVec2,
    /// 网格分辨率
    pub resolution: UVec2,
    /// 帧输入
    pub uniforms: &'a UpdateUniforms,
    /// 变量自定义参数
    pub params: Vec4,
    /// 依赖变量的上一帧纹理（按声明顺序）
    inputs: &'a [(&'a str, &'a StateTexture)],
    /// 自身在依赖列表中的位置
    own: Option<usize>,
}

impl<'a> KernelContext<'a> {
    pub(crate) fn new(
        coord: UVec2,
        resolution: UVec2,
        uniforms: &'a UpdateUniforms,
        params: Vec4,
        inputs: &'a [(&'a str, &'a StateTexture)],
        own: Option<usize>,
    ) -> Self {
        Self {
            coord,
            resolution,
            uniforms,
            params,
            inputs,
            own,
        }
    }

    /// 像素中心的归一化坐标，等价于 `(coord + 0.5) / resolution`
    pub fn uv(&self) -> Vec2 {
        (self.coord.as_vec2() + Vec2::splat(0.5)) / self.resolution.as_vec2()
    }

    /// 自身上一帧在当前像素的值；未声明自依赖时为零
    pub fn previous(&self) -> Vec4 {
        match self.own {
            Some(i) => self.inputs[i].1.get(self.coord.x, self.coord.y),
            None => Vec4::ZERO,
        }
    }

    /// 读取任意依赖变量上一帧的任意像素（坐标钳制到边缘）
    pub fn read(&self, name: &str, coord: IVec2) -> Option<Vec4> {
        self.inputs
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| t.load_clamped(coord.x as i64, coord.y as i64))
    }

    /// 依赖数量
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }
}

/// 更新程序
#[derive(Clone)]
pub struct UpdateProgram {
    /// 标签
    label: String,
    /// WGSL 函数体
    wgsl: Option<String>,
    /// CPU 更新核
    kernel: Option<Arc<dyn UpdateKernel>>,
    /// 自定义参数（作为 `sim.params` 传入）
    params: Vec4,
}

impl UpdateProgram {
    /// 创建空程序
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            wgsl: None,
            kernel: None,
            params: Vec4::ZERO,
        }
    }

    /// 设置 WGSL 函数体
    pub fn with_wgsl(mut self, body: impl Into<String>) -> Self {
        self.wgsl = Some(body.into());
        self
    }

    /// 设置 CPU 更新核
    pub fn with_kernel<K: UpdateKernel + 'static>(mut self, kernel: K) -> Self {
        self.kernel = Some(Arc::new(kernel));
        self
    }

    /// 设置自定义参数
    pub fn with_params(mut self, params: Vec4) -> Self {
        self.params = params;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn wgsl(&self) -> Option<&str> {
        self.wgsl.as_deref()
    }

    pub fn kernel(&self) -> Option<&Arc<dyn UpdateKernel>> {
        self.kernel.as_ref()
    }

    pub fn params(&self) -> Vec4 {
        self.params
    }
}

impl fmt::Debug for UpdateProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateProgram")
            .field("label", &self.label)
            .field("wgsl", &self.wgsl.is_some())
            .field("kernel", &self.kernel.is_some())
            .field("params", &self.params)
            .finish()
    }
}

/// 检查变量名能否作为 WGSL 标识符
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name != "_" && !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// WGSL 计算着色器生成器
///
/// 在更新函数体外包上绑定头和入口点：
/// - binding 0: `sim` uniform
/// - binding 1..=n: 每个依赖变量一张 `texture_2d<f32>`，名称即变量名
/// - binding n+1: 只写存储纹理 `output_state`
pub struct ComputeShaderGenerator;

impl ComputeShaderGenerator {
    /// Uniform 块声明
    pub const UNIFORMS: &'static str = r#"
struct SimUniforms {
    resolution: vec2<f32>,
    time: f32,
    delta: f32,
    pointer: vec2<f32>,
    _padding: vec2<f32>,
    params: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> sim: SimUniforms;
"#;

    /// 输出纹理的绑定点
    pub fn output_binding(dependency_count: usize) -> u32 {
        dependency_count as u32 + 1
    }

    /// 生成完整的计算着色器
    pub fn generate(dependency_names: &[&str], body: &str) -> String {
        let mut source = String::from(Self::UNIFORMS);

        for (i, name) in dependency_names.iter().enumerate() {
            source.push_str(&format!(
                "\n@group(0) @binding({})\nvar {}: texture_2d<f32>;\n",
                i + 1,
                name
            ));
        }

        source.push_str(&format!(
            "\n@group(0) @binding({})\nvar output_state: texture_storage_2d<rgba32float, write>;\n",
            Self::output_binding(dependency_names.len())
        ));

        source.push_str(body);

        source.push_str(&format!(
            r#"
@compute @workgroup_size({size}, {size}, 1)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let dims = textureDimensions(output_state);
    if (global_id.x >= dims.x || global_id.y >= dims.y) {{
        return;
    }}
    let uv = (vec2<f32>(global_id.xy) + vec2<f32>(0.5)) / sim.resolution;
    textureStore(output_state, global_id.xy, update(global_id.xy, uv));
}}
"#,
            size = WORKGROUP_SIZE
        ));

        source
    }
}
