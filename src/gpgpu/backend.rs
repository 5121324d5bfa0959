//! 计算后端抽象
//!
//! 调度器只通过这个 trait 操作状态纹理，后端持有纹理本身，
//! 调度器只持有 `TargetId`。
//!
//! ## 设计目标
//!
//! - wgpu 后端在 GPU 上执行更新通道
//! - CPU 参考后端逐像素执行 `UpdateKernel`，无需 GPU 即可测试调度逻辑

use glam::UVec2;

use super::program::UpdateProgram;
use super::texture::StateTexture;
use super::uniforms::UpdateUniforms;
use crate::core::error::SimulationResult;

/// 后端内部渲染目标的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub(crate) usize);

impl TargetId {
    /// 句柄序号
    pub fn index(&self) -> usize {
        self.0
    }
}

/// 编译更新程序所需的信息
#[derive(Debug)]
pub struct ProgramDescriptor<'a> {
    /// 变量名
    pub variable: &'a str,
    /// 更新程序
    pub program: &'a UpdateProgram,
    /// 依赖变量名（按声明顺序，对应输入绑定）
    pub dependencies: &'a [&'a str],
    /// 变量自身在依赖列表中的位置
    pub own_slot: Option<usize>,
    /// 网格分辨率
    pub resolution: UVec2,
}

impl ProgramDescriptor<'_> {
    /// 错误上下文
    pub fn context(&self) -> String {
        format!("update pass '{}' of variable '{}'", self.program.label(), self.variable)
    }
}

/// 计算后端
pub trait ComputeBackend {
    /// 编译后的更新程序
    type Program;
    /// 一组输入/输出绑定
    type Binding;

    /// 后端名称（日志用）
    fn name(&self) -> &'static str;

    /// 检查网格尺寸和纹理格式能力
    fn check_grid(&self, resolution: UVec2) -> SimulationResult<()>;

    /// 分配一个状态纹理
    fn create_target(&mut self, label: &str, resolution: UVec2) -> SimulationResult<TargetId>;

    /// 整体写入状态纹理
    fn upload(&mut self, target: TargetId, state: &StateTexture) -> SimulationResult<()>;

    /// 编译更新程序
    fn compile(&mut self, desc: &ProgramDescriptor<'_>) -> SimulationResult<Self::Program>;

    /// 准备绑定：`inputs` 按依赖顺序读取，`output` 被整体写入
    ///
    /// `output` 出现在 `inputs` 中时必须报错。
    fn bind(
        &mut self,
        program: &Self::Program,
        inputs: &[TargetId],
        output: TargetId,
    ) -> SimulationResult<Self::Binding>;

    /// 在整个网格上执行一次更新
    fn dispatch(
        &mut self,
        program: &Self::Program,
        binding: &Self::Binding,
        uniforms: &UpdateUniforms,
    ) -> SimulationResult<()>;

    /// 提交本帧记录的全部更新
    fn submit(&mut self) -> SimulationResult<()>;

    /// 回读状态纹理
    fn read_target(&self, target: TargetId) -> SimulationResult<StateTexture>;
}
