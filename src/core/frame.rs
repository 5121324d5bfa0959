//! 帧循环
//!
//! 帧循环不自行重新调度：每帧结束后通过注入的 `FrameRequester` 请求下一帧，
//! 窗口驱动时由 winit 的重绘请求实现，测试中可以直接单步。

use crate::core::error::SimulationResult;

/// 请求下一帧的端口
pub trait FrameRequester {
    /// 请求下一帧
    fn request_frame(&self);
}

impl FrameRequester for winit::window::Window {
    fn request_frame(&self) {
        self.request_redraw();
    }
}

impl<T: FrameRequester + ?Sized> FrameRequester for std::sync::Arc<T> {
    fn request_frame(&self) {
        (**self).request_frame();
    }
}

/// 帧循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// 尚未开始
    Idle,
    /// 运行中
    Running,
    /// 已停止（取消或致命错误）
    Stopped,
}

/// 帧循环
pub struct FrameLoop<R: FrameRequester> {
    requester: R,
    state: LoopState,
    frames: u64,
}

impl<R: FrameRequester> FrameLoop<R> {
    /// 创建帧循环
    pub fn new(requester: R) -> Self {
        Self {
            requester,
            state: LoopState::Idle,
            frames: 0,
        }
    }

    /// 开始：请求第一帧
    pub fn start(&mut self) {
        if self.state == LoopState::Idle {
            self.state = LoopState::Running;
            self.requester.request_frame();
        }
    }

    /// 停止，正在执行的帧不受影响，之后不再请求新帧
    pub fn stop(&mut self) {
        self.state = LoopState::Stopped;
    }

    /// 当前状态
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// 已执行的帧数
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// 执行一帧
    ///
    /// 未运行时不执行，返回 `Ok(false)`。帧成功后请求下一帧；
    /// 出错时循环停止并返回错误。
    pub fn step<F>(&mut self, frame: F) -> SimulationResult<bool>
    where
        F: FnOnce() -> SimulationResult<()>,
    {
        if self.state != LoopState::Running {
            return Ok(false);
        }
        match frame() {
            Ok(()) => {
                self.frames += 1;
                if self.state == LoopState::Running {
                    self.requester.request_frame();
                }
                Ok(true)
            }
            Err(error) => {
                tracing::error!(target: "engine", "Frame {} failed: {}", self.frames, error);
                self.state = LoopState::Stopped;
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::SimulationError;
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
    fn test_step_requests_next_frame() {
        let mut frame_loop = FrameLoop::new(CountingRequester::default());
        assert_eq!(frame_loop.step(|| Ok(())), Ok(false));

        frame_loop.start();
        assert_eq!(frame_loop.requester.requests.get(), 1);
        assert_eq!(frame_loop.step(|| Ok(())), Ok(true));
        assert_eq!(frame_loop.step(|| Ok(())), Ok(true));
        assert_eq!(frame_loop.requester.requests.get(), 3);
        assert_eq!(frame_loop.frames(), 2);
    }

    #[test]
    fn test_error_stops_loop() {
        let mut frame_loop = FrameLoop::new(CountingRequester::default());
        frame_loop.start();
        let err = frame_loop.step(|| Err(SimulationError::RuntimeDevice("lost".into())));
        assert!(err.is_err());
        assert_eq!(frame_loop.state(), LoopState::Stopped);
        assert_eq!(frame_loop.step(|| Ok(())), Ok(false));
        assert_eq!(frame_loop.requester.requests.get(), 1);
    }

    #[test]
    fn test_stop_between_frames() {
        let mut frame_loop = FrameLoop::new(CountingRequester::default());
        frame_loop.start();
        frame_loop.stop();
        let ran = Cell::new(false);
        assert_eq!(
            frame_loop.step(|| {
                ran.set(true);
                Ok(())
            }),
            Ok(false)
        );
        assert!(!ran.get());
    }
}
