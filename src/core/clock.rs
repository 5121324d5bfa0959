//! 帧时钟与帧统计

use std::time::{Duration, Instant};

/// 单帧时间
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTime {
    /// 启动以来的时间（秒）
    pub elapsed: f32,
    /// 距上一帧的时间（秒）
    pub delta: f32,
}

impl FrameTime {
    /// 固定时间（测试、单步）
    pub fn fixed(elapsed: f32, delta: f32) -> Self {
        Self { elapsed, delta }
    }
}

/// 单调时钟
#[derive(Debug, Clone)]
pub struct Clock {
    start: Instant,
    last: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// 从当前时刻开始计时
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// 从指定时刻开始计时
    pub fn starting_at(start: Instant) -> Self {
        Self { start, last: start }
    }

    /// 推进到当前时刻
    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    /// 推进到指定时刻（早于上一帧的时刻按上一帧处理）
    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let now = now.max(self.last);
        let delta = now.duration_since(self.last);
        self.last = now;
        FrameTime {
            elapsed: now.duration_since(self.start).as_secs_f32(),
            delta: delta.as_secs_f32(),
        }
    }
}

/// 一个统计窗口的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReport {
    /// 总帧数
    pub frames: u64,
    /// 窗口内平均帧率
    pub fps: f32,
    /// 窗口内平均帧时间（毫秒）
    pub frame_ms: f32,
}

/// 帧统计，每隔 `interval` 产生一份报告
#[derive(Debug, Clone)]
pub struct FrameStats {
    interval: Duration,
    frames: u64,
    window_frames: u64,
    window_start: f32,
}

impl FrameStats {
    /// 创建统计器
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            frames: 0,
            window_frames: 0,
            window_start: 0.0,
        }
    }

    /// 总帧数
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// 记录一帧，窗口结束时返回报告
    pub fn record(&mut self, time: FrameTime) -> Option<StatsReport> {
        self.frames += 1;
        self.window_frames += 1;

        let span = time.elapsed - self.window_start;
        if span < self.interval.as_secs_f32() || span <= 0.0 {
            return None;
        }

        let report = StatsReport {
            frames: self.frames,
            fps: self.window_frames as f32 / span,
            frame_ms: span * 1000.0 / self.window_frames as f32,
        };
        self.window_frames = 0;
        self.window_start = time.elapsed;
        Some(report)
    }
}
