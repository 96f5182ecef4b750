//! 传输速率统计
//!
//! 每个完成的上传条目记录一个速度样本（KB/s），由此推导：
//! - 当前速度：最近 2 秒内样本的平均值
//! - 平均速度：全部保留样本的平均值
//! - 峰值速度：观测到的当前速度的最大值
//!
//! 本身不加锁，由队列状态锁统一保护

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 最多保留的样本数
pub const MAX_SPEED_SAMPLES: usize = 50;

/// 当前速度的统计窗口
pub const CURRENT_SPEED_WINDOW: Duration = Duration::from_millis(2000);

/// 速度样本
#[derive(Debug, Clone, Copy)]
pub struct SpeedSample {
    pub timestamp: Instant,
    /// KB/s
    pub speed: f64,
}

/// 速率统计器
#[derive(Debug, Default)]
pub struct RateTracker {
    samples: VecDeque<SpeedSample>,
    peak_speed: f64,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个样本，超过上限时淘汰最旧的
    pub fn record_sample(&mut self, speed: f64) {
        self.record_sample_at(speed, Instant::now());
    }

    pub(crate) fn record_sample_at(&mut self, speed: f64, timestamp: Instant) {
        self.samples.push_back(SpeedSample { timestamp, speed });
        while self.samples.len() > MAX_SPEED_SAMPLES {
            self.samples.pop_front();
        }
    }

    /// 当前速度，每次调用都会更新峰值
    pub fn current_speed(&mut self) -> f64 {
        self.current_speed_at(Instant::now())
    }

    pub(crate) fn current_speed_at(&mut self, now: Instant) -> f64 {
        let (sum, count) = self
            .samples
            .iter()
            .filter(|s| now.saturating_duration_since(s.timestamp) <= CURRENT_SPEED_WINDOW)
            .fold((0.0, 0usize), |(sum, count), s| (sum + s.speed, count + 1));

        let current = if count == 0 { 0.0 } else { sum / count as f64 };
        if current > self.peak_speed {
            self.peak_speed = current;
        }
        current
    }

    /// 全部保留样本的平均速度
    pub fn average_speed(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.speed).sum::<f64>() / self.samples.len() as f64
    }

    pub fn peak_speed(&self) -> f64 {
        self.peak_speed
    }

    /// 清空样本并归零
    pub fn reset(&mut self) {
        self.samples.clear();
        self.peak_speed = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_speed_recent_samples() {
        let mut tracker = RateTracker::new();
        for speed in [10.0, 20.0, 30.0] {
            tracker.record_sample(speed);
        }
        assert_eq!(tracker.current_speed(), 20.0);
        assert!(tracker.peak_speed() >= 20.0);
        assert_eq!(tracker.average_speed(), 20.0);
    }

    #[test]
    fn test_empty_tracker() {
        let mut tracker = RateTracker::new();
        assert_eq!(tracker.current_speed(), 0.0);
        assert_eq!(tracker.average_speed(), 0.0);
        assert_eq!(tracker.peak_speed(), 0.0);
    }

    #[test]
    fn test_old_samples_leave_window() {
        let mut tracker = RateTracker::new();
        let now = Instant::now() + Duration::from_secs(10);
        tracker.record_sample_at(100.0, now - Duration::from_secs(5));
        tracker.record_sample_at(40.0, now - Duration::from_millis(500));

        assert_eq!(tracker.current_speed_at(now), 40.0);
        // 平均速度仍然包含窗口外的样本
        assert_eq!(tracker.average_speed(), 70.0);
    }

    #[test]
    fn test_peak_is_monotonic() {
        let mut tracker = RateTracker::new();
        let now = Instant::now() + Duration::from_secs(10);
        tracker.record_sample_at(80.0, now - Duration::from_secs(5));
        assert_eq!(tracker.current_speed_at(now - Duration::from_secs(5)), 80.0);

        // 样本过期后当前速度归零，峰值不降
        assert_eq!(tracker.current_speed_at(now), 0.0);
        assert_eq!(tracker.peak_speed(), 80.0);
    }

    #[test]
    fn test_eviction_cap() {
        let mut tracker = RateTracker::new();
        for i in 0..(MAX_SPEED_SAMPLES + 10) {
            tracker.record_sample(i as f64);
        }
        assert_eq!(tracker.samples.len(), MAX_SPEED_SAMPLES);
        // 最旧的 10 个被淘汰：剩余 10..60
        let expected = (10..60).sum::<usize>() as f64 / 50.0;
        assert_eq!(tracker.average_speed(), expected);
    }

    #[test]
    fn test_reset() {
        let mut tracker = RateTracker::new();
        tracker.record_sample(50.0);
        tracker.current_speed();
        tracker.reset();

        assert_eq!(tracker.samples.len(), 0);
        assert_eq!(tracker.peak_speed(), 0.0);
        assert_eq!(tracker.current_speed(), 0.0);
    }
}
