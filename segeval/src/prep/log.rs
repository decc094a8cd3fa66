use std::time::{Duration, Instant};

/// 分段累计计时器，例如统计一次评估中推理与指标计算各自的总耗时。
#[derive(Clone, Debug)]
pub struct AccTimer {
    consumed: Duration,
    since: Instant,
    laps: u32,
}

impl AccTimer {
    /// 初始化计时器。初始化时视为已经调用一次`self.start()`。
    #[inline]
    pub fn new() -> Self {
        Self {
            consumed: Duration::ZERO,
            since: Instant::now(),
            laps: 0,
        }
    }

    /// 开始（或重新开始）一段计时。
    #[inline]
    pub fn start(&mut self) {
        self.since = Instant::now();
    }

    /// 结束一段计时并累计。上一次调用必须是`self.start()`，否则时间计算值无意义。
    #[inline]
    pub fn elapsed(&mut self) {
        self.consumed += self.since.elapsed();
        self.laps += 1;
    }

    /// 计时执行`f`，返回其结果。
    pub fn measure<T>(&mut self, f: impl FnOnce() -> T) -> T {
        self.start();
        let out = f();
        self.elapsed();
        out
    }

    /// 累计总时长（毫秒）。
    #[inline]
    pub fn total_ms(&self) -> u64 {
        self.consumed.as_millis() as u64
    }

    /// 每段平均时长（毫秒）；尚未计时时为0。
    pub fn mean_ms(&self) -> f64 {
        match self.laps {
            0 => 0.0,
            n => self.consumed.as_secs_f64() * 1000.0 / n as f64,
        }
    }

    #[inline]
    pub fn laps(&self) -> u32 {
        self.laps
    }
}

impl Default for AccTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::AccTimer;

    #[test]
    fn test_measure_counts_laps() {
        let mut t = AccTimer::new();
        assert_eq!(t.mean_ms(), 0.0);
        let v = t.measure(|| 21 * 2);
        assert_eq!(v, 42);
        t.measure(|| ());
        assert_eq!(t.laps(), 2);
    }
}
