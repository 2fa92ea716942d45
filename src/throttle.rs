use std::time::Duration;

use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);

/// Paces output to a byte rate averaged over one second windows.
///
/// Chunks never cross a window boundary. After each chunk the loop sleeps
/// until the share of the window that the bytes sent so far are entitled to
/// has elapsed, so `M` bytes at `N` bytes/s take at least `M / N` seconds.
#[derive(Debug)]
pub(crate) struct Throttle {
    max_bytes_per_second: u64,
    window_start: Instant,
    window_bytes: u64,
}

impl Throttle {
    /// `0` disables pacing.
    pub(crate) fn new(max_bytes_per_second: u64) -> Self {
        Throttle {
            max_bytes_per_second,
            window_start: Instant::now(),
            window_bytes: 0,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.max_bytes_per_second > 0
    }

    /// Size of the next read given `remaining` bytes in the current range.
    pub(crate) fn chunk_len(&self, remaining: u64, default_chunk: u64) -> u64 {
        if self.is_enabled() {
            let room = self.max_bytes_per_second.saturating_sub(self.window_bytes).max(1);
            remaining.min(room)
        } else {
            remaining.min(default_chunk.max(1))
        }
    }

    /// Accounts for `sent` bytes and sleeps off whatever the window still owes.
    pub(crate) async fn pace(&mut self, sent: u64) {
        if !self.is_enabled() {
            return;
        }
        self.window_bytes += sent;

        let due = self.due();
        let elapsed = self.window_start.elapsed();
        if due > elapsed {
            tokio::time::sleep(due - elapsed).await;
        }

        if self.window_bytes >= self.max_bytes_per_second {
            self.window_start = Instant::now();
            self.window_bytes = 0;
        }
    }

    /// Time into the window by which `window_bytes` may have been sent.
    fn due(&self) -> Duration {
        let window = WINDOW.as_nanos();
        let nanos = u128::from(self.window_bytes.min(self.max_bytes_per_second)) * window
            / u128::from(self.max_bytes_per_second);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // the timer wheel rounds deadlines to whole milliseconds
    fn assert_elapsed(expected: Duration, start: Instant) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed <= expected + Duration::from_millis(2),
            "expected {expected:?}, got {elapsed:?}",
        );
    }

    #[test]
    fn test_chunk_len() {
        let off = Throttle::new(0);
        assert!(!off.is_enabled());
        assert_eq!(100, off.chunk_len(100, 1024));
        assert_eq!(1024, off.chunk_len(5000, 1024));

        let mut on = Throttle::new(300);
        assert_eq!(300, on.chunk_len(5000, 1024));
        on.window_bytes = 250;
        assert_eq!(50, on.chunk_len(5000, 1024));
        assert_eq!(20, on.chunk_len(20, 1024));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_fills_window() {
        let start = Instant::now();
        let mut throttle = Throttle::new(1000);

        throttle.pace(500).await;
        assert_elapsed(Duration::from_millis(500), start);

        throttle.pace(500).await;
        assert_elapsed(Duration::from_secs(1), start);
        assert_eq!(0, throttle.window_bytes);

        throttle.pace(250).await;
        assert_elapsed(Duration::from_millis(1250), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_skips_time_already_spent() {
        let start = Instant::now();
        let mut throttle = Throttle::new(1000);

        // a slow read and write already used most of the window
        tokio::time::sleep(Duration::from_millis(800)).await;
        throttle.pace(1000).await;
        assert_elapsed(Duration::from_secs(1), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_never_sleeps() {
        let start = Instant::now();
        let mut throttle = Throttle::new(0);
        throttle.pace(1 << 20).await;
        assert_elapsed(Duration::ZERO, start);
    }
}
