use std::time::Duration;

/// Fibonacci-like reconnect backoff.
///
/// Starting from `{0, 0, initial}`, each step moves to
///  `{retry_count + 1, current, previous + current}`, so with a one second
///  initial interval the waits run 1s, 1s, 2s, 3s, 5s, 8s, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    retry_count: u32,
    previous: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            retry_count: 0,
            previous: Duration::ZERO,
            current: initial,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// How long to wait before the next attempt.
    pub fn interval(&self, max: Duration) -> Duration {
        self.current.min(max)
    }

    pub fn advance(&mut self, max: Duration) {
        let next = self.previous.saturating_add(self.current).min(max);
        self.retry_count = self.retry_count.saturating_add(1);
        self.previous = self.current;
        self.current = next;
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.initial);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MAX: Duration = Duration::from_secs(300);

    #[test]
    fn test_fibonacci_sequence() {
        let mut backoff = Backoff::new(Duration::from_millis(1000));
        let mut waits = Vec::new();
        for _ in 0..8 {
            waits.push(backoff.interval(MAX).as_millis());
            backoff.advance(MAX);
        }
        assert_eq!(waits, [1000, 1000, 2000, 3000, 5000, 8000, 13000, 21000]);
        assert_eq!(backoff.retry_count(), 8);
    }

    #[test]
    fn test_capped_at_max() {
        let max = Duration::from_secs(10);
        let mut backoff = Backoff::new(Duration::from_secs(1));
        for _ in 0..20 {
            backoff.advance(max);
            assert!(backoff.interval(max) <= max);
        }
        assert_eq!(backoff.interval(max), max);
        // a lowered cap applies immediately
        assert_eq!(backoff.interval(Duration::from_secs(4)), Duration::from_secs(4));
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new(Duration::from_millis(500));
        backoff.advance(MAX);
        backoff.advance(MAX);
        backoff.reset();
        assert_eq!(backoff, Backoff::new(Duration::from_millis(500)));
    }
}
