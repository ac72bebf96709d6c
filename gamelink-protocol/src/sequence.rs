use std::sync::atomic::{AtomicU16, Ordering};

/// Monotonic allocator for `msg_seq` values. `0` is reserved for pushes and
/// fire-and-forget sends, so the counter skips it on wraparound.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU16,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            next: AtomicU16::new(1),
        }
    }

    /// Allocate the next sequence number, never `0`.
    pub fn next(&self) -> u16 {
        loop {
            let seq = self.next.fetch_add(1, Ordering::Relaxed);
            if seq != 0 {
                return seq;
            }
            // landed on the reserved value, retry for the next one
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_issues_zero() {
        let counter = SequenceCounter::new();
        for _ in 0..(u16::MAX as u32 + 10) {
            assert_ne!(counter.next(), 0);
        }
    }

    #[test]
    fn issues_increasing_values_before_wrap() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.next(), 3);
    }
}
