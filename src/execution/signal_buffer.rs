use std::collections::VecDeque;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("rejected non-finite close price {0}")]
    NonFinite(f64),
}

/// Rolling window of closing prices
///
/// Holds at most `capacity` closes (the long MA period); the oldest close is
/// evicted when a new one arrives on a full buffer.
#[derive(Debug, Clone)]
pub struct SignalBuffer {
    closes: VecDeque<f64>,
    capacity: usize,
}

impl SignalBuffer {
    /// Create a new signal buffer
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of closes to keep (long MA period)
    pub fn new(capacity: usize) -> Self {
        Self {
            closes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a close, evicting the oldest if the window is full
    pub fn record_close(&mut self, price: f64) -> Result<(), BufferError> {
        if !price.is_finite() {
            return Err(BufferError::NonFinite(price));
        }

        self.closes.push_back(price);
        while self.closes.len() > self.capacity {
            self.closes.pop_front();
        }

        Ok(())
    }

    /// Append closes oldest-first, skipping non-finite values
    ///
    /// Returns how many closes were accepted.
    pub fn seed<I: IntoIterator<Item = f64>>(&mut self, closes: I) -> usize {
        closes
            .into_iter()
            .filter(|close| self.record_close(*close).is_ok())
            .count()
    }

    /// Mean of the last `period` closes
    ///
    /// Returns `0.0` when fewer than `period` closes are buffered (or when
    /// `period` is zero). Callers check [`is_full`](Self::is_full) or
    /// [`len`](Self::len) before trusting the value.
    pub fn moving_average(&self, period: usize) -> f64 {
        if period == 0 || self.closes.len() < period {
            return 0.0;
        }

        let sum: f64 = self.closes.iter().rev().take(period).sum();
        sum / period as f64
    }

    /// `(latest - previous) / previous`
    pub fn price_delta(&self) -> Option<f64> {
        let mut recent = self.closes.iter().rev();
        let latest = *recent.next()?;
        let previous = *recent.next()?;
        if previous == 0.0 {
            return None;
        }
        Some((latest - previous) / previous)
    }

    pub fn latest(&self) -> Option<f64> {
        self.closes.back().copied()
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.closes.len() >= self.capacity
    }

    /// Buffered closes, oldest first
    pub fn closes(&self) -> Vec<f64> {
        self.closes.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_new_buffer() {
        let buffer = SignalBuffer::new(200);
        assert_eq!(buffer.capacity(), 200);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
    }

    #[test]
    fn test_max_closes_limit() {
        let mut buffer = SignalBuffer::new(5);

        for i in 0..10 {
            buffer.record_close(100.0 + i as f64).unwrap();
        }

        // Should have prices 105-109
        assert_eq!(buffer.closes(), vec![105.0, 106.0, 107.0, 108.0, 109.0]);
        assert!(buffer.is_full());
    }

    #[test]
    fn test_random_sequences_keep_fifo_suffix() {
        let mut rng = rand::thread_rng();

        for _ in 0..50 {
            let capacity = rng.gen_range(1..40);
            let count = rng.gen_range(0..120);
            let inputs: Vec<f64> = (0..count).map(|_| rng.gen_range(1.0..1000.0)).collect();

            let mut buffer = SignalBuffer::new(capacity);
            for (i, price) in inputs.iter().enumerate() {
                buffer.record_close(*price).unwrap();
                assert!(buffer.len() <= capacity);
                assert_eq!(buffer.len(), (i + 1).min(capacity));
            }

            let expected = &inputs[inputs.len().saturating_sub(capacity)..];
            assert_eq!(buffer.closes(), expected);
        }
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut buffer = SignalBuffer::new(3);
        buffer.record_close(1.0).unwrap();

        assert!(matches!(
            buffer.record_close(f64::NAN),
            Err(BufferError::NonFinite(_))
        ));
        assert!(buffer.record_close(f64::INFINITY).is_err());
        assert_eq!(buffer.closes(), vec![1.0]);
    }

    #[test]
    fn test_moving_average_sentinel_on_short_history() {
        let mut buffer = SignalBuffer::new(10);
        buffer.record_close(100.0).unwrap();
        buffer.record_close(102.0).unwrap();

        assert_eq!(buffer.moving_average(5), 0.0);
        assert_eq!(buffer.moving_average(0), 0.0);
        assert_eq!(buffer.moving_average(2), 101.0);
    }

    #[test]
    fn test_moving_average_uses_last_entries() {
        let mut buffer = SignalBuffer::new(10);
        for price in [100.0, 102.0, 104.0, 106.0, 108.0] {
            buffer.record_close(price).unwrap();
        }

        assert_eq!(buffer.moving_average(5), 104.0);
        assert_eq!(buffer.moving_average(2), 107.0);
    }

    #[test]
    fn test_moving_average_constant_input() {
        let mut buffer = SignalBuffer::new(200);
        for _ in 0..250 {
            buffer.record_close(42.5).unwrap();
        }

        assert_eq!(buffer.moving_average(50), 42.5);
        assert_eq!(buffer.moving_average(200), 42.5);
    }

    #[test]
    fn test_price_delta() {
        let mut buffer = SignalBuffer::new(10);
        assert_eq!(buffer.price_delta(), None);

        buffer.record_close(100.0).unwrap();
        assert_eq!(buffer.price_delta(), None);

        buffer.record_close(101.0).unwrap();
        let delta = buffer.price_delta().unwrap();
        assert!((delta - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_price_delta_zero_previous() {
        let mut buffer = SignalBuffer::new(10);
        buffer.record_close(0.0).unwrap();
        buffer.record_close(5.0).unwrap();
        assert_eq!(buffer.price_delta(), None);
    }

    #[test]
    fn test_seed_skips_bad_values() {
        let mut buffer = SignalBuffer::new(4);
        let accepted = buffer.seed(vec![1.0, f64::NAN, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(accepted, 5);
        assert_eq!(buffer.closes(), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(buffer.latest(), Some(5.0));
    }
}
