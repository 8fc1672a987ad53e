/// Average sample rate of a timestamped stream, in Hz.
#[derive(Debug, Clone, Default)]
pub struct SampleRate {
    first: Option<f64>,
    last: f64,
    count: u64,
}

impl SampleRate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamps are seconds; callers only push accepted samples.
    pub fn push(&mut self, timestamp: f64) {
        if self.first.is_none() {
            self.first = Some(timestamp);
        }
        self.last = timestamp;
        self.count += 1;
    }

    pub fn average_rate(&self) -> f64 {
        match self.first {
            Some(first) if self.count > 1 && self.last > first => {
                (self.count - 1) as f64 / (self.last - first)
            }
            _ => 0.0,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn no_rate_before_two_samples() {
        let mut rate = SampleRate::new();
        assert_eq!(rate.average_rate(), 0.0);
        rate.push(100.0);
        assert_eq!(rate.average_rate(), 0.0);
    }

    #[test]
    fn four_hertz_stream() {
        let mut rate = SampleRate::new();
        for i in 0..41 {
            rate.push(1000.0 + i as f64 * 0.25);
        }
        assert_relative_eq!(rate.average_rate(), 4.0, epsilon = 1e-9);
        rate.clear();
        assert_eq!(rate.count(), 0);
        assert_eq!(rate.average_rate(), 0.0);
    }
}
