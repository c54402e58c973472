//! Latched total count for flicker-free progress display.
//!
//! The store confirms classifications asynchronously, so the raw
//! unclassified count drifts while the user is mid-burst. The stabilizer
//! latches `raw + already_classified` at the first non-zero observation
//! and keeps reporting that sum until the session is rebuilt.

/// Freezes the perceived total for the lifetime of one session.
#[derive(Debug, Default)]
pub struct CountStabilizer {
    latched: Option<u64>,
}

impl CountStabilizer {
    /// Observe the current raw counts and return the stable total.
    ///
    /// Latches on the first call where the sum is non-zero; afterwards the
    /// arguments are ignored.
    pub fn observe(&mut self, raw_unclassified: u64, session_classified: u64) -> u64 {
        if let Some(total) = self.latched {
            return total;
        }
        let sum = raw_unclassified + session_classified;
        if sum > 0 {
            self.latched = Some(sum);
        }
        sum
    }

    /// The latched total, or 0 if nothing was observed yet.
    pub fn current(&self) -> u64 {
        self.latched.unwrap_or(0)
    }

    /// Unlatch. Only called on full session rebuild or forced reload.
    pub fn reset(&mut self) {
        self.latched = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latches_first_non_zero_observation() {
        let mut stabilizer = CountStabilizer::default();
        assert_eq!(stabilizer.observe(0, 0), 0);
        assert_eq!(stabilizer.current(), 0);

        assert_eq!(stabilizer.observe(120, 0), 120);
        // raw count drifts as the store catches up; total stays put
        assert_eq!(stabilizer.observe(95, 10), 120);
        assert_eq!(stabilizer.observe(0, 0), 120);
        assert_eq!(stabilizer.current(), 120);
    }

    #[test]
    fn test_reset_unlatches() {
        let mut stabilizer = CountStabilizer::default();
        stabilizer.observe(50, 0);
        stabilizer.reset();
        assert_eq!(stabilizer.current(), 0);
        assert_eq!(stabilizer.observe(30, 2), 32);
    }
}
