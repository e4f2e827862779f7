//! Running median over a fixed window of samples

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Median of the last `window` samples.
///
/// Samples are kept twice, in arrival order to know which one to evict, and
/// sorted to read the median. Insertion and eviction are a binary search and
/// a shift, bounded by the window size.
#[derive(Debug, Clone)]
pub struct RunningMedian {
    window: usize,
    arrival: VecDeque<f64>,
    sorted: Vec<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RunningMedian {
    /// Create an empty median. A window of zero is treated as one.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);

        Self {
            window,
            arrival: VecDeque::with_capacity(window),
            sorted: Vec::with_capacity(window),
        }
    }

    /// Add a sample, evicting the oldest one if the window is full.
    ///
    /// Non-finite samples are ignored.
    pub fn add(&mut self, sample: f64) {
        if !sample.is_finite() {
            return;
        }

        if self.arrival.len() == self.window {
            if let Some(oldest) = self.arrival.pop_front() {
                if let Ok(i) = self.position(oldest) {
                    self.sorted.remove(i);
                }
            }
        }

        self.arrival.push_back(sample);
        let i = match self.position(sample) {
            Ok(i) | Err(i) => i,
        };
        self.sorted.insert(i, sample);
    }

    /// The current median, `None` if no samples have been added.
    ///
    /// For an even number of samples the two middle values are averaged.
    pub fn median(&self) -> Option<f64> {
        let n = self.sorted.len();

        match n {
            0 => None,
            _ if n % 2 == 1 => Some(self.sorted[n / 2]),
            _ => Some((self.sorted[n / 2 - 1] + self.sorted[n / 2]) / 2.0),
        }
    }

    pub fn len(&self) -> usize {
        self.arrival.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrival.is_empty()
    }

    fn position(&self, value: f64) -> Result<usize, usize> {
        // Only finite values are stored so partial_cmp always succeeds
        self.sorted.binary_search_by(|v| {
            v.partial_cmp(&value).unwrap_or(std::cmp::Ordering::Less)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty() {
        let m = RunningMedian::new(5);
        assert_eq!(m.median(), None);
        assert!(m.is_empty());
    }

    #[test]
    fn test_rejects_spike() {
        let mut m = RunningMedian::new(5);
        for s in [10.0, 11.0, 9000.0, 10.0, 12.0].iter() {
            m.add(*s);
        }
        assert_eq!(m.median(), Some(11.0));
    }

    #[test]
    fn test_even_count() {
        let mut m = RunningMedian::new(4);
        for s in [1.0, 2.0, 3.0, 4.0].iter() {
            m.add(*s);
        }
        assert_eq!(m.median(), Some(2.5));
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut m = RunningMedian::new(3);
        for s in [100.0, 100.0, 100.0, -5.0, -5.0].iter() {
            m.add(*s);
        }
        assert_eq!(m.len(), 3);
        assert_eq!(m.median(), Some(-5.0));

        // Duplicates are evicted one at a time
        m.add(-5.0);
        assert_eq!(m.median(), Some(-5.0));
        m.add(7.0);
        m.add(7.0);
        assert_eq!(m.median(), Some(7.0));
    }

    #[test]
    fn test_ignores_nan() {
        let mut m = RunningMedian::new(3);
        m.add(std::f64::NAN);
        assert!(m.is_empty());
        m.add(1.0);
        assert_eq!(m.median(), Some(1.0));
    }
}
