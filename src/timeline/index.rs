// Sorted timestamp lookup
// Binary-search primitive shared by window queries, click lookup and annotation

/// Read-only view over a non-decreasing timestamp slice
#[derive(Debug, Clone, Copy)]
pub struct TimeIndex<'a> {
    timestamps: &'a [f64],
}

impl<'a> TimeIndex<'a> {
    pub fn new(timestamps: &'a [f64]) -> Self {
        TimeIndex { timestamps }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Insertion point of `t`: every entry left of the result is `< t`.
    /// Result lies in `[0, N]`.
    pub fn insertion_point(&self, t: f64) -> usize {
        self.timestamps.partition_point(|&x| x < t)
    }

    /// Insertion point clamped to a valid index `[0, N-1]`
    pub fn clamped(&self, t: f64) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        Some(self.insertion_point(t).min(self.len() - 1))
    }

    /// Index of the sample closest in time to `t` (earlier sample wins ties)
    pub fn nearest(&self, t: f64) -> Option<usize> {
        let right = self.clamped(t)?;
        if right == 0 {
            return Some(0);
        }
        let left = right - 1;
        if (t - self.timestamps[left]).abs() <= (self.timestamps[right] - t).abs() {
            Some(left)
        } else {
            Some(right)
        }
    }

    /// Last sample with timestamp `<= t`
    pub fn last_at_or_before(&self, t: f64) -> Option<usize> {
        let after = self.timestamps.partition_point(|&x| x <= t);
        after.checked_sub(1)
    }

    /// First sample with timestamp `>= t`
    pub fn first_at_or_after(&self, t: f64) -> Option<usize> {
        let idx = self.insertion_point(t);
        (idx < self.len()).then_some(idx)
    }
}
