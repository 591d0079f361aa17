/// Running sum/count accumulator for losses and metrics.
///
/// Known oddity: the count starts at 1, not 0, so `avg()` is `sum / (n + 1)`
/// after `n` unit updates and slightly under-estimates the true mean. Existing
/// logs and thresholds were produced with this convention, so it is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct AverageMeter {
    sum: f64,
    count: u64,
}

impl Default for AverageMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl AverageMeter {
    pub fn new() -> Self {
        Self { sum: 0.0, count: 1 }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Add `sum_increment` accumulated over `count_increment` samples.
    pub fn update(&mut self, sum_increment: f64, count_increment: u64) {
        self.sum += sum_increment;
        self.count += count_increment;
    }

    pub fn update_one(&mut self, sum_increment: f64) {
        self.update(sum_increment, 1);
    }

    pub fn avg(&self) -> f64 {
        self.sum / self.count as f64
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}
