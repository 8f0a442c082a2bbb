//! Window reductions: mean and first/last variation

/// Reduced view of one window of readings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationWindow {
    /// Mean of all values
    pub check_value: f64,
    /// `|last - first|` of the ordered values
    pub variation: f64,
}

/// Streaming accumulator over ordered values of a single measurement kind
#[derive(Debug, Clone, Default)]
pub struct WindowAccumulator {
    sum: f64,
    count: usize,
    first: Option<f64>,
    last: Option<f64>,
}

impl WindowAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next value in timestamp order
    pub fn accumulate(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        if self.first.is_none() {
            self.first = Some(value);
        }
        self.last = Some(value);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    pub fn variation(&self) -> Option<f64> {
        match (self.first, self.last) {
            (Some(first), Some(last)) => Some((last - first).abs()),
            _ => None,
        }
    }

    /// Both reductions, or `None` for an empty window
    pub fn finish(&self) -> Option<EvaluationWindow> {
        Some(EvaluationWindow {
            check_value: self.mean()?,
            variation: self.variation()?,
        })
    }
}

impl FromIterator<f64> for WindowAccumulator {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = Self::new();
        for value in iter {
            acc.accumulate(value);
        }
        acc
    }
}

/// Arithmetic mean; `None` when `values` is empty
pub fn mean(values: &[f64]) -> Option<f64> {
    values.iter().copied().collect::<WindowAccumulator>().mean()
}

/// Absolute difference between the last and first value; `None` when empty
pub fn variation(values: &[f64]) -> Option<f64> {
    Some((values.last()? - values.first()?).abs())
}
