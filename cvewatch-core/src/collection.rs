//! Ordered collections of indicators with score statistics

use serde::{Deserialize, Serialize};

use crate::{Indicator, IndicatorError};

/// An ordered batch of indicators
///
/// Used for reporting and for moving results between repository adapters
/// and callers. It does not own any storage beyond the vector itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorCollection {
    indicators: Vec<Indicator>,
}

impl IndicatorCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, indicator: Indicator) {
        self.indicators.push(indicator);
    }

    pub fn extend(&mut self, other: IndicatorCollection) {
        self.indicators.extend(other.indicators);
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    pub fn first(&self) -> Result<&Indicator, IndicatorError> {
        self.indicators.first().ok_or(IndicatorError::EmptyCollection)
    }

    pub fn last(&self) -> Result<&Indicator, IndicatorError> {
        self.indicators.last().ok_or(IndicatorError::EmptyCollection)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Indicator> {
        self.indicators.iter()
    }

    /// Sum of all member scores
    pub fn cumulative_score(&self) -> i64 {
        self.indicators.iter().map(|i| i.score).sum()
    }

    /// Mean member score, `None` for an empty collection
    pub fn average_score(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.cumulative_score() as f64 / self.len() as f64)
    }

    pub fn into_vec(self) -> Vec<Indicator> {
        self.indicators
    }
}

impl From<Vec<Indicator>> for IndicatorCollection {
    fn from(indicators: Vec<Indicator>) -> Self {
        Self { indicators }
    }
}

impl FromIterator<Indicator> for IndicatorCollection {
    fn from_iter<I: IntoIterator<Item = Indicator>>(iter: I) -> Self {
        Self {
            indicators: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for IndicatorCollection {
    type Item = Indicator;
    type IntoIter = std::vec::IntoIter<Indicator>;

    fn into_iter(self) -> Self::IntoIter {
        self.indicators.into_iter()
    }
}

impl<'a> IntoIterator for &'a IndicatorCollection {
    type Item = &'a Indicator;
    type IntoIter = std::slice::Iter<'a, Indicator>;

    fn into_iter(self) -> Self::IntoIter {
        self.indicators.iter()
    }
}
