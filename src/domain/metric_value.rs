//! Tagged numeric results for metrics that can divide by zero.

use serde::Serialize;
use std::fmt;

/// A metric that is either a finite number, positively unbounded, or not defined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Defined(f64),
    Infinite,
    Undefined,
}

impl MetricValue {
    /// `numerator / denominator`, `Undefined` when the denominator is zero.
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            MetricValue::Undefined
        } else {
            MetricValue::Defined(numerator / denominator)
        }
    }

    /// Ratio of two non-negative magnitudes: `Infinite` for `x / 0` with `x > 0`.
    pub fn unbounded_ratio(numerator: f64, denominator: f64) -> Self {
        if denominator > 0.0 {
            MetricValue::Defined(numerator / denominator)
        } else if numerator > 0.0 {
            MetricValue::Infinite
        } else {
            MetricValue::Undefined
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Defined(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, MetricValue::Defined(_))
    }

    pub fn at_least(&self, threshold: f64) -> bool {
        match self {
            MetricValue::Defined(v) => *v >= threshold,
            MetricValue::Infinite => true,
            MetricValue::Undefined => false,
        }
    }

    pub fn at_most(&self, threshold: f64) -> bool {
        match self {
            MetricValue::Defined(v) => *v <= threshold,
            MetricValue::Infinite | MetricValue::Undefined => false,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Defined(v) => write!(f, "{v:.4}"),
            MetricValue::Infinite => write!(f, "inf"),
            MetricValue::Undefined => write!(f, "undefined"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_with_zero_denominator_is_undefined() {
        assert_eq!(MetricValue::ratio(5.0, 0.0), MetricValue::Undefined);
        assert_eq!(MetricValue::ratio(5.0, 2.0), MetricValue::Defined(2.5));
    }

    #[test]
    fn unbounded_ratio_cases() {
        assert_eq!(MetricValue::unbounded_ratio(35.0, 0.0), MetricValue::Infinite);
        assert_eq!(MetricValue::unbounded_ratio(0.0, 0.0), MetricValue::Undefined);
        assert_eq!(MetricValue::unbounded_ratio(30.0, 10.0), MetricValue::Defined(3.0));
    }

    #[test]
    fn comparisons_treat_sentinels_explicitly() {
        assert!(MetricValue::Infinite.at_least(1.5));
        assert!(!MetricValue::Infinite.at_most(1.5));
        assert!(!MetricValue::Undefined.at_least(0.0));
        assert!(!MetricValue::Undefined.at_most(0.0));
        assert!(MetricValue::Defined(1.5).at_least(1.5));
        assert!(MetricValue::Defined(1.5).at_most(1.5));
    }

    #[test]
    fn serializes_as_tagged_value() {
        let json = serde_json::to_string(&MetricValue::Defined(2.0)).unwrap();
        assert_eq!(json, r#"{"kind":"defined","value":2.0}"#);
        let json = serde_json::to_string(&MetricValue::Infinite).unwrap();
        assert_eq!(json, r#"{"kind":"infinite"}"#);
    }
}
