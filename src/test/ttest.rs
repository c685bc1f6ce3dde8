//! Two-sample t-tests under pooled or unequal variance.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Variance assumption of the two-sample test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceModel {
    /// Student's t-test with pooled variance.
    #[default]
    Pooled,
    /// Welch's t-test with Welch-Satterthwaite degrees of freedom.
    Welch,
}

impl std::str::FromStr for VarianceModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pooled" | "equal" => Ok(Self::Pooled),
            "welch" | "unequal" => Ok(Self::Welch),
            other => Err(format!("unknown variance model '{}'", other)),
        }
    }
}

/// Result of a two-sample test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TTestResult {
    /// t statistic of `a - b`.
    pub statistic: f64,
    /// Degrees of freedom.
    pub df: f64,
    /// Two-sided p-value; NaN when the test is undefined.
    pub p_value: f64,
}

impl TTestResult {
    fn undefined() -> Self {
        Self {
            statistic: f64::NAN,
            df: f64::NAN,
            p_value: f64::NAN,
        }
    }

    /// Check whether a p-value was computed.
    pub fn is_defined(&self) -> bool {
        !self.p_value.is_nan()
    }
}

/// Two-sided independent-samples t-test of `a` against `b`.
///
/// Non-finite samples are ignored. Fewer than two samples on either side
/// gives an undefined result. When both sides have zero variance the
/// p-value is 0 for different means and undefined for equal means.
pub fn t_test(a: &[f64], b: &[f64], model: VarianceModel) -> TTestResult {
    let a: Vec<f64> = a.iter().copied().filter(|v| v.is_finite()).collect();
    let b: Vec<f64> = b.iter().copied().filter(|v| v.is_finite()).collect();
    if a.len() < 2 || b.len() < 2 {
        return TTestResult::undefined();
    }

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (m1, v1) = mean_var(&a);
    let (m2, v2) = mean_var(&b);

    let (se, df) = match model {
        VarianceModel::Pooled => {
            let df = n1 + n2 - 2.0;
            let pooled = ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / df;
            ((pooled * (1.0 / n1 + 1.0 / n2)).sqrt(), df)
        }
        VarianceModel::Welch => {
            let (s1, s2) = (v1 / n1, v2 / n2);
            let df = (s1 + s2).powi(2) / (s1.powi(2) / (n1 - 1.0) + s2.powi(2) / (n2 - 1.0));
            ((s1 + s2).sqrt(), df)
        }
    };

    let diff = m1 - m2;
    if se == 0.0 {
        if diff == 0.0 {
            return TTestResult::undefined();
        }
        return TTestResult {
            statistic: diff.signum() * f64::INFINITY,
            df,
            p_value: 0.0,
        };
    }

    let statistic = diff / se;
    let p_value = StudentsT::new(0.0, 1.0, df)
        .map(|dist| (2.0 * dist.sf(statistic.abs())).min(1.0))
        .unwrap_or(f64::NAN);

    TTestResult {
        statistic,
        df,
        p_value,
    }
}

/// Mean and sample variance (ddof = 1).
fn mean_var(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pooled_known_values() {
        let r = t_test(&[9.0, 10.0, 11.0], &[4.0, 5.0, 6.0], VarianceModel::Pooled);
        assert_relative_eq!(r.statistic, 6.123724356957945, epsilon = 1e-10);
        assert_relative_eq!(r.df, 4.0);
        assert_relative_eq!(r.p_value, 0.0036022326091040007, epsilon = 1e-8);
    }

    #[test]
    fn test_pooled_vs_welch_unequal_sizes() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 6.0, 8.0, 10.0, 12.0];

        let pooled = t_test(&a, &b, VarianceModel::Pooled);
        assert_relative_eq!(pooled.statistic, -2.215646837627989, epsilon = 1e-10);
        assert_relative_eq!(pooled.p_value, 0.053945920509407025, epsilon = 1e-8);

        let welch = t_test(&a, &b, VarianceModel::Welch);
        assert_relative_eq!(welch.statistic, -2.3763541031440183, epsilon = 1e-10);
        assert_relative_eq!(welch.df, 6.9722557297949335, epsilon = 1e-10);
        assert_relative_eq!(welch.p_value, 0.04928433820673054, epsilon = 1e-8);
    }

    #[test]
    fn test_symmetry() {
        let a = [10.0, 12.0, 11.0, 13.0];
        let b = [5.0, 5.5, 6.0, 4.0];
        let ab = t_test(&a, &b, VarianceModel::Welch);
        let ba = t_test(&b, &a, VarianceModel::Welch);
        assert_relative_eq!(ab.statistic, -ba.statistic, epsilon = 1e-12);
        assert_relative_eq!(ab.p_value, ba.p_value, epsilon = 1e-12);
        assert_relative_eq!(ab.p_value, 0.00035441345618038165, epsilon = 1e-8);
    }

    #[test]
    fn test_insufficient_samples() {
        assert!(!t_test(&[1.0], &[2.0, 3.0], VarianceModel::Pooled).is_defined());
        assert!(!t_test(&[1.0, f64::NAN], &[2.0, 3.0], VarianceModel::Pooled).is_defined());
    }

    #[test]
    fn test_zero_variance() {
        let separated = t_test(&[10.0, 10.0, 10.0], &[5.0, 5.0, 5.0], VarianceModel::Pooled);
        assert_eq!(separated.p_value, 0.0);
        assert!(separated.statistic.is_infinite());

        let equal = t_test(&[5.0, 5.0], &[5.0, 5.0], VarianceModel::Welch);
        assert!(!equal.is_defined());
    }

    #[test]
    fn test_parse_variance_model() {
        assert_eq!("unequal".parse::<VarianceModel>().unwrap(), VarianceModel::Welch);
        assert_eq!("pooled".parse::<VarianceModel>().unwrap(), VarianceModel::Pooled);
    }
}
