//! Statistical hypothesis testing for differential quantification.

pub mod ttest;

pub use ttest::{t_test, TTestResult, VarianceModel};
