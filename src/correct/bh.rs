//! Benjamini-Hochberg and Benjamini-Yekutieli false discovery rate correction.

/// Apply Benjamini-Hochberg FDR correction.
///
/// The BH procedure controls the false discovery rate (FDR) at level α.
/// For each p-value, the adjusted p-value (q-value) is calculated as:
/// q[i] = min(p[i] * n / rank[i], q[i+1])
///
/// Undefined (NaN) p-values do not count as tests and map to NaN.
///
/// # Arguments
/// * `p_values` - Raw p-values
///
/// # Returns
/// Adjusted p-values in the input order.
pub fn correct_bh(p_values: &[f64]) -> Vec<f64> {
    step_up(p_values, 1.0)
}

/// Apply Benjamini-Yekutieli FDR correction.
///
/// Like BH but valid under arbitrary dependence: every adjusted value is
/// further multiplied by the harmonic sum c(n) = Σ 1/i.
pub fn correct_by(p_values: &[f64]) -> Vec<f64> {
    let n = p_values.iter().filter(|p| !p.is_nan()).count();
    let c_n: f64 = (1..=n).map(|i| 1.0 / i as f64).sum();
    step_up(p_values, c_n.max(1.0))
}

fn step_up(p_values: &[f64], penalty: f64) -> Vec<f64> {
    let mut q_values = vec![f64::NAN; p_values.len()];

    // Create sorted index of defined p-values
    let mut indices: Vec<usize> = (0..p_values.len())
        .filter(|&i| !p_values[i].is_nan())
        .collect();
    let n = indices.len();
    if n == 0 {
        return q_values;
    }
    indices.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let n_f64 = n as f64;
    let mut q_sorted = vec![0.0; n];

    // Start from largest p-value
    q_sorted[n - 1] = (p_values[indices[n - 1]] * penalty).min(1.0);

    // Work backwards
    for i in (0..n - 1).rev() {
        let rank = i + 1;
        let adjusted = p_values[indices[i]] * penalty * n_f64 / rank as f64;
        q_sorted[i] = adjusted.min(q_sorted[i + 1]).min(1.0);
    }

    // Restore original order
    for (i, &orig_idx) in indices.iter().enumerate() {
        q_values[orig_idx] = q_sorted[i];
    }
    q_values
}
