//! Numeric helpers shared by the learners

use ndarray::{Array, Dimension, Zip};

/// Polyak averaging of a single weight
#[must_use]
pub fn polyak_update(target_weight: f32, source_weight: f32, tau: f32) -> f32 {
    tau * source_weight + (1.0 - tau) * target_weight
}

/// Polyak averaging of a whole tensor in place
pub fn polyak_update_array<D: Dimension>(target: &mut Array<f32, D>, source: &Array<f32, D>, tau: f32) {
    Zip::from(target)
        .and(source)
        .for_each(|t, &s| *t = polyak_update(*t, s, tau));
}

/// Discounted returns of one episode
///
/// `bootstrap` is the value estimate after the last transition; it is
/// ignored when the episode ended in a terminal state.
#[must_use]
pub fn discounted_returns(rewards: &[f64], gamma: f64, terminal: bool, bootstrap: f64) -> Vec<f64> {
    let mut returns = vec![0.0; rewards.len()];
    let mut running = if terminal { 0.0 } else { bootstrap };
    for i in (0..rewards.len()).rev() {
        running = rewards[i] + gamma * running;
        returns[i] = running;
    }
    returns
}

/// Standardise values to zero mean and unit variance
pub fn normalize(values: &mut [f64]) {
    if values.len() < 2 {
        return;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt() + 1e-8;
    for v in values {
        *v = (*v - mean) / std;
    }
}

/// Softmax restricted to legal actions; illegal actions get probability 0
#[must_use]
pub fn masked_softmax(logits: &[f64], mask: Option<&[f32]>) -> Vec<f64> {
    let legal = |i: usize| mask.map_or(true, |m| m.get(i).copied().unwrap_or(0.0) > 0.0);
    let max = logits
        .iter()
        .enumerate()
        .filter(|(i, _)| legal(*i))
        .map(|(_, &l)| l)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits
        .iter()
        .enumerate()
        .map(|(i, &l)| if legal(i) { (l - max).exp() } else { 0.0 })
        .collect();
    let sum: f64 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.into_iter().map(|e| e / sum).collect()
    } else {
        exps
    }
}
