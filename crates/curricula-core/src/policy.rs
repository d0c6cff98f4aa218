//! Epsilon-greedy action selection with optional legal-action masks

use ndarray::Array1;
use rand::Rng;
use rand_distr::{Distribution, WeightedIndex};

use crate::{RLError, Result};

/// Shift values so that legal actions score at least 1 and illegal ones 0
///
/// `v' = (v - min(v)) * mask + mask`. The arg-max of the result is always a
/// legal action regardless of the sign or scale of the raw values.
pub fn mask_values(values: &[f64], mask: &Array1<f32>) -> Result<Vec<f64>> {
    if values.len() != mask.len() {
        return Err(RLError::DimensionMismatch {
            expected: values.len(),
            actual: mask.len(),
        });
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    Ok(values
        .iter()
        .zip(mask.iter())
        .map(|(&v, &m)| (v - min) * f64::from(m) + f64::from(m))
        .collect())
}

/// Index of the first maximal value
#[must_use]
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Epsilon-greedy selection rule
#[derive(Debug, Clone, Copy)]
pub struct EpsilonGreedy<'a> {
    /// Exploration probability
    pub epsilon: f64,
    /// Always exploit when set
    pub greedy: bool,
    /// Binary mask of legal actions
    pub legal_mask: Option<&'a Array1<f32>>,
}

impl EpsilonGreedy<'_> {
    /// Pick an action for `values`
    ///
    /// One uniform draw is always consumed so that the random stream does
    /// not depend on whether the call was greedy.
    pub fn select<R: Rng + ?Sized>(&self, values: &[f64], rng: &mut R) -> Result<usize> {
        let draw: f64 = rng.gen();
        let values = match self.legal_mask {
            Some(mask) => mask_values(values, mask)?,
            None => values.to_vec(),
        };
        if self.greedy || draw > self.epsilon {
            return Ok(argmax(&values));
        }
        match self.legal_mask {
            Some(mask) => {
                let dist = WeightedIndex::new(mask.iter().map(|&m| f64::from(m.max(0.0))))
                    .map_err(|e| RLError::Agent(format!("legal mask has no legal action: {e}")))?;
                Ok(dist.sample(rng))
            }
            None => Ok(rng.gen_range(0..values.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AgentRng;
    use ndarray::arr1;
    use proptest::prelude::*;

    #[test]
    fn test_mask_prefers_legal_even_when_negative() {
        let values = [-5.0, 10.0, -1.0];
        let mask = arr1(&[1.0, 0.0, 1.0]);
        let masked = mask_values(&values, &mask).unwrap();
        assert_eq!(masked[1], 0.0);
        assert!(masked[0] >= 1.0 && masked[2] >= 1.0);
        assert_eq!(argmax(&masked), 2);
    }

    #[test]
    fn test_exploration_respects_mask() {
        let mut rng = AgentRng::seeded(3);
        let mask = arr1(&[0.0, 1.0, 0.0, 1.0]);
        let policy = EpsilonGreedy {
            epsilon: 1.0,
            greedy: false,
            legal_mask: Some(&mask),
        };
        for _ in 0..200 {
            let action = policy.select(&[0.0; 4], &mut rng).unwrap();
            assert!(action == 1 || action == 3);
        }
    }

    #[test]
    fn test_greedy_ignores_epsilon() {
        let mut rng = AgentRng::seeded(3);
        let policy = EpsilonGreedy {
            epsilon: 1.0,
            greedy: true,
            legal_mask: None,
        };
        for _ in 0..50 {
            assert_eq!(policy.select(&[0.1, 0.7, 0.2], &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_mask_length_mismatch() {
        let mask = arr1(&[1.0, 1.0]);
        assert!(matches!(
            mask_values(&[1.0, 2.0, 3.0], &mask),
            Err(RLError::DimensionMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_masked_argmax_is_legal(
            values in proptest::collection::vec(-1e6f64..1e6, 1..12),
            seed in any::<u64>(),
        ) {
            let n = values.len();
            let mut bits: Vec<f32> = (0..n).map(|i| if (seed >> (i % 64)) & 1 == 1 { 1.0 } else { 0.0 }).collect();
            if bits.iter().all(|&b| b == 0.0) {
                bits[(seed as usize) % n] = 1.0;
            }
            let mask = Array1::from(bits);
            let masked = mask_values(&values, &mask).unwrap();
            prop_assert_eq!(mask[argmax(&masked)], 1.0);
        }
    }
}
