//! Adam optimizer over [`MlpParams`]

use ndarray::{Array, Dimension, Zip};

use curricula_core::{RLError, Result};

use crate::network::{Mlp, MlpParams};

/// Adam optimizer state
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    momentum: Option<MlpParams>,
    velocity: Option<MlpParams>,
    t: i32,
}

impl Adam {
    /// Adam with the usual moment decay rates
    #[must_use]
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            momentum: None,
            velocity: None,
            t: 0,
        }
    }

    /// Number of steps taken so far
    #[must_use]
    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Apply one descent step with `grads` to `network`
    pub fn step(&mut self, network: &mut Mlp, grads: &MlpParams) -> Result<()> {
        let params = network.params_mut();
        if !params.same_shape(grads) {
            return Err(RLError::DimensionMismatch {
                expected: params.len(),
                actual: grads.len(),
            });
        }
        let momentum = self.momentum.get_or_insert_with(|| MlpParams::zeros_like(grads));
        let velocity = self.velocity.get_or_insert_with(|| MlpParams::zeros_like(grads));
        self.t = self.t.saturating_add(1);

        let step = AdamStep {
            lr: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            bias1: 1.0 - self.beta1.powi(self.t),
            bias2: 1.0 - self.beta2.powi(self.t),
        };
        for i in 0..params.weights.len() {
            step.apply(&mut params.weights[i], &mut momentum.weights[i], &mut velocity.weights[i], &grads.weights[i]);
            step.apply(&mut params.biases[i], &mut momentum.biases[i], &mut velocity.biases[i], &grads.biases[i]);
        }
        Ok(())
    }
}

struct AdamStep {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    bias1: f32,
    bias2: f32,
}

impl AdamStep {
    fn apply<D: Dimension>(
        &self,
        param: &mut Array<f32, D>,
        m: &mut Array<f32, D>,
        v: &mut Array<f32, D>,
        g: &Array<f32, D>,
    ) {
        Zip::from(param).and(m).and(v).and(g).for_each(|p, m, v, &g| {
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let m_hat = *m / self.bias1;
            let v_hat = *v / self.bias2;
            *p -= self.lr * m_hat / (v_hat.sqrt() + self.epsilon);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Activation, MlpConfig};
    use curricula_core::AgentRng;
    use ndarray::{arr2, Array2};

    #[test]
    fn test_descends_on_regression() {
        let config = MlpConfig {
            input_dim: 2,
            hidden_dims: vec![8],
            output_dim: 1,
            activation: Activation::Tanh,
        };
        let mut net = Mlp::new(config, &mut AgentRng::seeded(5)).unwrap();
        let mut adam = Adam::new(1e-2);
        let x = arr2(&[[0.0, 1.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]);
        let y = arr2(&[[1.0], [1.0], [0.0], [0.0]]);
        let loss = |net: &Mlp| -> f32 {
            let out = net.forward(x.view()).unwrap();
            (&out - &y).mapv(|d| d * d).mean().unwrap_or(0.0)
        };
        let initial = loss(&net);
        for _ in 0..300 {
            let cache = net.forward_cached(x.view()).unwrap();
            let grad: Array2<f32> = (&cache.output - &y) * (2.0 / 4.0);
            let grads = net.backward(&cache, &grad).unwrap();
            adam.step(&mut net, &grads).unwrap();
        }
        assert!(loss(&net) < initial);
        assert_eq!(adam.steps(), 300);
    }
}
