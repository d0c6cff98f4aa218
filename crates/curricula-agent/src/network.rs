//! Multi-layer perceptron function approximator
//!
//! A small dense network on `ndarray` with explicit backpropagation. Layers
//! store weights as `(in, out)` matrices, so a batch of inputs shaped
//! `(n, in)` maps to outputs shaped `(n, out)`.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use curricula_core::{RLError, Result};

use crate::utils::polyak_update_array;

/// Hidden-layer nonlinearity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// max(0, x)
    Relu,
    /// tanh(x)
    Tanh,
    /// x
    Identity,
}

impl Activation {
    fn apply(self, x: &mut Array2<f32>) {
        match self {
            Self::Relu => x.mapv_inplace(|v| v.max(0.0)),
            Self::Tanh => x.mapv_inplace(f32::tanh),
            Self::Identity => {}
        }
    }

    /// Derivative expressed through the activated output
    fn derivative(self, activated: f32) -> f32 {
        match self {
            Self::Relu => {
                if activated > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Tanh => 1.0 - activated * activated,
            Self::Identity => 1.0,
        }
    }
}

/// Network architecture; doubles as the architecture identifier in checkpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MlpConfig {
    /// Input dimension
    pub input_dim: usize,
    /// Hidden layer sizes
    pub hidden_dims: Vec<usize>,
    /// Output dimension
    pub output_dim: usize,
    /// Activation function for hidden layers
    pub activation: Activation,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            input_dim: 4,
            hidden_dims: vec![64, 64],
            output_dim: 2,
            activation: Activation::Relu,
        }
    }
}

/// Parameter set of an [`Mlp`]; also used for gradients and optimizer moments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpParams {
    /// Weights for each layer, `(in, out)`
    pub weights: Vec<Array2<f32>>,
    /// Biases for each layer
    pub biases: Vec<Array1<f32>>,
}

impl MlpParams {
    /// Same shapes, all zeros
    #[must_use]
    pub fn zeros_like(other: &Self) -> Self {
        Self {
            weights: other.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            biases: other.biases.iter().map(|b| Array1::zeros(b.raw_dim())).collect(),
        }
    }

    /// Whether both parameter sets have identical layer shapes
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.weights.len() == other.weights.len()
            && self.biases.len() == other.biases.len()
            && self.weights.iter().zip(&other.weights).all(|(a, b)| a.dim() == b.dim())
            && self.biases.iter().zip(&other.biases).all(|(a, b)| a.dim() == b.dim())
    }

    /// Total number of scalars
    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.iter().map(Array2::len).sum::<usize>() + self.biases.iter().map(Array1::len).sum::<usize>()
    }

    /// Whether there are no parameters at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Intermediate activations kept for the backward pass
#[derive(Debug, Clone)]
pub struct ForwardCache {
    /// Input to every layer; `inputs[0]` is the network input
    inputs: Vec<Array2<f32>>,
    /// Network output
    pub output: Array2<f32>,
}

/// Dense feed-forward network
#[derive(Debug, Clone)]
pub struct Mlp {
    config: MlpConfig,
    params: MlpParams,
}

impl Mlp {
    /// Create a network with Xavier-uniform weights drawn from `rng`
    pub fn new<R: Rng + ?Sized>(config: MlpConfig, rng: &mut R) -> Result<Self> {
        if config.input_dim == 0 || config.output_dim == 0 || config.hidden_dims.contains(&0) {
            return Err(RLError::InvalidConfig(format!(
                "network layers must be non-empty: {config:?}"
            )));
        }
        let mut weights = Vec::new();
        let mut biases = Vec::new();
        let mut prev_dim = config.input_dim;
        for &dim in config.hidden_dims.iter().chain(std::iter::once(&config.output_dim)) {
            weights.push(Self::xavier_init(prev_dim, dim, rng));
            biases.push(Array1::zeros(dim));
            prev_dim = dim;
        }
        Ok(Self {
            config,
            params: MlpParams { weights, biases },
        })
    }

    fn xavier_init<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, rng: &mut R) -> Array2<f32> {
        let limit = (6.0 / (in_dim + out_dim) as f32).sqrt();
        let dist = Uniform::new(-limit, limit);
        Array2::from_shape_fn((in_dim, out_dim), |_| dist.sample(&mut *rng))
    }

    /// Architecture of this network
    #[must_use]
    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    /// Current parameters
    #[must_use]
    pub fn params(&self) -> &MlpParams {
        &self.params
    }

    /// Mutable parameters (optimizer access)
    pub fn params_mut(&mut self) -> &mut MlpParams {
        &mut self.params
    }

    /// Replace all parameters; shapes must match the architecture
    pub fn set_params(&mut self, params: MlpParams) -> Result<()> {
        if !self.params.same_shape(&params) {
            return Err(RLError::DimensionMismatch {
                expected: self.params.len(),
                actual: params.len(),
            });
        }
        self.params = params;
        Ok(())
    }

    /// Batched forward pass
    pub fn forward(&self, input: ArrayView2<f32>) -> Result<Array2<f32>> {
        Ok(self.forward_cached(input)?.output)
    }

    /// Forward pass for a single observation
    pub fn forward_one(&self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        let batch = input.insert_axis(Axis(0));
        let output = self.forward(batch)?;
        Ok(output.index_axis_move(Axis(0), 0))
    }

    /// Batched forward pass that keeps what [`Mlp::backward`] needs
    pub fn forward_cached(&self, input: ArrayView2<f32>) -> Result<ForwardCache> {
        if input.ncols() != self.config.input_dim {
            return Err(RLError::DimensionMismatch {
                expected: self.config.input_dim,
                actual: input.ncols(),
            });
        }
        let n_layers = self.params.weights.len();
        let mut inputs = Vec::with_capacity(n_layers);
        let mut hidden = input.to_owned();
        for (i, (w, b)) in self.params.weights.iter().zip(&self.params.biases).enumerate() {
            let mut z = hidden.dot(w) + b;
            if i + 1 < n_layers {
                self.config.activation.apply(&mut z);
            }
            inputs.push(hidden);
            hidden = z;
        }
        Ok(ForwardCache { inputs, output: hidden })
    }

    /// Gradients of a loss with respect to every parameter
    ///
    /// `grad_output` is dLoss/dOutput for the batch in `cache`.
    pub fn backward(&self, cache: &ForwardCache, grad_output: &Array2<f32>) -> Result<MlpParams> {
        if grad_output.dim() != cache.output.dim() {
            return Err(RLError::DimensionMismatch {
                expected: cache.output.len(),
                actual: grad_output.len(),
            });
        }
        let mut grads = MlpParams::zeros_like(&self.params);
        let mut delta = grad_output.clone();
        for layer in (0..self.params.weights.len()).rev() {
            let layer_input = &cache.inputs[layer];
            grads.weights[layer] = layer_input.t().dot(&delta);
            grads.biases[layer] = delta.sum_axis(Axis(0));
            if layer > 0 {
                let activation = self.config.activation;
                let mut upstream = delta.dot(&self.params.weights[layer].t());
                upstream.zip_mut_with(layer_input, |g, &a| *g *= activation.derivative(a));
                delta = upstream;
            }
        }
        Ok(grads)
    }

    /// Move every parameter a fraction `tau` toward `source`
    pub fn soft_update_from(&mut self, source: &Mlp, tau: f32) -> Result<()> {
        if !self.params.same_shape(&source.params) {
            return Err(RLError::DimensionMismatch {
                expected: self.params.len(),
                actual: source.params.len(),
            });
        }
        for (t, s) in self.params.weights.iter_mut().zip(&source.params.weights) {
            polyak_update_array(t, s, tau);
        }
        for (t, s) in self.params.biases.iter_mut().zip(&source.params.biases) {
            polyak_update_array(t, s, tau);
        }
        Ok(())
    }
}
