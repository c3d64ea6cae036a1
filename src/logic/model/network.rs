//! Autoencoder Network
//!
//! Symmetric dense encoder/decoder on `ndarray`. Layers are plain data
//! (serializable); training-time activations live in a separate cache so
//! the eval path stays `&self` and can be shared across threads.
//!
//! ```text
//! encoder: D → [Linear → ReLU → BatchNorm → Dropout] × hidden → Linear → latent
//! decoder: latent → [Linear → ReLU → BatchNorm → Dropout] × hidden.rev() → Linear → D
//! ```

use ndarray::{Array1, Array2, ArrayD, ArrayView2, ArrayViewMutD, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, DetectorResult};

/// Running-statistics momentum (PyTorch convention)
const BN_MOMENTUM: f32 = 0.1;
const BN_EPSILON: f32 = 1e-5;

// ============================================================================
// ARCHITECTURE
// ============================================================================

/// Layer widths and dropout rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    /// Encoder hidden widths; the decoder mirrors them
    pub hidden: Vec<usize>,
    /// Bottleneck width
    pub latent: usize,
    /// Dropout per hidden block (encoder order)
    pub dropout: Vec<f32>,
}

impl Default for Architecture {
    fn default() -> Self {
        Self {
            hidden: vec![512, 256, 128, 64],
            latent: 32,
            dropout: vec![0.2, 0.15, 0.1, 0.0],
        }
    }
}

impl Architecture {
    /// Small network for tests and quick experiments
    pub fn compact() -> Self {
        Self {
            hidden: vec![32, 16],
            latent: 8,
            dropout: vec![0.0, 0.0],
        }
    }

    pub fn validate(&self) -> DetectorResult<()> {
        if self.hidden.is_empty() || self.latent == 0 || self.hidden.contains(&0) {
            return Err(DetectorError::DegenerateInput(
                "architecture needs at least one non-empty hidden layer and a latent width".to_string(),
            ));
        }
        if self.dropout.len() != self.hidden.len() {
            return Err(DetectorError::DimensionMismatch {
                expected: self.hidden.len(),
                actual: self.dropout.len(),
            });
        }
        if self.dropout.iter().any(|p| !(0.0..1.0).contains(p)) {
            return Err(DetectorError::DegenerateInput(
                "dropout rates must be in [0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// LAYERS
// ============================================================================

/// Fully connected layer, `y = x·W + b` with `W: (in, out)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
}

impl Dense {
    /// U(-1/sqrt(in), 1/sqrt(in)) for both weight and bias
    fn init(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let bound = 1.0 / (inputs as f32).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);
        let weight = Array2::from_shape_fn((inputs, outputs), |_| dist.sample(rng));
        let bias = Array1::from_shape_fn(outputs, |_| dist.sample(rng));
        Self { weight, bias }
    }
}

/// Batch normalization over the batch axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNorm {
    pub gamma: Array1<f32>,
    pub beta: Array1<f32>,
    pub running_mean: Array1<f32>,
    pub running_var: Array1<f32>,
}

impl BatchNorm {
    fn new(width: usize) -> Self {
        Self {
            gamma: Array1::ones(width),
            beta: Array1::zeros(width),
            running_mean: Array1::zeros(width),
            running_var: Array1::ones(width),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layer {
    Dense(Dense),
    Relu,
    BatchNorm(BatchNorm),
    Dropout { rate: f32 },
}

/// Activations kept from a training forward pass
#[derive(Debug)]
enum LayerCache {
    Dense { input: Array2<f32> },
    Relu { mask: Array2<f32> },
    BatchNorm { normalized: Array2<f32>, inv_std: Array1<f32> },
    Dropout { mask: Array2<f32> },
}

impl Layer {
    fn forward(&self, x: Array2<f32>) -> Array2<f32> {
        match self {
            Layer::Dense(d) => x.dot(&d.weight) + &d.bias,
            Layer::Relu => x.mapv_into(|v| v.max(0.0)),
            Layer::BatchNorm(bn) => {
                let inv_std = bn.running_var.mapv(|v| 1.0 / (v + BN_EPSILON).sqrt());
                (x - &bn.running_mean) * &inv_std * &bn.gamma + &bn.beta
            }
            Layer::Dropout { .. } => x,
        }
    }

    fn forward_train(&mut self, x: Array2<f32>, rng: &mut StdRng) -> (Array2<f32>, LayerCache) {
        match self {
            Layer::Dense(d) => {
                let y = x.dot(&d.weight) + &d.bias;
                (y, LayerCache::Dense { input: x })
            }
            Layer::Relu => {
                let mask = x.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                (x * &mask, LayerCache::Relu { mask })
            }
            Layer::BatchNorm(bn) => {
                let n = x.nrows() as f32;
                let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
                let centered = &x - &mean;
                let var = centered.mapv(|v| v * v).sum_axis(Axis(0)) / n;
                let inv_std = var.mapv(|v| 1.0 / (v + BN_EPSILON).sqrt());
                let normalized = centered * &inv_std;
                let y = &normalized * &bn.gamma + &bn.beta;

                let unbiased = if n > 1.0 { &var * (n / (n - 1.0)) } else { var.clone() };
                bn.running_mean = &bn.running_mean * (1.0 - BN_MOMENTUM) + &(mean * BN_MOMENTUM);
                bn.running_var = &bn.running_var * (1.0 - BN_MOMENTUM) + &(unbiased * BN_MOMENTUM);

                (y, LayerCache::BatchNorm { normalized, inv_std })
            }
            Layer::Dropout { rate } => {
                let keep = 1.0 - *rate;
                let mask = Array2::from_shape_fn(x.raw_dim(), |_| {
                    if rng.gen::<f32>() < keep { 1.0 / keep } else { 0.0 }
                });
                (x * &mask, LayerCache::Dropout { mask })
            }
        }
    }

    /// Returns the input gradient and this layer's parameter gradients
    fn backward(&self, grad: Array2<f32>, cache: LayerCache) -> (Array2<f32>, Vec<ArrayD<f32>>) {
        match (self, cache) {
            (Layer::Dense(d), LayerCache::Dense { input }) => {
                let d_weight = input.t().dot(&grad);
                let d_bias = grad.sum_axis(Axis(0));
                let d_input = grad.dot(&d.weight.t());
                (d_input, vec![d_weight.into_dyn(), d_bias.into_dyn()])
            }
            (Layer::Relu, LayerCache::Relu { mask }) => (grad * &mask, Vec::new()),
            (Layer::BatchNorm(bn), LayerCache::BatchNorm { normalized, inv_std }) => {
                let n = grad.nrows() as f32;
                let d_gamma = (&grad * &normalized).sum_axis(Axis(0));
                let d_beta = grad.sum_axis(Axis(0));
                let d_norm = grad * &bn.gamma;
                let sum_d = d_norm.sum_axis(Axis(0));
                let sum_dx = (&d_norm * &normalized).sum_axis(Axis(0));
                let d_input = ((d_norm * n) - &sum_d - &(&normalized * &sum_dx)) * &(inv_std / n);
                (d_input, vec![d_gamma.into_dyn(), d_beta.into_dyn()])
            }
            (Layer::Dropout { .. }, LayerCache::Dropout { mask }) => (grad * &mask, Vec::new()),
            // caches are produced by the same layer list, in order
            (_, _) => unreachable!("layer/cache mismatch"),
        }
    }

    fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        match self {
            Layer::Dense(d) => vec![d.weight.view_mut().into_dyn(), d.bias.view_mut().into_dyn()],
            Layer::BatchNorm(bn) => vec![bn.gamma.view_mut().into_dyn(), bn.beta.view_mut().into_dyn()],
            Layer::Relu | Layer::Dropout { .. } => Vec::new(),
        }
    }

    /// Weights and batch-norm statistics are all finite
    fn is_finite(&self) -> bool {
        match self {
            Layer::Dense(d) => d.weight.iter().chain(d.bias.iter()).all(|v| v.is_finite()),
            Layer::BatchNorm(bn) => bn
                .gamma
                .iter()
                .chain(bn.beta.iter())
                .chain(bn.running_mean.iter())
                .chain(bn.running_var.iter())
                .all(|v| v.is_finite()),
            Layer::Relu | Layer::Dropout { .. } => true,
        }
    }

    fn parameter_count(&self) -> usize {
        match self {
            Layer::Dense(d) => d.weight.len() + d.bias.len(),
            Layer::BatchNorm(bn) => bn.gamma.len() + bn.beta.len(),
            Layer::Relu | Layer::Dropout { .. } => 0,
        }
    }
}

// ============================================================================
// SEQUENTIAL STACK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sequential {
    pub layers: Vec<Layer>,
}

impl Sequential {
    /// `Linear → ReLU → BatchNorm → Dropout` per width, then a final Linear
    fn blocks(input: usize, widths: &[usize], dropout: &[f32], output: usize, rng: &mut StdRng) -> Self {
        let mut layers = Vec::new();
        let mut prev = input;
        for (&width, &rate) in widths.iter().zip(dropout) {
            layers.push(Layer::Dense(Dense::init(prev, width, rng)));
            layers.push(Layer::Relu);
            layers.push(Layer::BatchNorm(BatchNorm::new(width)));
            if rate > 0.0 {
                layers.push(Layer::Dropout { rate });
            }
            prev = width;
        }
        layers.push(Layer::Dense(Dense::init(prev, output, rng)));
        Self { layers }
    }

    pub fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        self.layers.iter().fold(x.to_owned(), |acc, layer| layer.forward(acc))
    }

    fn forward_train(&mut self, x: Array2<f32>, rng: &mut StdRng) -> (Array2<f32>, Vec<LayerCache>) {
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut out = x;
        for layer in self.layers.iter_mut() {
            let (y, cache) = layer.forward_train(out, rng);
            caches.push(cache);
            out = y;
        }
        (out, caches)
    }

    /// Parameter gradients come back in `params_mut` order
    fn backward(&self, grad: Array2<f32>, caches: Vec<LayerCache>) -> (Array2<f32>, Vec<ArrayD<f32>>) {
        let mut per_layer = Vec::with_capacity(self.layers.len());
        let mut grad = grad;
        for (layer, cache) in self.layers.iter().zip(caches).rev() {
            let (g, params) = layer.backward(grad, cache);
            per_layer.push(params);
            grad = g;
        }
        per_layer.reverse();
        (grad, per_layer.into_iter().flatten().collect())
    }

    fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        self.layers.iter_mut().flat_map(|l| l.params_mut()).collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// Walk the layers from `input` width; returns the output width
    fn validate_chain(&self, input: usize) -> DetectorResult<usize> {
        let mut width = input;
        for (i, layer) in self.layers.iter().enumerate() {
            match layer {
                Layer::Dense(d) => {
                    if d.weight.nrows() != width {
                        return Err(DetectorError::DimensionMismatch { expected: width, actual: d.weight.nrows() });
                    }
                    if d.bias.len() != d.weight.ncols() {
                        return Err(DetectorError::DimensionMismatch {
                            expected: d.weight.ncols(),
                            actual: d.bias.len(),
                        });
                    }
                    width = d.weight.ncols();
                }
                Layer::BatchNorm(bn) => {
                    for len in [bn.gamma.len(), bn.beta.len(), bn.running_mean.len(), bn.running_var.len()] {
                        if len != width {
                            return Err(DetectorError::DimensionMismatch { expected: width, actual: len });
                        }
                    }
                    if bn.running_var.iter().any(|v| *v < 0.0) {
                        return Err(DetectorError::DegenerateInput(format!(
                            "layer {i}: negative batch-norm running variance"
                        )));
                    }
                }
                Layer::Dropout { rate } if !(0.0..1.0).contains(rate) => {
                    return Err(DetectorError::DegenerateInput(format!("layer {i}: dropout rate {rate}")));
                }
                Layer::Relu | Layer::Dropout { .. } => {}
            }
            if !layer.is_finite() {
                return Err(DetectorError::DegenerateInput(format!("layer {i}: non-finite parameter")));
            }
        }
        Ok(width)
    }
}

// ============================================================================
// AUTOENCODER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Autoencoder {
    input_dim: usize,
    architecture: Architecture,
    encoder: Sequential,
    decoder: Sequential,
}

/// One training step's output
#[derive(Debug)]
pub struct StepOutput {
    pub loss: f32,
    pub gradients: Vec<ArrayD<f32>>,
}

impl Autoencoder {
    /// Build with freshly initialised weights
    pub fn new(input_dim: usize, architecture: &Architecture, seed: u64) -> DetectorResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::with_rng(input_dim, architecture, &mut rng)
    }

    pub fn with_rng(input_dim: usize, architecture: &Architecture, rng: &mut StdRng) -> DetectorResult<Self> {
        if input_dim == 0 {
            return Err(DetectorError::DimensionMismatch { expected: 1, actual: 0 });
        }
        architecture.validate()?;

        let encoder = Sequential::blocks(
            input_dim,
            &architecture.hidden,
            &architecture.dropout,
            architecture.latent,
            rng,
        );
        let widths: Vec<usize> = architecture.hidden.iter().rev().copied().collect();
        let rates: Vec<f32> = architecture.dropout.iter().rev().copied().collect();
        let decoder = Sequential::blocks(architecture.latent, &widths, &rates, input_dim, rng);

        Ok(Self {
            input_dim,
            architecture: architecture.clone(),
            encoder,
            decoder,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    pub fn parameter_count(&self) -> usize {
        self.encoder.parameter_count() + self.decoder.parameter_count()
    }

    /// Structural check after deserialization: every layer must accept the
    /// previous layer's width and hold finite parameters.
    pub fn validate(&self) -> DetectorResult<()> {
        self.architecture.validate()?;
        let latent = self.encoder.validate_chain(self.input_dim)?;
        if latent != self.architecture.latent {
            return Err(DetectorError::DimensionMismatch { expected: self.architecture.latent, actual: latent });
        }
        let output = self.decoder.validate_chain(latent)?;
        if output != self.input_dim {
            return Err(DetectorError::DimensionMismatch { expected: self.input_dim, actual: output });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Eval mode (dropout off, running batch-norm statistics)
    // ------------------------------------------------------------------------

    pub fn encode(&self, x: ArrayView2<f32>) -> Array2<f32> {
        self.encoder.forward(x)
    }

    pub fn decode(&self, z: ArrayView2<f32>) -> Array2<f32> {
        self.decoder.forward(z)
    }

    pub fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let z = self.encode(x);
        self.decode(z.view())
    }

    /// Per-row mean squared reconstruction error
    pub fn reconstruction_errors(&self, x: ArrayView2<f32>) -> Array1<f32> {
        let recon = self.forward(x);
        let diff = recon - &x;
        diff.mapv(|v| v * v)
            .mean_axis(Axis(1))
            .unwrap_or_else(|| Array1::zeros(x.nrows()))
    }

    /// Error for a single standardized row
    pub fn reconstruction_error(&self, row: &[f32]) -> DetectorResult<f32> {
        if row.len() != self.input_dim {
            return Err(DetectorError::DimensionMismatch {
                expected: self.input_dim,
                actual: row.len(),
            });
        }
        let x = ArrayView2::from_shape((1, self.input_dim), row)
            .map_err(|_| DetectorError::DimensionMismatch { expected: self.input_dim, actual: row.len() })?;
        Ok(self.reconstruction_errors(x)[0])
    }

    // ------------------------------------------------------------------------
    // Train mode
    // ------------------------------------------------------------------------

    /// Forward + backward on one batch with MSE loss (mean over every element)
    pub fn train_step(&mut self, batch: ArrayView2<f32>, rng: &mut StdRng) -> StepOutput {
        let elements = batch.len() as f32;

        let (z, enc_cache) = self.encoder.forward_train(batch.to_owned(), rng);
        let (recon, dec_cache) = self.decoder.forward_train(z, rng);

        let diff = recon - &batch;
        let loss = diff.mapv(|v| v * v).sum() / elements;
        let grad = diff * (2.0 / elements);

        let (grad_latent, mut dec_grads) = self.decoder.backward(grad, dec_cache);
        let (_, mut gradients) = self.encoder.backward(grad_latent, enc_cache);
        gradients.append(&mut dec_grads);

        StepOutput { loss, gradients }
    }

    /// Parameters in the same order as `StepOutput::gradients`
    pub fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        let mut params = self.encoder.params_mut();
        params.extend(self.decoder.params_mut());
        params
    }
}
