//! Forward-only layer primitives
//!
//! Each layer stores its parameter tensors in the same layout the weight
//! container uses (Keras conventions): convolution kernels are
//! `[kh, kw, in, out]`, dense weights are `[in, out]`, and feature maps are
//! channels-last `[h, w, c]`. Layers with parameters expose `param_shapes`
//! and `load` so the weight loader can validate and assign stored tensors.

use std::fmt;

use ndarray::{Array1, Array2, Array3, Array4, ArrayD, Ix1, Ix2, Ix4};

/// A layer rejected the tensors offered to it by the weight loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The layer name does not exist in this network
    UnknownLayer(String),
    /// Wrong number of parameter tensors
    ParamCount { expected: usize, found: usize },
    /// A tensor's shape does not match the declared parameter slot
    ParamShape {
        slot: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::UnknownLayer(name) => write!(f, "unknown layer '{}'", name),
            LoadError::ParamCount { expected, found } => {
                write!(f, "expected {} parameter tensors, found {}", expected, found)
            }
            LoadError::ParamShape {
                slot,
                expected,
                found,
            } => write!(
                f,
                "parameter {}: expected shape {:?}, found {:?}",
                slot, expected, found
            ),
        }
    }
}

impl std::error::Error for LoadError {}

/// Validate an ordered list of tensors against the declared parameter slots.
///
/// Assignment is all-or-nothing per layer: callers only move tensors into
/// place after this check passes.
pub(crate) fn check_shapes(
    arrays: &[ArrayD<f32>],
    expected: &[Vec<usize>],
) -> Result<(), LoadError> {
    if arrays.len() != expected.len() {
        return Err(LoadError::ParamCount {
            expected: expected.len(),
            found: arrays.len(),
        });
    }
    for (slot, (array, shape)) in arrays.iter().zip(expected).enumerate() {
        if array.shape() != shape.as_slice() {
            return Err(LoadError::ParamShape {
                slot,
                expected: shape.clone(),
                found: array.shape().to_vec(),
            });
        }
    }
    Ok(())
}

/// 2D convolution with "same" padding and stride 1
pub struct Conv2d {
    /// Kernel in Keras layout: `[kh, kw, in_channels, out_channels]`
    pub kernel: Array4<f32>,
    /// Per-output-channel bias
    pub bias: Array1<f32>,
    /// Apply ReLU to the output (fused, as Keras does with `activation='relu'`)
    pub relu: bool,
}

impl Conv2d {
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize, relu: bool) -> Self {
        Self {
            kernel: Array4::zeros((kernel_size, kernel_size, in_channels, out_channels)),
            bias: Array1::zeros(out_channels),
            relu,
        }
    }

    /// Declared parameter slots: kernel, then bias
    pub fn param_shapes(&self) -> Vec<Vec<usize>> {
        vec![self.kernel.shape().to_vec(), self.bias.shape().to_vec()]
    }

    /// Assign stored tensors (kernel, bias) into this layer
    pub fn load(&mut self, arrays: Vec<ArrayD<f32>>) -> Result<(), LoadError> {
        check_shapes(&arrays, &self.param_shapes())?;
        let mut arrays = arrays.into_iter();
        self.kernel = take_fixed::<Ix4>(&mut arrays);
        self.bias = take_fixed::<Ix1>(&mut arrays);
        Ok(())
    }

    /// Forward pass: `[h, w, in]` -> `[h, w, out]`
    pub fn forward(&self, input: &Array3<f32>) -> Array3<f32> {
        let (h, w, in_c) = input.dim();
        let (kh, kw, kin, out_c) = self.kernel.dim();
        debug_assert_eq!(in_c, kin, "input channels must match kernel");

        let pad_h = (kh - 1) / 2;
        let pad_w = (kw - 1) / 2;
        let mut out = Array3::<f32>::zeros((h, w, out_c));

        for oy in 0..h {
            for ox in 0..w {
                for oc in 0..out_c {
                    let mut acc = self.bias[oc];
                    for ky in 0..kh {
                        let iy = oy + ky;
                        if iy < pad_h || iy >= h + pad_h {
                            continue;
                        }
                        let iy = iy - pad_h;
                        for kx in 0..kw {
                            let ix = ox + kx;
                            if ix < pad_w || ix >= w + pad_w {
                                continue;
                            }
                            let ix = ix - pad_w;
                            for ic in 0..in_c {
                                acc += input[[iy, ix, ic]] * self.kernel[[ky, kx, ic, oc]];
                            }
                        }
                    }
                    out[[oy, ox, oc]] = if self.relu { acc.max(0.0) } else { acc };
                }
            }
        }

        out
    }

    pub fn num_params(&self) -> usize {
        self.kernel.len() + self.bias.len()
    }
}

/// Batch normalization (inference formula only)
pub struct BatchNorm {
    pub gamma: Array1<f32>,
    pub beta: Array1<f32>,
    pub moving_mean: Array1<f32>,
    pub moving_variance: Array1<f32>,
    pub epsilon: f32,
}

impl BatchNorm {
    pub fn new(num_features: usize) -> Self {
        Self {
            gamma: Array1::ones(num_features),
            beta: Array1::zeros(num_features),
            moving_mean: Array1::zeros(num_features),
            moving_variance: Array1::ones(num_features),
            // Keras default epsilon
            epsilon: 1e-3,
        }
    }

    /// Declared parameter slots: gamma, beta, moving mean, moving variance
    pub fn param_shapes(&self) -> Vec<Vec<usize>> {
        vec![self.gamma.shape().to_vec(); 4]
    }

    pub fn load(&mut self, arrays: Vec<ArrayD<f32>>) -> Result<(), LoadError> {
        check_shapes(&arrays, &self.param_shapes())?;
        let mut arrays = arrays.into_iter();
        self.gamma = take_fixed::<Ix1>(&mut arrays);
        self.beta = take_fixed::<Ix1>(&mut arrays);
        self.moving_mean = take_fixed::<Ix1>(&mut arrays);
        self.moving_variance = take_fixed::<Ix1>(&mut arrays);
        Ok(())
    }

    /// `gamma * (x - mean) / sqrt(var + eps) + beta`, per channel
    pub fn forward(&self, input: &Array3<f32>) -> Array3<f32> {
        let mut out = input.clone();
        for ((_, _, c), v) in out.indexed_iter_mut() {
            *v = self.gamma[c] * (*v - self.moving_mean[c])
                / (self.moving_variance[c] + self.epsilon).sqrt()
                + self.beta[c];
        }
        out
    }

    pub fn num_params(&self) -> usize {
        self.gamma.len() * 4
    }
}

/// Max pooling with a square window and matching stride (valid padding)
pub struct MaxPool2d {
    pub size: usize,
}

impl MaxPool2d {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// Forward pass: `[h, w, c]` -> `[h / size, w / size, c]`
    pub fn forward(&self, input: &Array3<f32>) -> Array3<f32> {
        let (h, w, c) = input.dim();
        let (oh, ow) = (h / self.size, w / self.size);
        let mut out = Array3::<f32>::zeros((oh, ow, c));

        for oy in 0..oh {
            for ox in 0..ow {
                for ch in 0..c {
                    let mut best = f32::NEG_INFINITY;
                    for ky in 0..self.size {
                        for kx in 0..self.size {
                            let v = input[[oy * self.size + ky, ox * self.size + kx, ch]];
                            best = best.max(v);
                        }
                    }
                    out[[oy, ox, ch]] = best;
                }
            }
        }

        out
    }
}

/// Fully connected layer
pub struct Dense {
    /// Weight in Keras layout: `[in, out]`
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
    pub relu: bool,
}

impl Dense {
    pub fn new(in_features: usize, out_features: usize, relu: bool) -> Self {
        Self {
            weight: Array2::zeros((in_features, out_features)),
            bias: Array1::zeros(out_features),
            relu,
        }
    }

    /// Declared parameter slots: weight, then bias
    pub fn param_shapes(&self) -> Vec<Vec<usize>> {
        vec![self.weight.shape().to_vec(), self.bias.shape().to_vec()]
    }

    pub fn load(&mut self, arrays: Vec<ArrayD<f32>>) -> Result<(), LoadError> {
        check_shapes(&arrays, &self.param_shapes())?;
        let mut arrays = arrays.into_iter();
        self.weight = take_fixed::<Ix2>(&mut arrays);
        self.bias = take_fixed::<Ix1>(&mut arrays);
        Ok(())
    }

    pub fn forward(&self, input: &Array1<f32>) -> Array1<f32> {
        let mut out = input.dot(&self.weight) + &self.bias;
        if self.relu {
            out.mapv_inplace(|v| v.max(0.0));
        }
        out
    }

    pub fn num_params(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}

/// Flatten a channels-last feature map in Keras (row-major h, w, c) order
pub fn flatten(input: &Array3<f32>) -> Array1<f32> {
    Array1::from_iter(input.iter().cloned())
}

/// Numerically stable softmax
pub fn softmax(logits: &Array1<f32>) -> Array1<f32> {
    let max = logits.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let exp = logits.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Pull the next array out of a validated sequence with a fixed dimension.
/// Callers must have run `check_shapes` first.
fn take_fixed<D: ndarray::Dimension>(
    arrays: &mut impl Iterator<Item = ArrayD<f32>>,
) -> ndarray::Array<f32, D> {
    arrays
        .next()
        .and_then(|a| a.into_dimensionality::<D>().ok())
        .expect("tensor list validated by check_shapes")
}
