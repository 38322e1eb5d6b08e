//! Policy and value networks plus parameter utilities.
//!
//! Both networks are plain feed-forward MLPs built from [`burn::nn::Linear`]
//! layers with ReLU activations. The helpers here operate on the shared
//! layer representation: flattening parameters for update-magnitude
//! reporting, per-parameter element counts for checkpoint verification,
//! gradient norms/scaling for the learner, and the half-precision
//! round-trip applied to collector snapshots.

pub mod policy;
pub mod value;

pub use policy::{ActionResult, DiscretePolicy};
pub use value::ValueEstimator;

use burn::nn::{Linear, LinearConfig};
use burn::optim::GradientsParams;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{f16, Tensor};

/// Build an MLP as a stack of affine layers.
///
/// `sizes` runs input to output; ReLU is applied between layers (not after
/// the last) by the models' forward passes.
pub(crate) fn build_mlp<B: Backend>(sizes: &[usize], device: &B::Device) -> Vec<Linear<B>> {
    sizes
        .windows(2)
        .map(|pair| LinearConfig::new(pair[0], pair[1]).init(device))
        .collect()
}

/// Read a tensor back as f32 host values regardless of backend precision.
pub(crate) fn to_f32_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .expect("tensor data conversion to f32")
}

/// Flatten every parameter of a layer stack into one host vector, in layer
/// order (weight then bias per layer).
pub(crate) fn layers_flat_params<B: Backend>(layers: &[Linear<B>]) -> Vec<f32> {
    let mut out = Vec::new();
    for layer in layers {
        out.extend(to_f32_vec(layer.weight.val()));
        if let Some(bias) = &layer.bias {
            out.extend(to_f32_vec(bias.val()));
        }
    }
    out
}

/// Element count of every parameter tensor, in layer order.
pub(crate) fn layers_param_sizes<B: Backend>(layers: &[Linear<B>]) -> Vec<usize> {
    let mut out = Vec::new();
    for layer in layers {
        out.push(layer.weight.val().dims().iter().product());
        if let Some(bias) = &layer.bias {
            out.push(bias.val().dims().iter().product());
        }
    }
    out
}

/// L2 distance between two flattened parameter vectors.
pub(crate) fn param_update_magnitude(before: &[f32], after: &[f32]) -> f32 {
    before
        .iter()
        .zip(after.iter())
        .map(|(b, a)| {
            let d = (b - a) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt() as f32
}

/// Round-trip a tensor through f16, keeping backend and device.
///
/// Applied to collector snapshots when half-precision inference is
/// enabled; the quantization loss is the accepted throughput trade.
pub(crate) fn half_round_trip<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    let device = tensor.device();
    let data = tensor.into_data().convert::<f16>().convert::<f32>();
    Tensor::from_data(data, &device)
}

/// Apply the f16 round-trip to every parameter of a layer stack.
pub(crate) fn layers_half_round_trip<B: Backend>(layers: Vec<Linear<B>>) -> Vec<Linear<B>> {
    layers
        .into_iter()
        .map(|mut layer| {
            layer.weight = layer.weight.map(half_round_trip);
            layer.bias = layer.bias.map(|b| b.map(half_round_trip));
            layer
        })
        .collect()
}

/// Global L2 norm of the gradients attached to a layer stack.
pub(crate) fn layers_grad_norm<B: AutodiffBackend>(
    layers: &[Linear<B>],
    grads: &GradientsParams,
) -> f32 {
    let mut sum_sq = 0.0f64;
    for layer in layers {
        if let Some(g) = grads.get::<B::InnerBackend, 2>(layer.weight.id) {
            sum_sq += to_f32_vec(g)
                .iter()
                .map(|&x| (x as f64) * (x as f64))
                .sum::<f64>();
        }
        if let Some(bias) = &layer.bias {
            if let Some(g) = grads.get::<B::InnerBackend, 1>(bias.id) {
                sum_sq += to_f32_vec(g)
                    .iter()
                    .map(|&x| (x as f64) * (x as f64))
                    .sum::<f64>();
            }
        }
    }
    sum_sq.sqrt() as f32
}

/// Multiply every gradient of a layer stack by `factor`.
pub(crate) fn layers_scale_grads<B: AutodiffBackend>(
    layers: &[Linear<B>],
    grads: GradientsParams,
    factor: f32,
) -> GradientsParams {
    let mut scaled = GradientsParams::new();
    for layer in layers {
        if let Some(g) = grads.get::<B::InnerBackend, 2>(layer.weight.id) {
            scaled.register::<B::InnerBackend, 2>(layer.weight.id, g.mul_scalar(factor));
        }
        if let Some(bias) = &layer.bias {
            if let Some(g) = grads.get::<B::InnerBackend, 1>(bias.id) {
                scaled.register::<B::InnerBackend, 1>(bias.id, g.mul_scalar(factor));
            }
        }
    }
    scaled
}
