//! Value estimator: MLP mapping observations to one scalar per row.

use burn::module::Module;
use burn::nn::Linear;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::build_mlp;

/// Scalar state-value network.
#[derive(Module, Debug)]
pub struct ValueEstimator<B: Backend> {
    layers: Vec<Linear<B>>,
}

impl<B: Backend> ValueEstimator<B> {
    /// Create an estimator for `obs_size` inputs with the given hidden
    /// layer widths.
    pub fn new(obs_size: usize, layer_sizes: &[usize], device: &B::Device) -> Self {
        let mut sizes = vec![obs_size];
        sizes.extend_from_slice(layer_sizes);
        sizes.push(1);

        Self {
            layers: build_mlp(&sizes, device),
        }
    }

    /// Value prediction per row: `[batch]`.
    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 1> {
        let mut x = obs;
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i != last {
                x = relu(x);
            }
        }
        x.flatten(0, 1)
    }

    /// Device the parameters live on.
    pub fn device(&self) -> B::Device {
        self.layers[0].weight.val().device()
    }

    /// All parameters flattened to host values, in layer order.
    pub fn flat_params(&self) -> Vec<f32> {
        super::layers_flat_params(&self.layers)
    }

    /// Element count per parameter tensor, in layer order.
    pub fn param_sizes(&self) -> Vec<usize> {
        super::layers_param_sizes(&self.layers)
    }

    /// Round-trip all parameters through f16.
    pub fn half_precision(mut self) -> Self {
        self.layers = super::layers_half_round_trip(self.layers);
        self
    }

    pub(crate) fn layers(&self) -> &[Linear<B>] {
        &self.layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let net = ValueEstimator::<B>::new(6, &[16, 16], &device);

        let obs = Tensor::<B, 2>::zeros([5, 6], &device);
        let values = net.forward(obs);
        assert_eq!(values.dims(), [5]);
    }

    #[test]
    fn test_forward_is_deterministic() {
        let device = Default::default();
        let net = ValueEstimator::<B>::new(3, &[8], &device);

        let obs = Tensor::<B, 1>::from_floats([0.1, 0.2, 0.3], &device).reshape([1, 3]);
        let a = super::super::to_f32_vec(net.forward(obs.clone()));
        let b = super::super::to_f32_vec(net.forward(obs));
        assert_eq!(a, b);
    }

    #[test]
    fn test_param_sizes() {
        let device = Default::default();
        let net = ValueEstimator::<B>::new(4, &[8], &device);
        assert_eq!(net.param_sizes(), vec![32, 8, 8, 1]);
    }
}
