//! The steering CNN.

use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::tensor::activation::{log_softmax, relu, softmax};
use burn::tensor::{backend::Backend, Tensor};

#[derive(Debug, Clone)]
pub struct SteeringNetConfig {
    pub input_width: usize,
    pub input_height: usize,
    pub dense1: usize,
    pub dense2: usize,
    pub output_size: usize,
}

impl Default for SteeringNetConfig {
    fn default() -> Self {
        SteeringNetConfig {
            input_width: 132,
            input_height: 99,
            dense1: 150,
            dense2: 50,
            output_size: 15,
        }
    }
}

/// Five valid-padding conv layers, flatten, two dense layers, and a
/// softmax head over the steering bins.
#[derive(Debug, Module)]
pub struct SteeringNet<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    conv5: Conv2d<B>,
    fc1: nn::Linear<B>,
    fc2: nn::Linear<B>,
    angle_out: nn::Linear<B>,
}

/// Output extent of one valid-padding conv dimension.
fn conv_out(n: usize, kernel: usize, stride: usize) -> usize {
    (n - kernel) / stride + 1
}

impl<B: Backend> SteeringNet<B> {
    pub fn new(cfg: &SteeringNetConfig, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([3, 24], [5, 5])
            .with_stride([2, 2])
            .init(device);
        let conv2 = Conv2dConfig::new([24, 32], [5, 5])
            .with_stride([2, 2])
            .init(device);
        let conv3 = Conv2dConfig::new([32, 64], [5, 5])
            .with_stride([2, 2])
            .init(device);
        let conv4 = Conv2dConfig::new([64, 64], [3, 3])
            .with_stride([2, 2])
            .init(device);
        let conv5 = Conv2dConfig::new([64, 24], [3, 3])
            .with_stride([1, 1])
            .init(device);

        let flat = Self::flattened_size(cfg);
        let fc1 = nn::LinearConfig::new(flat, cfg.dense1).init(device);
        let fc2 = nn::LinearConfig::new(cfg.dense1, cfg.dense2).init(device);
        let angle_out = nn::LinearConfig::new(cfg.dense2, cfg.output_size).init(device);

        SteeringNet {
            conv1,
            conv2,
            conv3,
            conv4,
            conv5,
            fc1,
            fc2,
            angle_out,
        }
    }

    /// Features left after the conv stack, for the given input resolution.
    pub fn flattened_size(cfg: &SteeringNetConfig) -> usize {
        let mut h = cfg.input_height;
        let mut w = cfg.input_width;
        for (kernel, stride) in [(5, 2), (5, 2), (5, 2), (3, 2), (3, 1)] {
            h = conv_out(h, kernel, stride);
            w = conv_out(w, kernel, stride);
        }
        24 * h * w
    }

    /// Logits over the steering bins for a `[batch, 3, H, W]` input.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.conv1.forward(images));
        let x = relu(self.conv2.forward(x));
        let x = relu(self.conv3.forward(x));
        let x = relu(self.conv4.forward(x));
        let x = relu(self.conv5.forward(x));
        let x = x.flatten::<2>(1, 3);
        let x = relu(self.fc1.forward(x));
        let x = relu(self.fc2.forward(x));
        self.angle_out.forward(x)
    }

    /// Softmax probabilities over the steering bins.
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }
}

/// Categorical cross-entropy against one-hot targets.
pub fn cross_entropy_one_hot<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    (targets * log_probs).sum_dim(1).mean().neg()
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray<f32>;

    #[test]
    fn conv_stack_matches_hand_computed_flatten() {
        // 99x132 input through the five conv layers leaves 24 x 2 x 4.
        let cfg = SteeringNetConfig::default();
        assert_eq!(SteeringNet::<TestBackend>::flattened_size(&cfg), 24 * 2 * 4);
    }

    #[test]
    fn forward_produces_one_logit_per_class() {
        let cfg = SteeringNetConfig::default();
        let device = Default::default();
        let model = SteeringNet::<TestBackend>::new(&cfg, &device);
        let images = Tensor::<TestBackend, 4>::ones([2, 3, 99, 132], &device);
        let logits = model.forward(images);
        assert_eq!(logits.dims(), [2, 15]);
    }

    #[test]
    fn predict_sums_to_one() {
        let cfg = SteeringNetConfig {
            input_width: 80,
            input_height: 80,
            dense1: 16,
            dense2: 8,
            output_size: 5,
        };
        let device = Default::default();
        let model = SteeringNet::<TestBackend>::new(&cfg, &device);
        let images = Tensor::<TestBackend, 4>::ones([1, 3, 80, 80], &device);
        let probs = model.predict(images);
        let total: f32 = probs
            .sum()
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default()
            .first()
            .copied()
            .unwrap_or(0.0);
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn cross_entropy_is_low_for_confident_correct_prediction() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[10.0, -10.0, -10.0]], &device);
        let targets = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0, 0.0]], &device);
        let loss: f32 = cross_entropy_one_hot(logits, targets)
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default()
            .first()
            .copied()
            .unwrap_or(f32::MAX);
        assert!(loss < 1e-3);
    }
}
