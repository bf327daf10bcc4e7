//! Category encoding and batch assembly for the training loop.

use burn::tensor::{backend::Backend, Tensor, TensorData};

use crate::error::DatasetResult;
use crate::pipeline::augment::PixelSample;
use crate::pipeline::label::{one_hot, steering_class};

/// A single example ready for batching: pixels plus a one-hot target.
#[derive(Debug, Clone)]
pub struct EncodedSample {
    pub pixels: Vec<f32>,
    pub target: Vec<f32>,
}

/// Iterator adapter mapping steering values to one-hot category targets.
pub struct CategoryEncode<I> {
    upstream: I,
    classes: usize,
}

impl<I> CategoryEncode<I> {
    pub fn new(upstream: I, classes: usize) -> Self {
        CategoryEncode { upstream, classes }
    }
}

impl<I: Iterator<Item = DatasetResult<PixelSample>>> Iterator for CategoryEncode<I> {
    type Item = DatasetResult<EncodedSample>;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = match self.upstream.next()? {
            Ok(sample) => sample,
            Err(e) => return Some(Err(e)),
        };
        let class = steering_class(sample.steering, self.classes);
        Some(Ok(EncodedSample {
            pixels: sample.pixels,
            target: one_hot(class, self.classes),
        }))
    }
}

/// One training batch as burn tensors.
///
/// Images are `[batch, 3, height, width]`, targets `[batch, classes]`.
pub struct SteeringBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 2>,
}

/// Pull-based batcher over an encoded sample stream.
///
/// Pulls `batch_size` samples per call and assembles them in upstream
/// order. Partial trailing batches are dropped: a finite stream of length
/// `L` yields exactly `floor(L / batch_size)` batches. The backend is a
/// per-call parameter so the same stream serves the autodiff training
/// backend and the plain validation backend.
pub struct BatchStream {
    upstream: Box<dyn Iterator<Item = DatasetResult<EncodedSample>>>,
    batch_size: usize,
    width: usize,
    height: usize,
    classes: usize,
}

impl BatchStream {
    pub fn new(
        upstream: Box<dyn Iterator<Item = DatasetResult<EncodedSample>>>,
        batch_size: usize,
        width: u32,
        height: u32,
        classes: usize,
    ) -> Self {
        debug_assert!(batch_size > 0, "batcher needs a batch size of at least 1");
        // Clamp so a zero size cannot yield empty batches in release builds.
        BatchStream {
            upstream,
            batch_size: batch_size.max(1),
            width: width as usize,
            height: height as usize,
            classes,
        }
    }

    /// Next full batch, or `None` once the stream cannot fill one.
    pub fn next_batch<B: Backend>(
        &mut self,
        device: &B::Device,
    ) -> DatasetResult<Option<SteeringBatch<B>>> {
        let plane = self.width * self.height;
        let mut images = Vec::with_capacity(self.batch_size * plane * 3);
        let mut targets = Vec::with_capacity(self.batch_size * self.classes);
        let mut filled = 0;
        while filled < self.batch_size {
            match self.upstream.next() {
                Some(Ok(sample)) => {
                    debug_assert_eq!(sample.pixels.len(), plane * 3);
                    debug_assert_eq!(sample.target.len(), self.classes);
                    images.extend_from_slice(&sample.pixels);
                    targets.extend_from_slice(&sample.target);
                    filled += 1;
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(None),
            }
        }
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(images, [self.batch_size, 3, self.height, self.width]),
            device,
        );
        let targets = Tensor::<B, 2>::from_data(
            TensorData::new(targets, [self.batch_size, self.classes]),
            device,
        );
        Ok(Some(SteeringBatch { images, targets }))
    }
}
