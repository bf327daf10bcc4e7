//! Lazy, pull-based data pipeline: enumeration, splitting, resampling,
//! augmentation, normalization, label encoding, and batching.
//!
//! Each stage wraps the previous one as an iterator; nothing is touched
//! until the trainer pulls a batch. The training and validation streams are
//! two instantiations of the same chain with complementary split predicates
//! and different augmentation ranges.

pub mod augment;
pub mod balance;
pub mod batch;
pub mod files;
pub mod label;
pub mod normalize;
pub mod split;

use std::path::Path;

use crate::error::DatasetResult;

pub use augment::{AugmentConfig, DecodeAugment, PixelSample};
pub use balance::EqualizeClasses;
pub use batch::{BatchStream, CategoryEncode, EncodedSample, SteeringBatch};
pub use files::{image_count, list_images, FilenameStream};
pub use normalize::NormalizeBrightness;
pub use split::{NthSelect, SplitMode};

/// Settings for one pipeline instantiation (training or validation).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub split: SplitMode,
    pub nth: usize,
    pub offset: usize,
    pub classes: usize,
    pub batch_size: usize,
    pub augment: AugmentConfig,
    /// Brightness shift range applied after centering.
    pub brightness: (f32, f32),
    /// Cycle the enumeration forever instead of ending after one pass.
    pub indefinite: bool,
    pub seed: Option<u64>,
}

/// Compose the full chain over `folder` and return its batcher.
pub fn build_batches(folder: &Path, cfg: &PipelineConfig) -> DatasetResult<BatchStream> {
    let paths = list_images(folder)?;
    let enumeration_len = paths.len();
    let names = FilenameStream::from_paths(paths, cfg.indefinite);
    let split = NthSelect::new(names, cfg.split, cfg.nth, cfg.offset);
    // Stage seeds are decorrelated so a shared base seed does not couple
    // resampling decisions to augmentation draws. The skip limit caps a
    // cycling stream of unlabeled files at one full pass before erroring.
    let balanced = EqualizeClasses::new(split, cfg.classes, stage_seed(cfg.seed, 1))
        .with_skip_limit(enumeration_len);
    let augment = AugmentConfig {
        seed: stage_seed(cfg.seed, 2),
        ..cfg.augment.clone()
    };
    let (width, height) = augment.target_size;
    let decoded = DecodeAugment::new(balanced, augment);
    let normalized = NormalizeBrightness::new(
        decoded,
        cfg.brightness.0,
        cfg.brightness.1,
        stage_seed(cfg.seed, 3),
    );
    let encoded = CategoryEncode::new(normalized, cfg.classes);
    Ok(BatchStream::new(
        Box::new(encoded),
        cfg.batch_size,
        width,
        height,
        cfg.classes,
    ))
}

fn stage_seed(base: Option<u64>, stage: u64) -> Option<u64> {
    base.map(|s| s.wrapping_mul(0x9e37_79b9_7f4a_7c15).rotate_left(stage as u32) ^ stage)
}
