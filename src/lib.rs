//! steernet: CNN steering-command trainer for a small autonomous rover.
//!
//! A lazy iterator pipeline turns a folder of labeled camera captures into
//! augmented, normalized, batched tensors, split deterministically into
//! training and validation streams. The trainer fits a five-layer conv net
//! over the stream, checkpoints the best validation loss, and stops early
//! on plateau.

pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod trainer;

pub use config::TrainerConfig;
pub use error::{ConfigError, DatasetResult, PipelineError};
pub use model::{SteeringNet, SteeringNetConfig};
pub use trainer::{train, EarlyStopping, OptimizerKind, TrainBackend, TrainOutcome};
