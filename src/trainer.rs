//! Model training: fit loop, validation, checkpointing, early stopping.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use burn::backend::Autodiff;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer, SgdConfig};
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use clap::ValueEnum;

use crate::config::TrainerConfig;
use crate::metrics::{EpochMetrics, RunLogger, RunSummary};
use crate::model::{cross_entropy_one_hot, SteeringNet, SteeringNetConfig};
use crate::pipeline::{
    build_batches, image_count, AugmentConfig, BatchStream, PipelineConfig, SplitMode,
};

/// Backend alias for training/eval.
pub type TrainBackend = burn::backend::NdArray<f32>;
type ADBackend = Autodiff<TrainBackend>;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

impl OptimizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizerKind::Adam => "adam",
            OptimizerKind::Sgd => "sgd",
        }
    }
}

/// How a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainOutcome {
    /// Validation loss stopped improving for the patience window.
    EarlyStopped { epoch: usize },
    /// The configured epoch limit was reached.
    EpochLimitReached,
}

/// Validation-loss plateau detector.
pub struct EarlyStopping {
    patience: usize,
    best: f32,
    epochs_since_improvement: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        EarlyStopping {
            patience,
            best: f32::INFINITY,
            epochs_since_improvement: 0,
        }
    }

    /// Record an epoch's validation loss. Returns true if it improved on
    /// the best seen so far.
    pub fn observe(&mut self, val_loss: f32) -> bool {
        if val_loss < self.best {
            self.best = val_loss;
            self.epochs_since_improvement = 0;
            true
        } else {
            self.epochs_since_improvement += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.epochs_since_improvement >= self.patience
    }

    pub fn best(&self) -> f32 {
        self.best
    }
}

/// Train the steering network on the captures under `train_folder`.
///
/// Builds the training and validation pipelines over the same folder with
/// complementary split predicates, fits for up to `cfg.epochs` epochs with
/// early stopping after `patience` epochs without validation improvement,
/// checkpoints the best weights as it goes, saves the final model under the
/// models directory, and returns the best observed validation loss.
pub fn train(
    train_folder: &Path,
    track: &str,
    optimizer: OptimizerKind,
    patience: usize,
    cfg: &TrainerConfig,
) -> anyhow::Result<f32> {
    let im_count = image_count(train_folder)?;
    tracing::info!("{im_count} capture images under {}", train_folder.display());

    let train_pipeline = PipelineConfig {
        split: SplitMode::RejectNth,
        nth: cfg.nth,
        offset: cfg.offset,
        classes: cfg.output_size,
        batch_size: cfg.gen_batch,
        augment: AugmentConfig {
            target_size: (cfg.input_width, cfg.input_height),
            flip_prob: 0.5,
            rotate_max_deg: 4.0,
            seed: None,
        },
        brightness: (-0.18, 0.18),
        indefinite: true,
        seed: cfg.seed,
    };
    // Validation keeps the flip but skips rotation and narrows the
    // brightness range.
    let val_pipeline = PipelineConfig {
        split: SplitMode::AcceptNth,
        batch_size: cfg.val_batch,
        augment: AugmentConfig {
            rotate_max_deg: 0.0,
            ..train_pipeline.augment.clone()
        },
        brightness: (-0.10, 0.10),
        seed: cfg.seed.map(|s| s.wrapping_add(1)),
        ..train_pipeline.clone()
    };
    let mut train_batches = build_batches(train_folder, &train_pipeline)?;
    let mut val_batches = build_batches(train_folder, &val_pipeline)?;

    let steps_per_epoch = (im_count / cfg.gen_batch).max(1);
    let val_steps = (im_count / (cfg.val_batch * cfg.val_stride)).max(1);

    let started_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let run_name = format!(
        "{}-{}-{}-{}",
        optimizer.as_str(),
        cfg.dense1,
        cfg.dense2,
        started_unix
    );
    let mut logger = RunLogger::new(&cfg.models_dir, track, &run_name)?;
    tracing::info!("run logs at {}", logger.dir().display());

    let device = <ADBackend as burn::tensor::backend::Backend>::Device::default();
    let net_cfg = SteeringNetConfig {
        input_width: cfg.input_width as usize,
        input_height: cfg.input_height as usize,
        dense1: cfg.dense1,
        dense2: cfg.dense2,
        output_size: cfg.output_size,
    };
    let model = SteeringNet::<ADBackend>::new(&net_cfg, &device);

    let fit_cfg = FitSettings {
        epochs: cfg.epochs,
        steps_per_epoch,
        val_steps,
        lr: cfg.lr,
        patience,
        best_checkpoint: cfg.best_checkpoint.clone(),
    };

    let (model, best_val_loss, epochs_run, outcome) = match optimizer {
        OptimizerKind::Adam => fit(
            model,
            AdamConfig::new().init(),
            &mut train_batches,
            &mut val_batches,
            &fit_cfg,
            &mut logger,
            &device,
        )?,
        OptimizerKind::Sgd => fit(
            model,
            SgdConfig::new().init(),
            &mut train_batches,
            &mut val_batches,
            &fit_cfg,
            &mut logger,
            &device,
        )?,
    };

    let final_path = cfg.models_dir.join(format!(
        "model-{}-{}-{}-{}-{}.bin",
        track,
        optimizer.as_str(),
        cfg.dense1,
        cfg.dense2,
        started_unix
    ));
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .save_file(&final_path, &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save final model: {e}"))?;
    tracing::info!("saved final model to {}", final_path.display());

    logger.finish(&RunSummary {
        track: track.to_string(),
        optimizer: optimizer.as_str().to_string(),
        dense1: cfg.dense1,
        dense2: cfg.dense2,
        started_unix,
        epochs_run,
        best_val_loss,
        early_stopped: matches!(outcome, TrainOutcome::EarlyStopped { .. }),
    })?;

    Ok(best_val_loss)
}

struct FitSettings {
    epochs: usize,
    steps_per_epoch: usize,
    val_steps: usize,
    lr: f64,
    patience: usize,
    best_checkpoint: std::path::PathBuf,
}

fn fit<O>(
    mut model: SteeringNet<ADBackend>,
    mut optim: O,
    train_batches: &mut BatchStream,
    val_batches: &mut BatchStream,
    cfg: &FitSettings,
    logger: &mut RunLogger,
    device: &<ADBackend as burn::tensor::backend::Backend>::Device,
) -> anyhow::Result<(SteeringNet<ADBackend>, f32, usize, TrainOutcome)>
where
    O: Optimizer<SteeringNet<ADBackend>, ADBackend>,
{
    if let Some(parent) = cfg.best_checkpoint.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut stopper = EarlyStopping::new(cfg.patience);
    let mut outcome = TrainOutcome::EpochLimitReached;
    let mut epochs_run = 0;

    'epochs: for epoch in 1..=cfg.epochs {
        let mut losses = Vec::with_capacity(cfg.steps_per_epoch);
        for _ in 0..cfg.steps_per_epoch {
            let batch = match train_batches.next_batch::<ADBackend>(device)? {
                Some(batch) => batch,
                // Only a finite stream ends; treat it as the end of training.
                None => break 'epochs,
            };
            let logits = model.forward(batch.images);
            let loss = cross_entropy_one_hot(logits, batch.targets);
            let loss_detached = loss.clone().detach();
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(cfg.lr, model, grads);
            losses.push(scalar(loss_detached)?);
        }
        epochs_run = epoch;
        let train_loss = mean(&losses);

        let val_loss = validate(&model.valid(), val_batches, cfg.val_steps, device)?;
        tracing::info!("epoch {epoch}: train loss {train_loss:.4}, val loss {val_loss:.4}");

        let improved = stopper.observe(val_loss);
        if improved {
            let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
            model
                .clone()
                .save_file(&cfg.best_checkpoint, &recorder)
                .map_err(|e| anyhow::anyhow!("failed to save checkpoint: {e}"))?;
            tracing::debug!(
                "val loss improved to {val_loss:.4}, checkpointed {}",
                cfg.best_checkpoint.display()
            );
        }

        logger.log_epoch(&EpochMetrics {
            epoch,
            train_loss,
            val_loss,
        })?;

        if stopper.should_stop() {
            tracing::info!("early stopping at epoch {epoch} (patience {})", cfg.patience);
            outcome = TrainOutcome::EarlyStopped { epoch };
            break;
        }
    }

    Ok((model, stopper.best(), epochs_run, outcome))
}

fn validate(
    model: &SteeringNet<TrainBackend>,
    val_batches: &mut BatchStream,
    val_steps: usize,
    device: &<ADBackend as burn::tensor::backend::Backend>::Device,
) -> anyhow::Result<f32> {
    let mut losses = Vec::with_capacity(val_steps);
    for _ in 0..val_steps {
        let batch = match val_batches.next_batch::<TrainBackend>(device)? {
            Some(batch) => batch,
            None => break,
        };
        let logits = model.forward(batch.images);
        let loss = cross_entropy_one_hot(logits, batch.targets);
        losses.push(scalar(loss)?);
    }
    Ok(mean(&losses))
}

/// Read a rank-1 loss tensor back to a scalar. A failed extraction is an
/// error rather than a zero, so it cannot masquerade as a new best loss.
fn scalar<B: burn::tensor::backend::Backend>(
    t: burn::tensor::Tensor<B, 1>,
) -> anyhow::Result<f32> {
    t.into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("failed to read loss tensor: {e:?}"))?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("loss tensor was empty"))
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Restore a trained network from a checkpoint for inference.
pub fn load_steering_net<P: AsRef<Path>>(
    path: P,
    cfg: &SteeringNetConfig,
    device: &<TrainBackend as burn::tensor::backend::Backend>::Device,
) -> Result<SteeringNet<TrainBackend>, RecorderError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    SteeringNet::<TrainBackend>::new(cfg, device).load_file(
        path.as_ref().to_path_buf(),
        &recorder,
        device,
    )
}
