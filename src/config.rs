use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Trainer configuration, loadable from TOML.
///
/// Everything the pipeline and fit loop need is carried here explicitly
/// rather than read from process-wide state.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Width of the network's softmax output (number of steering bins).
    pub output_size: usize,
    /// Root directory for final model artifacts and run logs.
    pub models_dir: PathBuf,
    /// Path the best-so-far checkpoint is written to during training.
    pub best_checkpoint: PathBuf,
    /// Network input width in pixels.
    pub input_width: u32,
    /// Network input height in pixels.
    pub input_height: u32,
    /// First dense layer width.
    pub dense1: usize,
    /// Second dense layer width.
    pub dense2: usize,
    /// Epoch limit.
    pub epochs: usize,
    /// Training batch size.
    pub gen_batch: usize,
    /// Validation batch size.
    pub val_batch: usize,
    /// Fraction of the validation split visited per epoch (1/val_stride).
    pub val_stride: usize,
    /// Every nth enumerated file goes to validation.
    pub nth: usize,
    /// Offset into the modulo cycle for the validation split.
    pub offset: usize,
    /// Learning rate.
    pub lr: f64,
    /// Seed for the augmentation/resampling RNGs. None draws from the OS.
    pub seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            output_size: 15,
            models_dir: PathBuf::from("models"),
            best_checkpoint: PathBuf::from("model.bin"),
            input_width: 132,
            input_height: 99,
            dense1: 150,
            dense2: 50,
            epochs: 200,
            gen_batch: 256,
            val_batch: 32,
            val_stride: 20,
            nth: 10,
            offset: 4,
            lr: 1e-3,
            seed: None,
        }
    }
}

impl TrainerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: TrainerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!("config file '{}' not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_size < 2 {
            return Err(ConfigError::Validation("output_size must be >= 2".into()));
        }
        if self.gen_batch == 0 || self.val_batch == 0 {
            return Err(ConfigError::Validation("batch sizes must be > 0".into()));
        }
        if self.nth < 2 {
            return Err(ConfigError::Validation("nth must be >= 2".into()));
        }
        if self.offset >= self.nth {
            return Err(ConfigError::Validation("offset must be < nth".into()));
        }
        if self.val_stride == 0 {
            return Err(ConfigError::Validation("val_stride must be > 0".into()));
        }
        if self.lr <= 0.0 {
            return Err(ConfigError::Validation("lr must be > 0".into()));
        }
        // The five-layer conv stack eats 77 pixels per dimension at minimum.
        if self.input_width < 77 || self.input_height < 77 {
            return Err(ConfigError::Validation(
                "input dimensions too small for the conv stack".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(TrainerConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_offset_outside_cycle() {
        let cfg = TrainerConfig {
            offset: 10,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_batch() {
        let cfg = TrainerConfig {
            gen_batch: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
