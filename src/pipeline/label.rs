//! Steering label parsing and categorical encoding.
//!
//! Capture filenames embed the steering command in the stem as
//! `_st_<value>`, with the value in [-1, 1] (full left to full right),
//! e.g. `frame_000123_st_-0.25.png`.

use std::path::Path;

use crate::error::{DatasetResult, PipelineError};

/// Extract the steering value embedded in a capture filename.
pub fn parse_steering(path: &Path) -> DatasetResult<f32> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PipelineError::Label {
            path: path.to_path_buf(),
            msg: "filename is not valid UTF-8".into(),
        })?;
    let rest = stem
        .split_once("_st_")
        .map(|(_, rest)| rest)
        .ok_or_else(|| PipelineError::Label {
            path: path.to_path_buf(),
            msg: "missing _st_ marker".into(),
        })?;
    // The steering field runs to the next underscore, if any.
    let field = rest.split('_').next().unwrap_or(rest);
    let value: f32 = field.parse().map_err(|_| PipelineError::Label {
        path: path.to_path_buf(),
        msg: format!("bad steering value '{field}'"),
    })?;
    if !(-1.0..=1.0).contains(&value) {
        return Err(PipelineError::Label {
            path: path.to_path_buf(),
            msg: format!("steering {value} outside [-1, 1]"),
        });
    }
    Ok(value)
}

/// Bin a steering value in [-1, 1] into one of `classes` buckets.
pub fn steering_class(angle: f32, classes: usize) -> usize {
    debug_assert!(classes >= 2);
    let scaled = (angle.clamp(-1.0, 1.0) + 1.0) / 2.0 * (classes - 1) as f32;
    (scaled.round() as usize).min(classes - 1)
}

/// One-hot categorical target for the network's softmax output.
pub fn one_hot(class: usize, classes: usize) -> Vec<f32> {
    let mut target = vec![0.0; classes];
    if class < classes {
        target[class] = 1.0;
    }
    target
}

/// Class label for a capture file, straight from its filename.
pub fn class_for_path(path: &Path, classes: usize) -> DatasetResult<usize> {
    Ok(steering_class(parse_steering(path)?, classes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_embedded_steering() {
        let p = PathBuf::from("data/frame_000123_st_-0.25.png");
        assert!((parse_steering(&p).unwrap() + 0.25).abs() < 1e-6);
    }

    #[test]
    fn parses_steering_with_trailing_fields() {
        let p = PathBuf::from("frame_7_st_0.5_cam_front.jpg");
        assert!((parse_steering(&p).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn missing_marker_is_an_error() {
        let p = PathBuf::from("frame_000123.png");
        assert!(parse_steering(&p).is_err());
    }

    #[test]
    fn out_of_range_steering_is_an_error() {
        let p = PathBuf::from("frame_1_st_2.0.png");
        assert!(parse_steering(&p).is_err());
    }

    #[test]
    fn binning_covers_the_full_range() {
        assert_eq!(steering_class(-1.0, 15), 0);
        assert_eq!(steering_class(0.0, 15), 7);
        assert_eq!(steering_class(1.0, 15), 14);
    }

    #[test]
    fn flip_mirrors_the_class() {
        for classes in [5usize, 15] {
            for i in 0..=20 {
                let angle = -1.0 + i as f32 * 0.1;
                let a = steering_class(angle, classes);
                let b = steering_class(-angle, classes);
                assert_eq!(a, classes - 1 - b);
            }
        }
    }

    #[test]
    fn one_hot_has_single_unit_entry() {
        let target = one_hot(3, 15);
        assert_eq!(target.len(), 15);
        assert!((target.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!((target[3] - 1.0).abs() < 1e-6);
    }
}
