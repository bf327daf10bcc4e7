//! End-to-end pipeline tests over synthetic capture folders.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

use steernet::pipeline::{
    build_batches, image_count, list_images, AugmentConfig, FilenameStream, NthSelect,
    PipelineConfig, SplitMode,
};

type TestBackend = steernet::TrainBackend;

fn touch_capture(dir: &Path, index: usize, steering: f32) {
    let name = format!("frame_{index:05}_st_{steering:.2}.png");
    File::create(dir.join(name)).unwrap();
}

fn write_capture(dir: &Path, index: usize, steering: f32) {
    let name = format!("frame_{index:05}_st_{steering:.2}.png");
    let img = RgbImage::from_fn(160, 120, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, (index % 256) as u8])
    });
    img.save(dir.join(name)).unwrap();
}

#[test]
fn thousand_file_folder_splits_900_to_100() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..1000 {
        touch_capture(tmp.path(), i, 0.0);
    }
    assert_eq!(image_count(tmp.path()).unwrap(), 1000);

    let train: HashSet<PathBuf> = NthSelect::new(
        FilenameStream::new(tmp.path(), false).unwrap(),
        SplitMode::RejectNth,
        10,
        4,
    )
    .collect();
    let val: HashSet<PathBuf> = NthSelect::new(
        FilenameStream::new(tmp.path(), false).unwrap(),
        SplitMode::AcceptNth,
        10,
        4,
    )
    .collect();

    assert_eq!(train.len(), 900);
    assert_eq!(val.len(), 100);
    assert!(train.is_disjoint(&val));

    let all: HashSet<PathBuf> = list_images(tmp.path()).unwrap().into_iter().collect();
    let union: HashSet<PathBuf> = train.union(&val).cloned().collect();
    assert_eq!(union, all);
}

#[test]
fn finite_pipeline_yields_full_batches_then_ends() {
    let tmp = tempfile::tempdir().unwrap();
    // 40 files; nth=10/offset=4 leaves 36 for training. A single steering
    // class keeps the resampler from dropping anything.
    for i in 0..40 {
        write_capture(tmp.path(), i, 0.0);
    }

    let cfg = PipelineConfig {
        split: SplitMode::RejectNth,
        nth: 10,
        offset: 4,
        classes: 15,
        batch_size: 8,
        augment: AugmentConfig {
            target_size: (132, 99),
            flip_prob: 0.5,
            rotate_max_deg: 2.0,
            seed: None,
        },
        brightness: (-0.18, 0.18),
        indefinite: false,
        seed: Some(11),
    };
    let mut batches = build_batches(tmp.path(), &cfg).unwrap();

    let device = Default::default();
    let mut count = 0;
    while let Some(batch) = batches.next_batch::<TestBackend>(&device).unwrap() {
        assert_eq!(batch.images.dims(), [8, 3, 99, 132]);
        assert_eq!(batch.targets.dims(), [8, 15]);
        count += 1;
    }
    assert_eq!(count, 4); // floor(36 / 8), partial batch dropped
}

#[test]
fn pipeline_output_stays_in_centered_range() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..12 {
        write_capture(tmp.path(), i, -1.0);
    }

    let cfg = PipelineConfig {
        split: SplitMode::RejectNth,
        nth: 10,
        offset: 4,
        classes: 15,
        batch_size: 4,
        augment: AugmentConfig {
            target_size: (132, 99),
            flip_prob: 0.0,
            rotate_max_deg: 0.0,
            seed: None,
        },
        brightness: (-0.18, 0.18),
        indefinite: false,
        seed: Some(5),
    };
    let mut batches = build_batches(tmp.path(), &cfg).unwrap();
    let device = Default::default();
    let batch = batches
        .next_batch::<TestBackend>(&device)
        .unwrap()
        .expect("at least one batch");
    let pixels = batch.images.into_data().to_vec::<f32>().unwrap();
    for v in pixels {
        assert!((-0.5..=0.5).contains(&v), "pixel {v} outside centered range");
    }
}

#[test]
fn unlabeled_folder_errors_instead_of_hanging() {
    let tmp = tempfile::tempdir().unwrap();
    // Image files without the steering marker in the stem.
    for i in 0..4 {
        let img = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        img.save(tmp.path().join(format!("cam{i}.png"))).unwrap();
    }

    let cfg = PipelineConfig {
        split: SplitMode::RejectNth,
        nth: 10,
        offset: 4,
        classes: 15,
        batch_size: 2,
        augment: AugmentConfig {
            target_size: (132, 99),
            flip_prob: 0.5,
            rotate_max_deg: 2.0,
            seed: None,
        },
        brightness: (-0.18, 0.18),
        indefinite: true,
        seed: Some(1),
    };
    let mut batches = build_batches(tmp.path(), &cfg).unwrap();
    let device = Default::default();
    // A cycling stream with no parseable labels must surface an error
    // after one full pass rather than spinning inside the batcher.
    assert!(batches.next_batch::<TestBackend>(&device).is_err());
}

#[test]
fn indefinite_pipeline_outlives_the_file_count() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..10 {
        write_capture(tmp.path(), i, 0.5);
    }

    let cfg = PipelineConfig {
        split: SplitMode::RejectNth,
        nth: 10,
        offset: 4,
        classes: 15,
        batch_size: 6,
        augment: AugmentConfig {
            target_size: (132, 99),
            flip_prob: 0.5,
            rotate_max_deg: 2.0,
            seed: None,
        },
        brightness: (-0.18, 0.18),
        indefinite: true,
        seed: Some(3),
    };
    let mut batches = build_batches(tmp.path(), &cfg).unwrap();
    let device = Default::default();
    // 9 training files per pass; pulling 5 batches of 6 needs several
    // passes over the folder.
    for _ in 0..5 {
        let batch = batches.next_batch::<TestBackend>(&device).unwrap();
        assert!(batch.is_some());
    }
}
