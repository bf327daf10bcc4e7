//! Class-balance resampling over the filename stream.

use std::path::PathBuf;

use rand::{Rng, SeedableRng};

use crate::error::DatasetResult;
use crate::pipeline::label::class_for_path;

/// Consecutive parse failures tolerated before the stream gives up.
/// Pipeline construction tightens this to the enumeration length.
pub(crate) const DEFAULT_SKIP_LIMIT: usize = 10_000;

/// Iterator adapter that rebalances class frequencies.
///
/// Tracks how often each steering class has been observed and accepts each
/// incoming file with probability `min_nonzero_count / count[class]`, so
/// over a long stream every class that occurs at all is emitted at close to
/// equal rates. Classes absent from the data simply never occur; nothing
/// waits for them. Files whose label cannot be parsed are skipped with a
/// warning, but a run of consecutive failures longer than the skip limit
/// means the folder has no usable labels at all: the stream then surfaces
/// the parse error instead of spinning forever on a cycling upstream.
pub struct EqualizeClasses<I> {
    upstream: I,
    counts: Vec<u64>,
    classes: usize,
    rng: rand::rngs::StdRng,
    warned_unparseable: bool,
    consecutive_skips: usize,
    skip_limit: usize,
    failed: bool,
}

impl<I> EqualizeClasses<I> {
    pub fn new(upstream: I, classes: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
        };
        EqualizeClasses {
            upstream,
            counts: vec![0; classes],
            classes,
            rng,
            warned_unparseable: false,
            consecutive_skips: 0,
            skip_limit: DEFAULT_SKIP_LIMIT,
            failed: false,
        }
    }

    /// Cap on consecutive unparseable files; one enumeration length is
    /// enough to prove a cycling upstream will never produce a label.
    pub fn with_skip_limit(mut self, limit: usize) -> Self {
        self.skip_limit = limit.max(1);
        self
    }

    fn accept_probability(&self, class: usize) -> f64 {
        let min_seen = self
            .counts
            .iter()
            .copied()
            .filter(|&c| c > 0)
            .min()
            .unwrap_or(1);
        min_seen as f64 / self.counts[class] as f64
    }
}

impl<I: Iterator<Item = PathBuf>> Iterator for EqualizeClasses<I> {
    type Item = DatasetResult<PathBuf>;

    fn next(&mut self) -> Option<DatasetResult<PathBuf>> {
        if self.failed {
            return None;
        }
        loop {
            let path = self.upstream.next()?;
            let class = match class_for_path(&path, self.classes) {
                Ok(class) => {
                    self.consecutive_skips = 0;
                    class
                }
                Err(e) => {
                    if !self.warned_unparseable {
                        tracing::warn!("skipping unlabeled file: {e}");
                        self.warned_unparseable = true;
                    }
                    self.consecutive_skips += 1;
                    if self.consecutive_skips > self.skip_limit {
                        self.failed = true;
                        return Some(Err(e));
                    }
                    continue;
                }
            };
            self.counts[class] += 1;
            let p = self.accept_probability(class);
            if p >= 1.0 || self.rng.random_range(0.0..1.0) < p {
                return Some(Ok(path));
            }
        }
    }
}
