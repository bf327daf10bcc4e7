//! Image decode and geometric augmentation.

use std::path::PathBuf;

use image::imageops::FilterType;
use image::RgbImage;
use rand::{Rng, SeedableRng};

use crate::error::{DatasetResult, PipelineError};
use crate::pipeline::label::parse_steering;

/// A decoded, augmented sample: CHW pixels in [0, 1] plus its steering value.
#[derive(Debug, Clone)]
pub struct PixelSample {
    pub pixels: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub steering: f32,
}

/// Per-sample geometric augmentation settings.
#[derive(Debug, Clone)]
pub struct AugmentConfig {
    /// Target (width, height) the network expects.
    pub target_size: (u32, u32),
    /// Probability of a horizontal flip. A flip mirrors the scene, so the
    /// steering value is negated alongside it.
    pub flip_prob: f32,
    /// Max rotation angle in degrees; the draw is uniform in [-max, max].
    /// Zero disables rotation.
    pub rotate_max_deg: f32,
    /// Seed for reproducible augmentation. None draws from the OS.
    pub seed: Option<u64>,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        AugmentConfig {
            target_size: (132, 99),
            flip_prob: 0.5,
            rotate_max_deg: 4.0,
            seed: None,
        }
    }
}

/// Iterator adapter: decodes each file and applies flip, rotate, resize.
///
/// Decode failures surface as errors; a bad file aborts the run rather
/// than being silently dropped.
pub struct DecodeAugment<I> {
    upstream: I,
    cfg: AugmentConfig,
    rng: rand::rngs::StdRng,
}

impl<I> DecodeAugment<I> {
    pub fn new(upstream: I, cfg: AugmentConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
        };
        DecodeAugment { upstream, cfg, rng }
    }

    fn process(&mut self, path: PathBuf) -> DatasetResult<PixelSample> {
        let mut steering = parse_steering(&path)?;
        let img = image::open(&path)
            .map_err(|e| PipelineError::Image {
                path: path.clone(),
                source: e,
            })?
            .to_rgb8();
        let img = augment_image(img, &mut steering, &self.cfg, &mut self.rng);
        Ok(sample_from_image(&img, steering))
    }
}

impl<I: Iterator<Item = DatasetResult<PathBuf>>> Iterator for DecodeAugment<I> {
    type Item = DatasetResult<PixelSample>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.upstream.next()? {
            Ok(path) => Some(self.process(path)),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Apply the configured augmentations and resize to the target resolution.
pub fn augment_image(
    mut img: RgbImage,
    steering: &mut f32,
    cfg: &AugmentConfig,
    rng: &mut dyn rand::RngCore,
) -> RgbImage {
    maybe_hflip(&mut img, steering, cfg.flip_prob, rng);
    maybe_rotate(&mut img, cfg.rotate_max_deg, rng);
    let (w, h) = cfg.target_size;
    if img.dimensions() != (w, h) {
        img = image::imageops::resize(&img, w, h, FilterType::Triangle);
    }
    img
}

/// Convert an RGB image to a CHW float buffer in [0, 1].
pub fn sample_from_image(img: &RgbImage, steering: f32) -> PixelSample {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut pixels = vec![0.0f32; plane * 3];
    for (x, y, pixel) in img.enumerate_pixels() {
        let base = (y * width + x) as usize;
        pixels[base] = pixel[0] as f32 / 255.0;
        pixels[plane + base] = pixel[1] as f32 / 255.0;
        pixels[2 * plane + base] = pixel[2] as f32 / 255.0;
    }
    PixelSample {
        pixels,
        width,
        height,
        steering,
    }
}

pub(crate) fn maybe_hflip(
    img: &mut RgbImage,
    steering: &mut f32,
    prob: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) < prob {
        image::imageops::flip_horizontal_in_place(img);
        *steering = -*steering;
    }
}

pub(crate) fn maybe_rotate(img: &mut RgbImage, max_deg: f32, rng: &mut dyn rand::RngCore) {
    if max_deg <= 0.0 {
        return;
    }
    let angle = rng.random_range(-max_deg..max_deg).to_radians();
    *img = rotate_about_center(img, angle);
}

/// Rotate about the image center with bilinear sampling; uncovered corners
/// are filled with black.
fn rotate_about_center(img: &RgbImage, angle: f32) -> RgbImage {
    let (w, h) = img.dimensions();
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;
    let (sin, cos) = angle.sin_cos();

    let mut out = RgbImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            // Inverse mapping: where in the source does this pixel come from?
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let sx = cos * dx + sin * dy + cx;
            let sy = -sin * dx + cos * dy + cy;
            out.put_pixel(x, y, bilinear(img, sx, sy));
        }
    }
    out
}

fn bilinear(img: &RgbImage, x: f32, y: f32) -> image::Rgb<u8> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return image::Rgb([0, 0, 0]);
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let mut channels = [0u8; 3];
    for (c, out) in channels.iter_mut().enumerate() {
        let p00 = img.get_pixel(x0, y0)[c] as f32;
        let p10 = img.get_pixel(x1, y0)[c] as f32;
        let p01 = img.get_pixel(x0, y1)[c] as f32;
        let p11 = img.get_pixel(x1, y1)[c] as f32;
        let top = p00 * (1.0 - fx) + p10 * fx;
        let bottom = p01 * (1.0 - fx) + p11 * fx;
        *out = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    image::Rgb(channels)
}
