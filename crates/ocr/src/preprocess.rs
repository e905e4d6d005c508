use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Image too large to upscale: {width}x{height} exceeds {max} px")]
    TooLarge { width: u64, height: u64, max: u32 },
}

/// Which enhancement steps run before binarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreprocessMode {
    /// Grayscale → fit to working size → denoise → CLAHE → adaptive threshold.
    #[default]
    Full,
    /// Grayscale → adaptive threshold. Noticeably worse on small or noisy photos.
    Baseline,
}

impl FromStr for PreprocessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(PreprocessMode::Full),
            "baseline" => Ok(PreprocessMode::Baseline),
            other => Err(format!("Unknown preprocess mode: '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub mode: PreprocessMode,
    /// Images shorter than this are upscaled to exactly this height.
    pub min_height: u32,
    /// Larger photos are shrunk until their longest side fits, before any
    /// filtering. Never shrinks below `min_height`.
    pub max_working_dimension: u32,
    /// Upscaling never produces an axis longer than this.
    pub max_dimension: u32,
    /// Non-local means filter strength (`h`). Higher removes more noise and more detail.
    pub denoise_strength: f32,
    pub patch_radius: u32,
    pub search_radius: u32,
    /// CLAHE clip limit, relative to a flat histogram.
    pub clahe_clip_limit: f32,
    /// CLAHE tiles per axis.
    pub clahe_grid: u32,
    /// Adaptive threshold window is `2 * block_radius + 1` pixels square.
    pub block_radius: u32,
    /// Subtracted from the local mean before comparing.
    pub threshold_bias: i32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            mode: PreprocessMode::Full,
            min_height: 1000,
            max_working_dimension: 2800,
            max_dimension: 16384,
            denoise_strength: 10.0,
            patch_radius: 3,
            search_radius: 5,
            clahe_clip_limit: 2.0,
            clahe_grid: 8,
            block_radius: 5,
            threshold_bias: 2,
        }
    }
}

/// Turn a decoded photo into a black/white image ready for recognition.
/// Every output pixel is either 0 or 255.
pub fn preprocess(img: &DynamicImage, config: &PreprocessConfig) -> Result<GrayImage, PreprocessError> {
    let gray = img.to_luma8();

    let prepared = match config.mode {
        PreprocessMode::Baseline => gray,
        PreprocessMode::Full => {
            let fitted =
                downscale_to_working_size(gray, config.max_working_dimension, config.min_height);
            let scaled = upscale_to_min_height(fitted, config.min_height, config.max_dimension)?;
            let denoised = denoise_nl_means(
                &scaled,
                config.denoise_strength,
                config.patch_radius,
                config.search_radius,
            );
            // Equalize after denoising so CLAHE does not amplify sensor noise.
            equalize_clahe(&denoised, config.clahe_clip_limit, config.clahe_grid)
        }
    };

    Ok(adaptive_threshold(&prepared, config.block_radius, config.threshold_bias))
}

// ── Resizing ──────────────────────────────────────────────────────────────────

/// Shrink `gray` so its longest side is at most `max_side`, keeping the aspect
/// ratio. The height never drops below `min_height`, so very wide images may
/// stay wider than `max_side`.
pub fn downscale_to_working_size(gray: GrayImage, max_side: u32, min_height: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let longest = w.max(h);
    if w == 0 || h == 0 || longest <= max_side {
        return gray;
    }

    let scale = (f64::from(max_side) / f64::from(longest)).max(f64::from(min_height) / f64::from(h));
    if scale >= 1.0 {
        return gray;
    }
    let new_w = ((f64::from(w) * scale).round() as u32).max(1);
    let new_h = ((f64::from(h) * scale).round() as u32).max(1);

    debug!(from_w = w, from_h = h, to_w = new_w, to_h = new_h, "downscaling image");
    image::imageops::resize(&gray, new_w, new_h, FilterType::Lanczos3)
}

/// Uniformly scale `gray` so its height reaches `min_height`. Taller images are
/// returned untouched.
pub fn upscale_to_min_height(
    gray: GrayImage,
    min_height: u32,
    max_dimension: u32,
) -> Result<GrayImage, PreprocessError> {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 || h >= min_height {
        return Ok(gray);
    }

    let scale = f64::from(min_height) / f64::from(h);
    let new_w = ((f64::from(w) * scale).round() as u64).max(1);
    if new_w > u64::from(max_dimension) || min_height > max_dimension {
        return Err(PreprocessError::TooLarge {
            width: new_w,
            height: u64::from(min_height),
            max: max_dimension,
        });
    }

    debug!(from_w = w, from_h = h, to_w = new_w, to_h = min_height, "upscaling image");
    Ok(image::imageops::resize(&gray, new_w as u32, min_height, FilterType::CatmullRom))
}

// ── Denoising ─────────────────────────────────────────────────────────────────

/// Non-local means denoising.
///
/// Each pixel becomes a weighted mean of the pixels in its search window, where
/// the weight decays with the squared distance between the two surrounding
/// patches. Patch distances are computed per search offset with an integral
/// image, so the cost is `O(pixels * window²)` independent of patch size.
pub fn denoise_nl_means(
    img: &GrayImage,
    strength: f32,
    patch_radius: u32,
    search_radius: u32,
) -> GrayImage {
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w == 0 || h == 0 {
        return img.clone();
    }

    let src = img.as_raw();
    let h2 = (strength * strength).max(f32::EPSILON);
    // Indexed by mean squared patch difference, 0..=255².
    let weight_lut: Vec<f32> = (0..=255u32 * 255).map(|d| (-(d as f32) / h2).exp()).collect();

    let pr = patch_radius as usize;
    let sr = search_radius as i64;

    let mut acc = vec![0f32; w * h];
    let mut weights = vec![0f32; w * h];
    let mut shifted = vec![0u8; w * h];
    // |p - q| per pixel; the squared integral of it gives patch distances.
    let mut diff = GrayImage::new(w as u32, h as u32);

    for dy in -sr..=sr {
        for dx in -sr..=sr {
            let diff_raw: &mut [u8] = &mut diff;
            for y in 0..h {
                let sy = clamp_offset(y, dy, h);
                for x in 0..w {
                    let sx = clamp_offset(x, dx, w);
                    let i = y * w + x;
                    let v = src[sy * w + sx];
                    shifted[i] = v;
                    diff_raw[i] = src[i].abs_diff(v);
                }
            }
            let table: Image<Luma<u64>> = integral_squared_image::<_, u64>(&diff);

            for y in 0..h {
                let (y0, y1) = window(y, pr, h);
                for x in 0..w {
                    let (x0, x1) = window(x, pr, w);
                    let count = u64::from((y1 - y0 + 1) * (x1 - x0 + 1));
                    let dist = sum_image_pixels(&table, x0, y0, x1, y1)[0] / count;
                    let weight = weight_lut[dist as usize];
                    let i = y * w + x;
                    acc[i] += weight * f32::from(shifted[i]);
                    weights[i] += weight;
                }
            }
        }
    }

    // The zero offset always contributes weight 1, so `weights` is never zero.
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let i = y as usize * w + x as usize;
        Luma([(acc[i] / weights[i]).round().clamp(0.0, 255.0) as u8])
    })
}

// ── Contrast ──────────────────────────────────────────────────────────────────

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into `grid × grid` tiles; each tile gets its own
/// equalization curve with histogram bins clipped at
/// `clip_limit * tile_area / 256` and the excess spread evenly over all bins.
/// Pixels are mapped by bilinear interpolation between the four nearest tile
/// curves so tile borders do not show.
pub fn equalize_clahe(img: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w == 0 || h == 0 {
        return img.clone();
    }

    let grid = grid.max(1) as usize;
    let tile_w = w.div_ceil(grid);
    let tile_h = h.div_ceil(grid);
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    let mut curves = vec![[0f32; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = [0f32; 256];
            let mut area = 0f32;
            for y in ty * tile_h..((ty + 1) * tile_h).min(h) {
                for x in tx * tile_w..((tx + 1) * tile_w).min(w) {
                    hist[img.get_pixel(x as u32, y as u32)[0] as usize] += 1.0;
                    area += 1.0;
                }
            }
            curves[ty * tiles_x + tx] = clipped_curve(&hist, area, clip_limit);
        }
    }

    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let (tx0, tx1, ax) = tile_neighbors(x as usize, tile_w, tiles_x);
        let (ty0, ty1, ay) = tile_neighbors(y as usize, tile_h, tiles_y);
        let v = img.get_pixel(x, y)[0] as usize;

        let top = (1.0 - ax) * curves[ty0 * tiles_x + tx0][v] + ax * curves[ty0 * tiles_x + tx1][v];
        let bottom =
            (1.0 - ax) * curves[ty1 * tiles_x + tx0][v] + ax * curves[ty1 * tiles_x + tx1][v];
        Luma([((1.0 - ay) * top + ay * bottom).round().clamp(0.0, 255.0) as u8])
    })
}

fn clipped_curve(hist: &[f32; 256], area: f32, clip_limit: f32) -> [f32; 256] {
    let limit = (clip_limit * area / 256.0).max(1.0);
    let excess: f32 = hist.iter().map(|&c| (c - limit).max(0.0)).sum();
    let spread = excess / 256.0;

    let mut curve = [0f32; 256];
    let mut cdf = 0f32;
    for (v, &count) in hist.iter().enumerate() {
        cdf += count.min(limit) + spread;
        curve[v] = (cdf * 255.0 / area).clamp(0.0, 255.0);
    }
    curve
}

/// Indices of the two tiles whose centers bracket `pos`, and the blend factor
/// toward the second one.
fn tile_neighbors(pos: usize, tile: usize, tiles: usize) -> (usize, usize, f32) {
    let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
    if f < 0.0 {
        (0, 0, 0.0)
    } else if f >= (tiles - 1) as f32 {
        (tiles - 1, tiles - 1, 0.0)
    } else {
        let i = f.floor() as usize;
        (i, i + 1, f - i as f32)
    }
}

// ── Binarization ──────────────────────────────────────────────────────────────

/// Local-mean thresholding: a pixel is white when it is brighter than the mean
/// of its `(2r + 1)²` neighbourhood minus `bias`. Windows are clipped at the
/// image border.
pub fn adaptive_threshold(img: &GrayImage, block_radius: u32, bias: i32) -> GrayImage {
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w == 0 || h == 0 {
        return img.clone();
    }

    let table: Image<Luma<u64>> = integral_image::<_, u64>(img);

    let r = block_radius as usize;
    let bias = i64::from(bias);
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let (x0, x1) = window(x as usize, r, w);
        let (y0, y1) = window(y as usize, r, h);
        let count = i64::from((x1 - x0 + 1) * (y1 - y0 + 1));
        let sum = sum_image_pixels(&table, x0, y0, x1, y1)[0] as i64;
        let p = i64::from(img.get_pixel(x, y)[0]);
        // p > sum / count - bias, kept in integers.
        if p * count > sum - bias * count {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

// ── Window helpers ────────────────────────────────────────────────────────────

/// Inclusive range `[c - r, c + r]` clipped to `0..len`, as integral-image
/// coordinates.
fn window(c: usize, r: usize, len: usize) -> (u32, u32) {
    (c.saturating_sub(r) as u32, (c + r).min(len - 1) as u32)
}

fn clamp_offset(c: usize, delta: i64, len: usize) -> usize {
    (c as i64 + delta).clamp(0, len as i64 - 1) as usize
}
