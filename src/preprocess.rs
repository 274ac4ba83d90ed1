use image::{imageops::FilterType, DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::filter::gaussian_blur_f32;

/// Preprocessing knobs for the four OCR variants.
#[derive(Debug, Clone, Copy)]
pub struct VariantParams {
    /// Crops whose larger side is below this are upscaled 2× first.
    pub upscale_below: u32,
    pub unsharp_sigma: f32,
    pub unsharp_amount: f32,
    /// Pixels closer than this to their blurred value are left unsharpened.
    /// 0 disables the guard.
    pub unsharp_threshold: u8,
    pub clahe_clip_limit: f32,
    pub clahe_grid: u32,
    /// Odd neighbourhood size for the adaptive threshold.
    pub threshold_block: u32,
    pub threshold_offset: i32,
}

impl Default for VariantParams {
    fn default() -> Self {
        Self {
            upscale_below: 120,
            unsharp_sigma: 1.0,
            unsharp_amount: 1.2,
            unsharp_threshold: 0,
            clahe_clip_limit: 2.0,
            clahe_grid: 8,
            threshold_block: 31,
            threshold_offset: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Gray,
    Sharpened,
    Equalized,
    Binary,
}

impl VariantKind {
    pub fn name(self) -> &'static str {
        match self {
            VariantKind::Gray      => "gray",
            VariantKind::Sharpened => "sharpened",
            VariantKind::Equalized => "clahe",
            VariantKind::Binary    => "binary",
        }
    }
}

pub struct Variant {
    pub kind: VariantKind,
    pub image: GrayImage,
}

/// Build the four grayscale variants of a plate crop, always in the order
/// gray, sharpened, equalized, binary.  Voting depends on that order.
///
/// Pipeline: optional 2× bicubic upscale → grayscale →
///   (a) unsharp mask → adaptive Gaussian threshold
///   (b) CLAHE
/// where (a) and (b) run concurrently.
pub fn build_variants(crop: &DynamicImage, params: &VariantParams) -> Vec<Variant> {
    let gray = base_gray(crop, params.upscale_below);

    let ((sharp, binary), equalized) = rayon::join(
        || {
            let sharp = unsharp_mask(
                &gray,
                params.unsharp_sigma,
                params.unsharp_amount,
                params.unsharp_threshold,
            );
            let binary =
                adaptive_gaussian_threshold(&sharp, params.threshold_block, params.threshold_offset);
            (sharp, binary)
        },
        || clahe(&gray, params.clahe_clip_limit, params.clahe_grid),
    );

    vec![
        Variant { kind: VariantKind::Gray, image: gray },
        Variant { kind: VariantKind::Sharpened, image: sharp },
        Variant { kind: VariantKind::Equalized, image: equalized },
        Variant { kind: VariantKind::Binary, image: binary },
    ]
}

/// Grayscale crop, upscaled 2× when the larger side is under `upscale_below`
/// so small plates keep legible strokes.
pub fn base_gray(crop: &DynamicImage, upscale_below: u32) -> GrayImage {
    let (w, h) = (crop.width(), crop.height());
    if w.max(h) < upscale_below && w > 0 && h > 0 {
        luma_bt601(&crop.resize_exact(w * 2, h * 2, FilterType::CatmullRom).to_rgb8())
    } else {
        luma_bt601(&crop.to_rgb8())
    }
}

/// BT.601 luma (0.299 R + 0.587 G + 0.114 B) in 14-bit fixed point, rounded.
/// `image`'s own conversion uses Rec. 709 weights.
pub fn luma_bt601(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b] = img.get_pixel(x, y).0;
        let luma = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14;
        Luma([luma as u8])
    })
}

/// `(1 + amount) * img - amount * blur`, saturated.
pub fn unsharp_mask(img: &GrayImage, sigma: f32, amount: f32, threshold: u8) -> GrayImage {
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    let blur = gaussian_blur_f32(img, sigma);
    let mut out = img.clone();
    for (o, b) in out.pixels_mut().zip(blur.pixels()) {
        let orig = o[0];
        if threshold > 0 && orig.abs_diff(b[0]) < threshold {
            continue;
        }
        let v = (1.0 + amount) * orig as f32 - amount * b[0] as f32;
        o[0] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into a `grid × grid` tile layout (fewer tiles on
/// images narrower than the grid).  Each tile's histogram is clipped at
/// `clip_limit * tile_area / 256`, the excess spread evenly, and the
/// resulting per-tile lookup tables are blended bilinearly between tile
/// centres.
pub fn clahe(img: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let tiles_x = grid.clamp(1, w);
    let tiles_y = grid.clamp(1, h);

    let span = |i: u32, n: u32, len: u32| (i * len / n, (i + 1) * len / n);

    let mut luts: Vec<[u8; 256]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        let (y0, y1) = span(ty, tiles_y, h);
        for tx in 0..tiles_x {
            let (x0, x1) = span(tx, tiles_x, w);
            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[img.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let area = (x1 - x0) * (y1 - y0);
            luts.push(clipped_lut(&mut hist, area, clip_limit));
        }
    }

    let tile_w = w as f32 / tiles_x as f32;
    let tile_h = h as f32 / tiles_y as f32;
    let lut_at = |tx: u32, ty: u32, v: u8| luts[(ty * tiles_x + tx) as usize][v as usize] as f32;

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let (ty0, ty1, fy) = neighbours(y, tile_h, tiles_y);
        for x in 0..w {
            let (tx0, tx1, fx) = neighbours(x, tile_w, tiles_x);
            let v = img.get_pixel(x, y)[0];
            let top = lut_at(tx0, ty0, v) * (1.0 - fx) + lut_at(tx1, ty0, v) * fx;
            let bottom = lut_at(tx0, ty1, v) * (1.0 - fx) + lut_at(tx1, ty1, v) * fx;
            let blended = top * (1.0 - fy) + bottom * fy;
            out.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Clip a tile histogram, redistribute the excess, and turn the CDF into a
/// 0–255 lookup table.
fn clipped_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if area == 0 {
        return lut;
    }

    if clip_limit > 0.0 {
        let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > clip {
                excess += *bin - clip;
                *bin = clip;
            }
        }
        let bonus = excess / 256;
        let residual = excess % 256;
        for bin in hist.iter_mut() {
            *bin += bonus;
        }
        if residual > 0 {
            let step = (256 / residual).max(1) as usize;
            for bin in hist.iter_mut().step_by(step).take(residual as usize) {
                *bin += 1;
            }
        }
    }

    let scale = 255.0 / area as f32;
    let mut sum = 0u32;
    for (entry, bin) in lut.iter_mut().zip(hist.iter()) {
        sum += bin;
        *entry = (sum as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// The two tiles whose centres bracket coordinate `p`, and the blend weight
/// of the second one.
fn neighbours(p: u32, tile: f32, tiles: u32) -> (u32, u32, f32) {
    let pos = (p as f32 + 0.5) / tile - 0.5;
    let lo = pos.floor();
    let frac = pos - lo;
    let lo_i = lo as i64;
    let first = lo_i.clamp(0, tiles as i64 - 1) as u32;
    let second = (lo_i + 1).clamp(0, tiles as i64 - 1) as u32;
    (first, second, frac)
}

/// Binary image: 255 where `pixel > gaussian_mean - offset`, else 0.
///
/// The Gaussian weighting uses σ = 0.3·((block−1)/2 − 1) + 0.8, which puts
/// the effective kernel at `block` pixels.
pub fn adaptive_gaussian_threshold(img: &GrayImage, block: u32, offset: i32) -> GrayImage {
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    let sigma = 0.3 * ((block.max(3) as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let mean = gaussian_blur_f32(img, sigma);
    let mut out = GrayImage::new(img.width(), img.height());
    for ((o, p), m) in out.pixels_mut().zip(img.pixels()).zip(mean.pixels()) {
        o[0] = if p[0] as i32 > m[0] as i32 - offset { 255 } else { 0 };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn plate_like(w: u32, h: u32) -> DynamicImage {
        // light background with dark vertical strokes
        let img = RgbImage::from_fn(w, h, |x, _| {
            if (x / 4) % 3 == 0 {
                Rgb([20, 20, 20])
            } else {
                Rgb([230, 230, 230])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_gray_uses_bt601_weights() {
        let img = RgbImage::from_fn(3, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        });
        let gray = luma_bt601(&img);
        assert_eq!(gray.get_pixel(0, 0)[0], 76);
        assert_eq!(gray.get_pixel(1, 0)[0], 150);
        assert_eq!(gray.get_pixel(2, 0)[0], 29);
        assert_eq!(luma_bt601(&RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]))).get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_variant_order_and_count() {
        let variants = build_variants(&plate_like(200, 50), &VariantParams::default());
        let kinds: Vec<VariantKind> = variants.iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![
                VariantKind::Gray,
                VariantKind::Sharpened,
                VariantKind::Equalized,
                VariantKind::Binary
            ]
        );
        for v in &variants {
            assert_eq!(v.image.dimensions(), (200, 50));
        }
    }

    #[test]
    fn test_small_crops_are_upscaled() {
        let variants = build_variants(&plate_like(100, 30), &VariantParams::default());
        for v in &variants {
            assert_eq!(v.image.dimensions(), (200, 60));
        }
        // exactly at the limit: no upscale
        let gray = base_gray(&plate_like(120, 30), 120);
        assert_eq!(gray.dimensions(), (120, 30));
    }

    #[test]
    fn test_binary_variant_is_binary() {
        let variants = build_variants(&plate_like(160, 40), &VariantParams::default());
        let binary = &variants[3].image;
        assert!(binary.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert!(binary.pixels().any(|p| p[0] == 0));
        assert!(binary.pixels().any(|p| p[0] == 255));
    }

    #[test]
    fn test_unsharp_keeps_flat_regions() {
        let flat = GrayImage::from_pixel(40, 20, Luma([128]));
        let out = unsharp_mask(&flat, 1.0, 1.2, 0);
        assert!(out.pixels().all(|p| p[0] == 128));
    }

    #[test]
    fn test_unsharp_increases_edge_contrast() {
        let img = GrayImage::from_fn(40, 10, |x, _| if x < 20 { Luma([100]) } else { Luma([150]) });
        let out = unsharp_mask(&img, 1.0, 1.2, 0);
        assert!(out.get_pixel(19, 5)[0] < 100);
        assert!(out.get_pixel(20, 5)[0] > 150);
    }

    #[test]
    fn test_unsharp_threshold_guard() {
        let img = GrayImage::from_fn(40, 10, |x, _| if x < 20 { Luma([100]) } else { Luma([104]) });
        // every |orig - blur| is at most 4, so a threshold of 10 leaves the image alone
        let out = unsharp_mask(&img, 1.0, 1.2, 10);
        assert_eq!(out, img);
    }

    #[test]
    fn test_clahe_flat_image_stays_flat() {
        let flat = GrayImage::from_pixel(64, 64, Luma([90]));
        let out = clahe(&flat, 2.0, 8);
        let first = out.get_pixel(0, 0)[0];
        assert!(out.pixels().all(|p| p[0] == first));
    }

    #[test]
    fn test_clahe_stretches_low_contrast() {
        let img = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x % 8) as u8]));
        let out = clahe(&img, 2.0, 8);
        let (lo, hi) = out
            .pixels()
            .fold((255u8, 0u8), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
        assert!(hi - lo > 7);
    }

    #[test]
    fn test_clahe_tiny_image() {
        let img = GrayImage::from_fn(3, 2, |x, y| Luma([(x * 40 + y * 10) as u8]));
        let out = clahe(&img, 2.0, 8);
        assert_eq!(out.dimensions(), (3, 2));
    }

    #[test]
    fn test_empty_crop_yields_empty_variants() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let variants = build_variants(&empty, &VariantParams::default());
        assert_eq!(variants.len(), 4);
        assert!(variants.iter().all(|v| v.image.width() == 0));
    }
}
