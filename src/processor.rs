use crate::config::{AppConfig, OutputFormat};
use crate::detect::{class_label, Detection, Detector};
use crate::error::Result;
use crate::ocr::{PlateReader, PlateRecord, Recognizer};
use crate::output::{write_main_csv, write_main_json, write_ocr_sidecar};
use crate::scanner::collect_images;
use image::{imageops::FilterType, DynamicImage, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// One detection with everything the sinks need.  Built once, never changed.
#[derive(Debug, Clone, Serialize)]
pub struct ResultEntry {
    pub image_path: String,
    /// Empty when crops are not saved or the write failed.
    pub crop_path: String,
    pub detection: Detection,
    pub class_label: String,
    pub plate: PlateRecord,
}

/// Run detection (and OCR when `recognizer` is given) over every input image,
/// then write whichever sinks `cfg` names.
///
/// Per-image problems (unreadable file, detector failure, OCR failure,
/// debug image or crop write failure, rename failure) are logged and skipped;
/// only sink and output-directory errors abort the batch.
pub fn run_pipeline(
    cfg: &AppConfig,
    detector: &dyn Detector,
    recognizer: Option<&dyn Recognizer>,
) -> Result<Vec<ResultEntry>> {
    let mut cfg = cfg.clone();
    cfg.resolve_inputs();

    let Some(input_dir) = cfg.input_dir.clone() else {
        log::info!("Nothing to do: provide an image or an input directory.");
        return Ok(Vec::new());
    };

    let images = collect_images(&input_dir, &cfg.pattern)?;
    if images.is_empty() {
        log::info!("No input images found in {}", input_dir.display());
        return Ok(Vec::new());
    }

    for dir in [&cfg.save_pre, &cfg.save_vis, &cfg.save_crops].into_iter().flatten() {
        fs::create_dir_all(dir)?;
    }

    let reader = recognizer.map(PlateReader::new);
    if let Some(r) = &reader {
        log::info!("OCR enabled ({})", r.recognizer_name());
    }

    let mut entries: Vec<ResultEntry> = Vec::new();
    for (n, image_path) in images.iter().enumerate() {
        log::info!("[{}/{}] {}", n + 1, images.len(), image_path.display());
        process_image(&cfg, image_path, detector, reader.as_ref(), &mut entries)?;
    }

    // ── Sinks ────────────────────────────────────────────────────────────────

    if let Some(path) = &cfg.csv {
        write_main_csv(path, &entries)?;
        log::info!("CSV written: {} ({} rows)", path.display(), entries.len());
    }

    match (&cfg.out, cfg.format) {
        (Some(path), OutputFormat::Json) => {
            write_main_json(path, &entries)?;
            log::info!("JSON written: {} ({} entries)", path.display(), entries.len());
        }
        (Some(path), OutputFormat::Csv) => {
            log::warn!("{} ignored: the main output file is only written with format json", path.display());
        }
        (None, _) => {}
    }

    if let (Some(path), Some(_)) = (&cfg.ocr_out, &reader) {
        write_ocr_sidecar(path, &entries)?;
        log::info!("OCR sidecar written: {}", path.display());
    }

    Ok(entries)
}

fn process_image(
    cfg: &AppConfig,
    image_path: &Path,
    detector: &dyn Detector,
    reader: Option<&PlateReader>,
    entries: &mut Vec<ResultEntry>,
) -> Result<()> {
    let img = match image::open(image_path) {
        Ok(img) => img.to_rgb8(),
        Err(e) => {
            log::warn!("Could not read image {}: {e}", image_path.display());
            return Ok(());
        }
    };

    let detections = match detector.predict(&img, cfg.conf, cfg.square_size) {
        Ok(d) => d,
        Err(e) => {
            log::warn!("Detector {} failed on {}: {e}", detector.name(), image_path.display());
            return Ok(());
        }
    };
    let class_names = detector.class_names();
    log::debug!("{} detection(s)", detections.len());

    let stem = file_stem(image_path);

    if let Some(dir) = &cfg.save_vis {
        save_artifact(&draw_detections(&img, &detections), &dir.join(format!("{stem}_det.jpg")));
    }
    if let Some(dir) = &cfg.save_pre {
        let pre = image::imageops::resize(&img, cfg.square_size, cfg.square_size, FilterType::Triangle);
        save_artifact(&pre, &dir.join(format!("{stem}_pre.jpg")));
    }

    for (i, det) in detections.iter().enumerate() {
        let crop = crop_with_padding(&img, det);

        let mut crop_path = String::new();
        if let Some(dir) = &cfg.save_crops {
            let path = dir.join(format!("{stem}_crop{i:02}.jpg"));
            if save_artifact(&crop, &path) {
                crop_path = path.to_string_lossy().into_owned();
            }
        }

        let mut plate = PlateRecord::empty();
        if let Some(reader) = reader {
            plate = reader
                .read(&DynamicImage::ImageRgb8(crop))
                .unwrap_or_else(|e| {
                    log::warn!("OCR failed on detection {i} of {}: {e}", image_path.display());
                    PlateRecord::empty()
                });
            log::info!("  plate {:?} conf={:.3}", plate.text, plate.confidence);

            if cfg.name_with_plate && !plate.is_empty() && !crop_path.is_empty() {
                crop_path = rename_crop_with_plate(Path::new(&crop_path), &plate.text)
                    .to_string_lossy()
                    .into_owned();
            }
        }

        entries.push(ResultEntry {
            image_path: image_path.to_string_lossy().into_owned(),
            crop_path,
            detection: *det,
            class_label: class_label(&class_names, det.class_id),
            plate,
        });
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Write a debug image; a failure is logged and the batch goes on.
fn save_artifact(img: &RgbImage, path: &Path) -> bool {
    match img.save(path) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Could not write {}: {e}", path.display());
            false
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Crop bounds `(x, y, w, h)` around a detection, padded by 5 % of its
/// larger side and clamped to `0..=w-1` / `0..=h-1`.
pub fn padded_crop_bounds(det: &Detection, img_w: u32, img_h: u32) -> (u32, u32, u32, u32) {
    let pad = (0.05 * det.width().max(det.height()) as f64) as i32;
    let max_x = img_w as i32 - 1;
    let max_y = img_h as i32 - 1;
    let x1 = (det.x1 - pad).max(0);
    let y1 = (det.y1 - pad).max(0);
    let x2 = (det.x2 + pad).min(max_x);
    let y2 = (det.y2 + pad).min(max_y);
    (
        x1 as u32,
        y1 as u32,
        (x2 - x1).max(0) as u32,
        (y2 - y1).max(0) as u32,
    )
}

pub fn crop_with_padding(img: &RgbImage, det: &Detection) -> RgbImage {
    let (x, y, w, h) = padded_crop_bounds(det, img.width(), img.height());
    image::imageops::crop_imm(img, x, y, w, h).to_image()
}

/// Copy of `img` with every detection outlined by a 2 px green box.
pub fn draw_detections(img: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut vis = img.clone();
    let green = Rgb([0u8, 255, 0]);
    for d in detections {
        for inset in 0..2 {
            let w = d.width() + 1 - 2 * inset;
            let h = d.height() + 1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(d.x1 + inset, d.y1 + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut vis, rect, green);
        }
    }
    vis
}

/// Rename `<stem><ext>` to `<stem>__<plate><ext>`, keeping only alphanumerics
/// of the plate.  Returns the original path when there is nothing to add or
/// the rename fails.
pub fn rename_crop_with_plate(crop_path: &Path, plate: &str) -> PathBuf {
    let safe: String = plate.chars().filter(|c| c.is_alphanumeric()).collect();
    if safe.is_empty() {
        return crop_path.to_path_buf();
    }
    let ext = crop_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let new_path = crop_path.with_file_name(format!("{}__{safe}{ext}", file_stem(crop_path)));
    match fs::rename(crop_path, &new_path) {
        Ok(()) => new_path,
        Err(e) => {
            log::warn!("Could not rename {}: {e}", crop_path.display());
            crop_path.to_path_buf()
        }
    }
}
