//! Result sinks: main CSV, main JSON, OCR-only sidecar.

use crate::error::Result;
use crate::processor::ResultEntry;
use serde::Serialize;
use std::fs;
use std::path::Path;

pub const CSV_HEADER: [&str; 10] = [
    "image_path", "crop_path", "x1", "y1", "x2", "y2", "score", "class", "plate", "plate_conf",
];

#[derive(Serialize)]
struct JsonEntry<'a> {
    image: &'a str,
    crop_path: &'a str,
    bbox: [i32; 4],
    score: f32,
    class: &'a str,
    plate: &'a str,
    plate_conf: f64,
}

impl<'a> From<&'a ResultEntry> for JsonEntry<'a> {
    fn from(e: &'a ResultEntry) -> Self {
        JsonEntry {
            image: &e.image_path,
            crop_path: &e.crop_path,
            bbox: e.detection.bbox(),
            score: e.detection.score,
            class: &e.class_label,
            plate: &e.plate.text,
            plate_conf: e.plate.confidence,
        }
    }
}

#[derive(Serialize)]
struct SidecarEntry<'a> {
    plate: &'a str,
    conf: f64,
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// One row per detection; `score` and `plate_conf` to 4 decimals.
pub fn write_main_csv(path: &Path, entries: &[ResultEntry]) -> Result<()> {
    ensure_parent(path)?;
    let mut w = csv::Writer::from_path(path)?;
    w.write_record(CSV_HEADER)?;
    for e in entries {
        let d = &e.detection;
        w.write_record([
            e.image_path.clone(),
            e.crop_path.clone(),
            d.x1.to_string(),
            d.y1.to_string(),
            d.x2.to_string(),
            d.y2.to_string(),
            format!("{:.4}", d.score),
            e.class_label.clone(),
            e.plate.text.clone(),
            format!("{:.4}", e.plate.confidence),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Pretty-printed JSON array, one object per detection.
pub fn write_main_json(path: &Path, entries: &[ResultEntry]) -> Result<()> {
    ensure_parent(path)?;
    let rows: Vec<JsonEntry> = entries.iter().map(JsonEntry::from).collect();
    fs::write(path, serde_json::to_string_pretty(&rows)?)?;
    Ok(())
}

/// OCR-only results keyed by crop path.  Entries without a crop are left
/// out; a repeated crop path keeps its last result.
///
/// `.json` (any case) → `{crop_path: {plate, conf}}`, otherwise CSV
/// `crop_path,plate,conf`.
pub fn write_ocr_sidecar(path: &Path, entries: &[ResultEntry]) -> Result<()> {
    ensure_parent(path)?;
    let mut map = serde_json::Map::new();
    for e in entries.iter().filter(|e| !e.crop_path.is_empty()) {
        let value = serde_json::to_value(SidecarEntry {
            plate: &e.plate.text,
            conf: e.plate.confidence,
        })?;
        map.insert(e.crop_path.clone(), value);
    }

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        fs::write(path, serde_json::to_string_pretty(&map)?)?;
        return Ok(());
    }

    let mut w = csv::Writer::from_path(path)?;
    w.write_record(["crop_path", "plate", "conf"])?;
    for (crop_path, v) in &map {
        let plate = v.get("plate").and_then(|p| p.as_str()).unwrap_or("");
        let conf = v.get("conf").and_then(|c| c.as_f64()).unwrap_or(0.0);
        w.write_record([crop_path.as_str(), plate, format!("{conf:.4}").as_str()])?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;
    use crate::ocr::PlateRecord;

    fn entry(crop: &str, plate: &str, conf: f64) -> ResultEntry {
        ResultEntry {
            image_path: "in/car.jpg".to_string(),
            crop_path: crop.to_string(),
            detection: Detection { x1: 1, y1: 2, x2: 30, y2: 12, score: 0.87654, class_id: 0 },
            class_label: "plate".to_string(),
            plate: PlateRecord { text: plate.to_string(), confidence: conf },
        }
    }

    #[test]
    fn test_main_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("main.csv");
        write_main_csv(&path, &[entry("c/car_crop00.jpg", "ABC1234", 0.5), entry("", "", 0.0)]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "image_path,crop_path,x1,y1,x2,y2,score,class,plate,plate_conf");
        assert_eq!(lines[1], "in/car.jpg,c/car_crop00.jpg,1,2,30,12,0.8765,plate,ABC1234,0.5000");
        assert_eq!(lines[2], "in/car.jpg,,1,2,30,12,0.8765,plate,,0.0000");
    }

    #[test]
    fn test_main_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.json");
        write_main_json(&path, &[entry("c/x.jpg", "ABC1D23", 0.25)]).unwrap();
        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let first = &v[0];
        assert_eq!(first["image"], "in/car.jpg");
        assert_eq!(first["crop_path"], "c/x.jpg");
        assert_eq!(first["bbox"], serde_json::json!([1, 2, 30, 12]));
        assert_eq!(first["class"], "plate");
        assert_eq!(first["plate"], "ABC1D23");
        assert_eq!(first["plate_conf"], 0.25);
    }

    #[test]
    fn test_sidecar_formats() {
        let dir = tempfile::tempdir().unwrap();
        let entries = [entry("c/b.jpg", "ABC1234", 0.9), entry("", "", 0.0), entry("c/a.jpg", "", 0.0)];

        let json_path = dir.path().join("ocr.JSON");
        write_ocr_sidecar(&json_path, &entries).unwrap();
        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(v.as_object().unwrap().len(), 2);
        assert_eq!(v["c/b.jpg"]["plate"], "ABC1234");
        assert_eq!(v["c/b.jpg"]["conf"], 0.9);

        let csv_path = dir.path().join("ocr.csv");
        write_ocr_sidecar(&csv_path, &entries).unwrap();
        let text = fs::read_to_string(&csv_path).unwrap();
        // insertion order is kept
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["crop_path,plate,conf", "c/b.jpg,ABC1234,0.9000", "c/a.jpg,,0.0000"]);
    }
}
