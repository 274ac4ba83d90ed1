fn main() {
    // Only the `oar` backend needs model files on disk.
    println!("cargo:rerun-if-env-changed=SKIP_MODEL_DOWNLOAD");
    if std::env::var_os("CARGO_FEATURE_OAR").is_none() {
        return;
    }
    if std::env::var_os("SKIP_MODEL_DOWNLOAD").is_some() {
        return;
    }
    download_models();
}

// ── Model download ────────────────────────────────────────────────────────────

const MODEL_BASE: &str =
    "https://github.com/GreatV/oar-ocr/releases/download/v0.3.0";

/// Recognition-only: plate crops are already the text area, so the text
/// detection model is not fetched.
const MODELS: &[&str] = &["pp-ocrv5_mobile_rec.onnx", "ppocrv5_dict.txt"];

fn download_models() {
    // CARGO_MANIFEST_DIR keeps the path stable regardless of where cargo runs.
    let manifest = match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(m) => m,
        Err(_) => return,
    };
    let models_dir = std::path::Path::new(&manifest).join("models");
    if let Err(e) = std::fs::create_dir_all(&models_dir) {
        println!("cargo:warning=oar-ocr: could not create models/: {e}");
        return;
    }

    for filename in MODELS {
        let dest = models_dir.join(filename);
        println!("cargo:rerun-if-changed=models/{filename}");

        if dest.exists() {
            continue;
        }

        let url = format!("{MODEL_BASE}/{filename}");
        println!("cargo:warning=oar-ocr: downloading {filename}…");

        // A failed download is not a build failure: the binary reports the
        // missing model directory when the backend is constructed.
        let resp = match ureq::get(&url).call() {
            Ok(r) => r,
            Err(e) => {
                println!("cargo:warning=oar-ocr: failed to download {filename}: {e}");
                continue;
            }
        };

        let mut file = match std::fs::File::create(&dest) {
            Ok(f) => f,
            Err(e) => {
                println!("cargo:warning=oar-ocr: could not create {filename}: {e}");
                continue;
            }
        };

        if let Err(e) = std::io::copy(&mut resp.into_reader(), &mut file) {
            println!("cargo:warning=oar-ocr: failed to write {filename}: {e}");
            let _ = std::fs::remove_file(&dest);
            continue;
        }

        println!("cargo:warning=oar-ocr: {filename} ready");
    }
}
