mod cli;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use env_logger::Env;
use platescan_lib::config::{AppConfig, OcrBackend};
use platescan_lib::detect::command::CommandDetector;
use platescan_lib::external::ExternalCommand;
use platescan_lib::ocr::command::CommandRecognizer;
use platescan_lib::ocr::Recognizer;
use platescan_lib::processor::run_pipeline;

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    cli.apply(&mut cfg);
    cfg.resolve_inputs();
    cfg.validate()?;

    if let Some(path) = &cli.save_config {
        cfg.save(path)
            .with_context(|| format!("saving config to {}", path.display()))?;
        log::info!("Config saved to {}", path.display());
    }

    let detector_cmd = ExternalCommand::parse(cfg.detector_command.as_deref().unwrap_or_default())?;
    let detector = CommandDetector::new(detector_cmd, cfg.weights.clone(), cfg.class_names.clone());

    if cfg.video.is_some() {
        return run_video(&cfg, &detector);
    }

    let recognizer = build_recognizer(&cfg)?;

    let entries = run_pipeline(&cfg, &detector, recognizer.as_deref())?;
    let read = entries.iter().filter(|e| !e.plate.is_empty()).count();
    log::info!("Done: {} detection(s), {} plate(s) read", entries.len(), read);
    Ok(())
}

#[cfg(feature = "video")]
fn run_video(cfg: &AppConfig, detector: &CommandDetector) -> anyhow::Result<()> {
    let frames = platescan_lib::video::run_video(cfg, detector)?;
    log::info!("Done: {frames} frame(s) annotated");
    Ok(())
}

#[cfg(not(feature = "video"))]
fn run_video(_cfg: &AppConfig, _detector: &CommandDetector) -> anyhow::Result<()> {
    anyhow::bail!("this build has no video support (rebuild with --features video)")
}

fn build_recognizer(cfg: &AppConfig) -> anyhow::Result<Option<Box<dyn Recognizer>>> {
    match cfg.ocr {
        OcrBackend::None => Ok(None),
        OcrBackend::Command => {
            let command = ExternalCommand::parse(cfg.ocr_command.as_deref().unwrap_or_default())?;
            Ok(Some(Box::new(CommandRecognizer::new(command, cfg.ocr_gpu))))
        }
        #[cfg(feature = "oar")]
        OcrBackend::Oar => {
            use platescan_lib::ocr::oar::{build_pipeline, OarRecognizer};
            let models = cfg.ocr_models.as_deref().unwrap_or(std::path::Path::new("models"));
            if cfg.ocr_gpu == Some(true) {
                log::warn!("oar-ocr runs on CPU; --ocr-gpu ignored");
            }
            let pipeline = build_pipeline(models)?;
            Ok(Some(Box::new(OarRecognizer { pipeline })))
        }
        #[cfg(not(feature = "oar"))]
        OcrBackend::Oar => anyhow::bail!("this build has no oar-ocr support (rebuild with --features oar)"),
    }
}
