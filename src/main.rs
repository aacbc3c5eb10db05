use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::bounded;
use touchless_pose::pipeline::segmentation::{self, HsvImage};
use touchless_pose::pipeline::{BackgroundStore, RecognizerControl, start_recognizer};
use touchless_pose::templates::TemplateStore;
use touchless_pose::{Frame, PipelineConfig, PoseKind, PoseRecognizer};

const USAGE: &str = "usage: touchless-pose <background-image> <frame-image>... \
[--templates FILE] [--record TYPE] [--save-background FILE]";

struct Args {
    background: PathBuf,
    frames: Vec<PathBuf>,
    templates: Option<PathBuf>,
    record: Option<PoseKind>,
    save_background: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut templates = None;
    let mut record = None;
    let mut save_background = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--templates" => templates = Some(PathBuf::from(args.next().context(USAGE)?)),
            "--record" => record = Some(parse_pose(&args.next().context(USAGE)?)?),
            "--save-background" => save_background = Some(PathBuf::from(args.next().context(USAGE)?)),
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with("--") => bail!("unknown option {flag}\n{USAGE}"),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let mut positional = positional.into_iter();
    let background = positional.next().context(USAGE)?;
    let frames: Vec<PathBuf> = positional.collect();
    if frames.is_empty() {
        bail!(USAGE);
    }
    Ok(Args {
        background,
        frames,
        templates,
        record,
        save_background,
    })
}

/// Accepts a pose code (`7`) or its name (`L`, `inverse l`).
fn parse_pose(value: &str) -> Result<PoseKind> {
    if let Ok(code) = value.parse::<i32>() {
        return PoseKind::from_code(code).ok_or_else(|| anyhow!("unknown pose code {code}"));
    }
    PoseKind::ALL
        .into_iter()
        .find(|pose| pose.display_name().eq_ignore_ascii_case(value))
        .ok_or_else(|| anyhow!("unknown pose {value:?}"))
}

fn load_frame(path: &Path) -> Result<Frame> {
    let rgb = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame::new(rgb.into_raw(), width, height))
}

fn save_background(frame: &Frame, config: &PipelineConfig, path: &Path) -> Result<()> {
    let rgb = image::RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone())
        .context("background frame has an invalid buffer")?;
    let hsv = HsvImage::from_rgb(&segmentation::downscale(&rgb, &config.segmentation));
    let mut store = BackgroundStore::new();
    store.add_frame(&hsv.data);
    store
        .save(path)
        .with_context(|| format!("failed to save background to {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();

    let args = parse_args()?;
    let config = PipelineConfig::default();

    let templates = Arc::new(TemplateStore::new());
    if let Some(path) = args.templates.as_deref().filter(|p| p.exists()) {
        match templates.load(path) {
            Ok(count) => log::info!("loaded {count} pose templates"),
            Err(err) => log::warn!("ignoring template file {}: {err}", path.display()),
        }
    }

    let background = load_frame(&args.background)?;
    if let Some(path) = &args.save_background {
        save_background(&background, &config, path)?;
    }

    let recognizer = PoseRecognizer::with_templates(config, Arc::clone(&templates));
    let (frame_tx, frame_rx) = bounded(1);
    let (control_tx, control_rx) = bounded(4);
    let (result_tx, result_rx) = bounded(1);
    let worker = start_recognizer(recognizer, frame_rx, control_rx, result_tx);

    control_tx.send(RecognizerControl::RequestBackground)?;
    frame_tx.send(background)?;
    result_rx.recv().context("recognizer stopped before capturing the background")?;

    for (i, path) in args.frames.iter().enumerate() {
        if args.record.is_some() && i + 1 == args.frames.len() {
            control_tx.send(RecognizerControl::RecordNextSkeleton)?;
        }
        frame_tx.send(load_frame(path)?)?;
        let recognition = result_rx.recv().context("recognizer stopped")?;
        println!("{}: {}", path.display(), recognition.display_text());
    }

    drop(frame_tx);
    let mut recognizer = worker
        .join()
        .map_err(|_| anyhow!("recognizer thread panicked"))?;

    if let Some(kind) = args.record {
        recognizer
            .commit_pose(kind)
            .with_context(|| format!("failed to record pose {}", kind.display_name()))?;
        println!("recorded pose {} ({})", kind.display_name(), kind.code());
        if let Some(path) = &args.templates {
            templates
                .save(path)
                .with_context(|| format!("failed to save templates to {}", path.display()))?;
        }
    }

    Ok(())
}
