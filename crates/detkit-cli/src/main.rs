use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::{Rgb, RgbImage};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use detkit_net::{doctor as net_doctor, PortRange};
use detkit_train::{ensure_dir, AverageMeter};
use detkit_vision::{
    bbox_overlaps, doctor as vision_doctor, preprocess, BBox, BgrFrame, LetterboxOptions,
    OverlapMode, TargetShape,
};

#[derive(Debug, Parser)]
#[command(
    name = "detkit",
    version,
    about = "detkit - box overlap and letterbox preprocessing tools"
)]
struct Cli {
    /// Optional TOML config; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Doctor,
    /// Overlap matrix between two JSON box files ([[x1,y1,x2,y2], ...]).
    Overlap {
        #[arg(long)]
        a: PathBuf,
        #[arg(long)]
        b: PathBuf,
        /// iou | iof (defaults to overlap.mode)
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        aligned: bool,
    },
    /// Letterbox an image file and remap its boxes.
    Letterbox {
        #[arg(long)]
        input: PathBuf,
        /// Output PNG; relative paths land in output.dir.
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        boxes: Option<PathBuf>,
        #[arg(long)]
        target_w: Option<u32>,
        #[arg(long)]
        target_h: Option<u32>,
        /// Stretch to the target instead of padding.
        #[arg(long)]
        no_keep_ratio: bool,
    },
    /// Best-match overlap of each ground-truth box against predictions.
    Eval {
        #[arg(long)]
        pred: PathBuf,
        #[arg(long)]
        gt: PathBuf,
    },
    Net { #[command(subcommand)] cmd: NetCmd },
}

#[derive(Debug, Subcommand)]
enum NetCmd {
    HostIp,
    PortUsed {
        #[arg(long)]
        port: u16,
        #[arg(long)]
        ip: Option<IpAddr>,
    },
    PickPort,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    letterbox: LetterboxCfg,
    overlap: OverlapCfg,
    net: NetCfg,
    output: OutputCfg,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct LetterboxCfg {
    target_w: u32,
    target_h: u32,
    keep_ratio: bool,
    pad_value: f32,
}

impl Default for LetterboxCfg {
    fn default() -> Self {
        Self {
            target_w: 416,
            target_h: 416,
            keep_ratio: true,
            pad_value: detkit_vision::letterbox::PAD_VALUE,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct OverlapCfg {
    mode: String,
    match_threshold: f32,
}

impl Default for OverlapCfg {
    fn default() -> Self {
        Self { mode: "iou".into(), match_threshold: 0.5 }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct NetCfg {
    port_host: String,
    port_start: u16,
    port_end: u16,
    connect_timeout_ms: u64,
    route_target: String,
}

impl Default for NetCfg {
    fn default() -> Self {
        let range = PortRange::default();
        Self {
            port_host: "127.0.0.1".into(),
            port_start: range.start,
            port_end: range.end,
            connect_timeout_ms: 500,
            route_target: detkit_net::DEFAULT_ROUTE_TARGET.to_string(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct OutputCfg {
    dir: String,
}

impl Default for OutputCfg {
    fn default() -> Self {
        Self { dir: "out".into() }
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let Some(path) = path else { return Ok(Config::default()); };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    parse_config(&s)
}

fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Overlap { a, b, mode, aligned } => {
            overlap_cmd(&cfg, &a, &b, mode.as_deref(), aligned)?
        }
        Command::Letterbox { input, output, boxes, target_w, target_h, no_keep_ratio } => {
            let target = TargetShape {
                height: target_h.unwrap_or(cfg.letterbox.target_h),
                width: target_w.unwrap_or(cfg.letterbox.target_w),
            };
            let opts = LetterboxOptions {
                keep_ratio: cfg.letterbox.keep_ratio && !no_keep_ratio,
                correct_boxes: boxes.is_some(),
                pad_value: cfg.letterbox.pad_value,
            };
            letterbox_cmd(&cfg, &input, &output, boxes.as_deref(), target, opts)?
        }
        Command::Eval { pred, gt } => eval_cmd(&cfg, &pred, &gt)?,
        Command::Net { cmd } => net_cmd(&cfg, cmd).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    vision_doctor::check_target(cfg.letterbox.target_h, cfg.letterbox.target_w)
        .context("letterbox target")?;
    anyhow::ensure!(
        (0.0..=255.0).contains(&cfg.letterbox.pad_value),
        "letterbox.pad_value must be within 0..255"
    );
    vision_doctor::check_overlap_mode(&cfg.overlap.mode).context("overlap.mode")?;
    anyhow::ensure!(
        (0.0..=1.0).contains(&cfg.overlap.match_threshold),
        "overlap.match_threshold must be within 0..1"
    );

    net_doctor::check_port_range(cfg.net.port_start, cfg.net.port_end).context("net port range")?;
    net_doctor::check_ip(&cfg.net.port_host).context("net.port_host")?;
    if cfg.net.route_target.parse::<SocketAddr>().is_err() {
        warn!("net.route_target is not ip:port ({}); host-ip will fail", cfg.net.route_target);
    }

    ensure_dir(&cfg.output.dir)?;

    info!("doctor: OK");
    Ok(())
}

fn read_boxes(path: &Path) -> Result<Vec<BBox>> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read boxes {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse boxes {}", path.display()))
}

fn overlap_cmd(cfg: &Config, a: &Path, b: &Path, mode: Option<&str>, aligned: bool) -> Result<()> {
    let mode: OverlapMode = mode.unwrap_or(cfg.overlap.mode.as_str()).parse()?;
    let (a, b) = (read_boxes(a)?, read_boxes(b)?);
    let m = bbox_overlaps(&a, &b, mode, aligned)?;
    info!("overlap: {}x{} mode={}", m.nrows(), m.ncols(), mode.as_str());
    for row in m.rows() {
        println!("{}", serde_json::to_string(&row.to_vec())?);
    }
    Ok(())
}

fn letterbox_cmd(
    cfg: &Config,
    input: &Path,
    output: &Path,
    boxes: Option<&Path>,
    target: TargetShape,
    opts: LetterboxOptions,
) -> Result<()> {
    let img = image::open(input).with_context(|| format!("decode {}", input.display()))?;
    let (w, h) = (img.width(), img.height());
    let mut bgr = img.into_rgb8().into_raw();
    bgr.chunks_exact_mut(3).for_each(|px| px.swap(0, 2));
    let frame = BgrFrame::new(w, h, &bgr)?;

    let boxes = boxes.map(read_boxes).transpose()?;
    let out = preprocess(&frame, boxes.as_deref(), target, opts)?;

    let output = if output.is_relative() {
        Path::new(&cfg.output.dir).join(output)
    } else {
        output.to_path_buf()
    };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    to_rgb8(&out.image).save(&output).with_context(|| format!("write {}", output.display()))?;

    let m = out.meta;
    info!(
        "letterbox: {}x{} -> {}x{} (resized {}x{}, dw={} dh={}) -> {}",
        w,
        h,
        target.width,
        target.height,
        m.resized_width,
        m.resized_height,
        m.dw,
        m.dh,
        output.display()
    );
    if let Some(b) = out.boxes {
        println!("{}", serde_json::to_string(&b)?);
    }
    Ok(())
}

fn to_rgb8(img: &image::Rgb32FImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        Rgb(img.get_pixel(x, y).0.map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8))
    })
}

#[derive(Debug, serde::Serialize)]
struct MatchSummary {
    gt: usize,
    pred: usize,
    best: Vec<f32>,
    mean_best: f32,
    /// `AverageMeter` over `best`; its count starts at 1, so this is
    /// `sum / (gt + 1)`.
    meter_avg: f64,
    recall: f32,
}

fn match_summary(
    gt: &[BBox],
    pred: &[BBox],
    mode: OverlapMode,
    threshold: f32,
) -> Result<MatchSummary> {
    let m = bbox_overlaps(gt, pred, mode, false)?;
    let best: Vec<f32> =
        m.rows().into_iter().map(|r| r.iter().copied().fold(0.0, f32::max)).collect();

    let mut meter = AverageMeter::new();
    for &v in &best {
        meter.update_one(f64::from(v));
    }

    let n = best.len().max(1) as f32;
    let mean_best = best.iter().sum::<f32>() / n;
    let recall = best.iter().filter(|&&v| v >= threshold).count() as f32 / n;
    Ok(MatchSummary {
        gt: gt.len(),
        pred: pred.len(),
        best,
        mean_best,
        meter_avg: meter.avg(),
        recall,
    })
}

fn eval_cmd(cfg: &Config, pred: &Path, gt: &Path) -> Result<()> {
    let mode: OverlapMode = cfg.overlap.mode.parse()?;
    let threshold = cfg.overlap.match_threshold;
    let summary = match_summary(&read_boxes(gt)?, &read_boxes(pred)?, mode, threshold)?;
    info!(
        "eval: recall@{}={:.3} mean_best={:.3} meter_avg={:.3}",
        threshold, summary.recall, summary.mean_best, summary.meter_avg
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn net_cmd(cfg: &Config, cmd: NetCmd) -> Result<()> {
    let timeout = Duration::from_millis(cfg.net.connect_timeout_ms);
    match cmd {
        NetCmd::HostIp => {
            let target: SocketAddr =
                cfg.net.route_target.parse().context("net.route_target must be ip:port")?;
            println!("{}", detkit_net::get_host_ip_via(target).await?);
        }
        NetCmd::PortUsed { port, ip } => {
            let ip = match ip {
                Some(ip) => ip,
                None => net_doctor::check_ip(&cfg.net.port_host)?,
            };
            let used = detkit_net::is_port_used_within(ip, port, timeout).await;
            println!("{}:{} used={}", ip, port, used);
        }
        NetCmd::PickPort => {
            let ip = net_doctor::check_ip(&cfg.net.port_host)?;
            let range = PortRange::new(cfg.net.port_start, cfg.net.port_end)?;
            println!("{}", range.scan(ip, timeout).await?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!((cfg.letterbox.target_w, cfg.letterbox.target_h), (416, 416));
        assert!(cfg.letterbox.keep_ratio);
        assert_eq!(cfg.overlap.mode, "iou");
        assert_eq!((cfg.net.port_start, cfg.net.port_end), (23450, 23459));
        assert_eq!(cfg.net.route_target, "8.8.8.8:80");
    }

    #[test]
    fn partial_config_overrides() {
        let cfg = parse_config(
            r#"
            [letterbox]
            target_w = 640
            keep_ratio = false

            [overlap]
            mode = "iof"
            "#,
        )
        .unwrap();
        assert_eq!((cfg.letterbox.target_w, cfg.letterbox.target_h), (640, 416));
        assert!(!cfg.letterbox.keep_ratio);
        assert_eq!(cfg.overlap.mode, "iof");
        assert_eq!(cfg.overlap.match_threshold, 0.5);
    }

    #[test]
    fn doctor_rejects_bad_mode() {
        let mut cfg = Config::default();
        cfg.overlap.mode = "giou".into();
        assert!(doctor(&cfg).is_err());
    }

    #[test]
    fn doctor_creates_output_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.output.dir = tmp.path().join("out").to_string_lossy().into_owned();
        doctor(&cfg).unwrap();
        assert!(tmp.path().join("out").is_dir());
    }

    #[test]
    fn match_summary_picks_best_prediction() {
        let gt = [BBox::new(0.0, 0.0, 10.0, 10.0), BBox::new(100.0, 100.0, 110.0, 110.0)];
        let pred = [BBox::new(0.0, 0.0, 10.0, 20.0), BBox::new(0.0, 0.0, 10.0, 10.0)];
        let s = match_summary(&gt, &pred, OverlapMode::Iou, 0.5).unwrap();
        assert_eq!(s.best, vec![1.0, 0.0]);
        assert_eq!(s.recall, 0.5);
        assert_eq!(s.mean_best, 0.5);
        // two updates on a meter that starts at count 1
        assert!((s.meter_avg - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn match_summary_without_predictions() {
        let gt = [BBox::new(0.0, 0.0, 10.0, 10.0)];
        let s = match_summary(&gt, &[], OverlapMode::Iou, 0.5).unwrap();
        assert_eq!(s.best, vec![0.0]);
        assert_eq!(s.recall, 0.0);
        assert_eq!(s.meter_avg, 0.0);
    }

    #[test]
    fn match_summary_without_ground_truth() {
        let pred = [BBox::new(0.0, 0.0, 10.0, 10.0)];
        let s = match_summary(&[], &pred, OverlapMode::Iou, 0.5).unwrap();
        assert!(s.best.is_empty());
        assert_eq!((s.mean_best, s.meter_avg, s.recall), (0.0, 0.0, 0.0));
    }

    #[test]
    fn letterbox_writes_png_and_boxes() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in.png");
        RgbImage::from_pixel(100, 50, Rgb([255, 0, 0])).save(&input).unwrap();
        let boxes = tmp.path().join("boxes.json");
        std::fs::write(&boxes, "[[10,10,20,20]]").unwrap();
        let output = tmp.path().join("lb.png");

        let cfg = Config::default();
        let target = TargetShape::new(50, 50).unwrap();
        let opts = LetterboxOptions::default();
        letterbox_cmd(&cfg, &input, &output, Some(&boxes), target, opts).unwrap();

        let written = image::open(&output).unwrap().into_rgb8();
        assert_eq!(written.dimensions(), (50, 50));
        assert_eq!(written.get_pixel(25, 0).0, [128, 128, 128]);
        assert_eq!(written.get_pixel(25, 24).0, [255, 0, 0]);
    }
}
