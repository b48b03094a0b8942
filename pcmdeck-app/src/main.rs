mod settings;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, bail, Context};
use pcmdeck_core::{audio::device::list_output_devices, PlaybackStatus, Player};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use settings::{default_settings_path, load_settings, AppSettings};

const USAGE: &str = "Usage: pcmdeck <file.pcm|file.wav> [--settings <file.json>] [--volume <0..1>]
               [--device <name>] [--rate <hz>] [--channels <n>] [--format s16le|f32le]
               [--chunk-ms <ms>]
       pcmdeck --list-devices

Raw files default to 48000 Hz, 2 channels, s16le, e.g. the output of
  ffmpeg -i test.mp4 -ar 48000 -ac 2 -f s16le 48000_16bit_2ch.pcm
Press Enter during playback to stop.";

#[derive(Debug, Default)]
struct Args {
    input: Option<PathBuf>,
    settings_path: Option<PathBuf>,
    list_devices: bool,
    volume: Option<f32>,
    device: Option<String>,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    sample_format: Option<String>,
    chunk_ms: Option<u32>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);

    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().ok_or_else(|| anyhow!("missing value for {name}"));
        match arg.as_str() {
            "--settings" => args.settings_path = Some(PathBuf::from(value("--settings")?)),
            "--volume" => {
                args.volume = Some(value("--volume")?.parse().context("invalid value for --volume")?)
            }
            "--device" => args.device = Some(value("--device")?),
            "--rate" => {
                args.sample_rate = Some(value("--rate")?.parse().context("invalid value for --rate")?)
            }
            "--channels" => {
                args.channels = Some(
                    value("--channels")?
                        .parse()
                        .context("invalid value for --channels")?,
                )
            }
            "--format" => args.sample_format = Some(value("--format")?),
            "--chunk-ms" => {
                args.chunk_ms = Some(
                    value("--chunk-ms")?
                        .parse()
                        .context("invalid value for --chunk-ms")?,
                )
            }
            "--list-devices" => args.list_devices = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with("--") => bail!("unknown argument: {other}"),
            other => {
                if args.input.is_some() {
                    bail!("only one input file may be given");
                }
                args.input = Some(PathBuf::from(other));
            }
        }
    }
    Ok(args)
}

fn apply_overrides(settings: &mut AppSettings, args: &Args) {
    if let Some(v) = args.volume {
        settings.volume = v;
    }
    if let Some(d) = &args.device {
        settings.preferred_output_device = Some(d.clone());
    }
    if let Some(r) = args.sample_rate {
        settings.sample_rate = r;
    }
    if let Some(c) = args.channels {
        settings.channels = c;
    }
    if let Some(f) = &args.sample_format {
        settings.sample_format = f.clone();
    }
    if let Some(ms) = args.chunk_ms {
        settings.chunk_ms = ms;
    }
    settings.normalize();
}

/// Blocks until a line is entered. Returns `false` on EOF or read error, so a
/// closed or redirected stdin never stops playback.
fn wait_for_enter(mut input: impl BufRead) -> bool {
    let mut line = String::new();
    matches!(input.read_line(&mut line), Ok(n) if n > 0)
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;

    if args.list_devices {
        let devices = list_output_devices();
        if devices.is_empty() {
            println!("no output devices found");
        }
        for d in devices {
            println!("{}{}", d.name, if d.is_default { "  (default)" } else { "" });
        }
        return Ok(());
    }

    let input = args
        .input
        .clone()
        .ok_or_else(|| anyhow!("no input file given\n\n{USAGE}"))?;

    let settings_path = args
        .settings_path
        .clone()
        .unwrap_or_else(default_settings_path);
    let mut app_settings = load_settings(&settings_path);
    apply_overrides(&mut app_settings, &args);
    let config = app_settings.player_config();
    info!(
        settings_path = ?settings_path,
        format = %config.format,
        volume = config.volume,
        chunk_bytes = config.chunk_bytes,
        device = config.preferred_output_device.as_deref().unwrap_or("default"),
        "player settings loaded"
    );

    let player = Arc::new(Player::new(config)?);

    // ── Status printer ────────────────────────────────────────────────────
    let mut status_rx = player.subscribe_status();
    let printer = thread::spawn(move || loop {
        match status_rx.blocking_recv() {
            Ok(ev) => {
                match &ev.detail {
                    Some(detail) => println!("[{:?}] {detail}", ev.status),
                    None => println!("[{:?}]", ev.status),
                }
                if ev.status.is_terminal() {
                    break;
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    });

    // ── Enter to stop ─────────────────────────────────────────────────────
    {
        let player = Arc::clone(&player);
        thread::spawn(move || {
            if wait_for_enter(std::io::stdin().lock()) && player.is_running() {
                let _ = player.stop();
            }
        });
    }

    let result = player.play_file(&input);
    let _ = printer.join();

    let report = result.with_context(|| format!("playback of {} failed", input.display()))?;
    println!(
        "{:?}: {:.2}s of {} ({} underruns)",
        report.status, report.duration_secs, report.format, report.diagnostics.underruns
    );
    if report.status == PlaybackStatus::Stopped {
        info!("playback stopped by user");
    }
    Ok(())
}

fn main() {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pcmdeck=info,pcmdeck_core=info")),
        )
        .init();

    info!("pcmdeck starting");
    if let Err(e) = run() {
        eprintln!("pcmdeck: {e:#}");
        std::process::exit(1);
    }
}
