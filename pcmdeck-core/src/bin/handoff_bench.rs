//! Headless soak run of the double-buffer hand-off.
//!
//! A plain thread stands in for the audio callback and asks for one period
//! worth of bytes every `--period-ms`; the reader loop feeds it from a
//! synthetic source that can be slowed down with `--reader-delay-ms`.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use pcmdeck_core::{
    audio::fill_output,
    buffering::{DoubleBuffer, DEFAULT_CHUNK_BYTES},
    engine::producer::{self, DiagnosticsSnapshot, PlaybackDiagnostics, ProducerContext},
    PcmFormat, RawPcmReader,
};
use serde::Serialize;

#[derive(Debug)]
struct Args {
    seconds: f64,
    chunk_bytes: usize,
    period_ms: u64,
    reader_delay_ms: u64,
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    audio_seconds: f64,
    wall_seconds: f64,
    chunk_bytes: usize,
    period_ms: u64,
    request_bytes: usize,
    reader_delay_ms: u64,
    p50_drain_us: f64,
    p99_drain_us: f64,
    max_drain_us: f64,
    diagnostics: DiagnosticsSnapshot,
}

/// Deterministic ramp, optionally sleeping before every read.
struct SyntheticPcm {
    remaining: usize,
    next: u8,
    delay: Duration,
}

impl Read for SyntheticPcm {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let n = buf.len().min(self.remaining);
        for b in &mut buf[..n] {
            *b = self.next;
            self.next = self.next.wrapping_add(1);
        }
        self.remaining -= n;
        Ok(n)
    }
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        seconds: 5.0,
        chunk_bytes: DEFAULT_CHUNK_BYTES,
        period_ms: 10,
        reader_delay_ms: 0,
        output: None,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().ok_or_else(|| format!("missing value for {name}"));
        match arg.as_str() {
            "--seconds" => {
                args.seconds = value("--seconds")?
                    .parse::<f64>()
                    .map_err(|_| "invalid value for --seconds".to_string())?
                    .clamp(0.1, 600.0);
            }
            "--chunk-bytes" => {
                args.chunk_bytes = value("--chunk-bytes")?
                    .parse()
                    .map_err(|_| "invalid value for --chunk-bytes".to_string())?;
            }
            "--period-ms" => {
                args.period_ms = value("--period-ms")?
                    .parse::<u64>()
                    .map_err(|_| "invalid value for --period-ms".to_string())?
                    .clamp(1, 100);
            }
            "--reader-delay-ms" => {
                args.reader_delay_ms = value("--reader-delay-ms")?
                    .parse()
                    .map_err(|_| "invalid value for --reader-delay-ms".to_string())?;
            }
            "--output" => args.output = Some(PathBuf::from(value("--output")?)),
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p pcmdeck-core --bin handoff_bench -- \\
  [--seconds <s>] [--chunk-bytes <n>] [--period-ms <ms>] [--reader-delay-ms <ms>] [--output <file.json>]"
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn run() -> Result<(), String> {
    let args = parse_args()?;
    let format = PcmFormat::default();
    let chunk_bytes = format.align_to_frame(args.chunk_bytes).max(format.frame_bytes());
    let total_bytes = format.align_to_frame((args.seconds * format.bytes_per_second() as f64) as usize);
    let request_bytes = format.align_to_frame(format.bytes_per_second() * args.period_ms as usize / 1000);

    println!(
        "Running hand-off soak: {:.1}s of {format}, chunk={chunk_bytes}B, request={request_bytes}B every {}ms",
        args.seconds, args.period_ms
    );

    let sync = Arc::new(DoubleBuffer::new(chunk_bytes, format.sample_format, 1.0));
    let diagnostics = Arc::new(PlaybackDiagnostics::default());
    let done = Arc::new(AtomicBool::new(false));

    let consumer = {
        let sync = Arc::clone(&sync);
        let diagnostics = Arc::clone(&diagnostics);
        let done = Arc::clone(&done);
        let period = Duration::from_millis(args.period_ms);
        thread::spawn(move || {
            let mut out = vec![0u8; request_bytes];
            let mut drain_us = Vec::new();
            while !done.load(Ordering::Acquire) {
                let started = Instant::now();
                fill_output(&sync, &diagnostics, &mut out);
                drain_us.push(started.elapsed().as_secs_f64() * 1e6);
                thread::sleep(period);
            }
            drain_us
        })
    };

    let started = Instant::now();
    let source = SyntheticPcm {
        remaining: total_bytes,
        next: 0,
        delay: Duration::from_millis(args.reader_delay_ms),
    };
    producer::run(ProducerContext {
        source: Box::new(RawPcmReader::new(source, format)),
        sync: Arc::clone(&sync),
        diagnostics: Arc::clone(&diagnostics),
    })
    .map_err(|e| e.to_string())?;
    sync.wait_drained().map_err(|e| e.to_string())?;
    let wall_seconds = started.elapsed().as_secs_f64();

    done.store(true, Ordering::Release);
    let drain_us = consumer.join().map_err(|_| "consumer thread panicked".to_string())?;

    let summary = Summary {
        audio_seconds: format.duration_secs(total_bytes),
        wall_seconds,
        chunk_bytes,
        period_ms: args.period_ms,
        request_bytes,
        reader_delay_ms: args.reader_delay_ms,
        p50_drain_us: percentile(&drain_us, 0.50),
        p99_drain_us: percentile(&drain_us, 0.99),
        max_drain_us: drain_us.iter().copied().fold(0.0, f64::max),
        diagnostics: diagnostics.snapshot(),
    };

    println!(
        "Done. callbacks={} underruns={} delivered={}B p99 drain={:.1}us",
        summary.diagnostics.callbacks,
        summary.diagnostics.underruns,
        summary.diagnostics.bytes_delivered,
        summary.p99_drain_us
    );

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote soak report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("handoff_bench failed: {e}");
        std::process::exit(1);
    }
}
