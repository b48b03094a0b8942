mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pcmdeck_core::{
    PcmFormat, PlaybackError, PlaybackStatus, Player, PlayerConfig, RawPcmReader,
};
use tokio::sync::broadcast::{self, error::TryRecvError};

use common::{patterned_stream, SimulatedCallback};

fn small_chunk_player() -> Player {
    Player::new(PlayerConfig {
        chunk_bytes: 64,
        ..PlayerConfig::default()
    })
    .expect("valid config")
}

fn drain_events(rx: &mut broadcast::Receiver<pcmdeck_core::PlaybackStatusEvent>) -> Vec<PlaybackStatus> {
    let mut seen = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => seen.push(ev.status),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return seen,
        }
    }
}

#[test]
fn plays_source_to_completion() {
    let player = small_chunk_player();
    let mut events = player.subscribe_status();
    let input = patterned_stream(10, 64);
    let delivered = Arc::new(Mutex::new(Vec::new()));

    let sink_delivered = Arc::clone(&delivered);
    let report = player
        .play_source(
            Box::new(RawPcmReader::new(Cursor::new(input.clone()), PcmFormat::default())),
            move |sync, diagnostics, format| {
                assert_eq!(format, PcmFormat::default());
                Ok(SimulatedCallback::start(
                    sync,
                    diagnostics,
                    16,
                    Duration::from_millis(1),
                    sink_delivered,
                ))
            },
        )
        .expect("playback failed");

    assert_eq!(report.status, PlaybackStatus::Finished);
    assert_eq!(*delivered.lock(), input);
    assert_eq!(report.diagnostics.bytes_read, input.len() as u64);
    assert_eq!(report.diagnostics.chunks_filled, 10);
    assert_eq!(report.diagnostics.contended_drains, 0);
    assert!(!player.is_running());

    assert_eq!(
        drain_events(&mut events),
        vec![
            PlaybackStatus::Playing,
            PlaybackStatus::Draining,
            PlaybackStatus::Finished
        ]
    );
    assert_eq!(player.status(), PlaybackStatus::Finished);
}

#[test]
fn stop_from_another_thread_cancels_playback() {
    let player = Arc::new(small_chunk_player());
    let delivered = Arc::new(Mutex::new(Vec::new()));

    let stopper = {
        let player = Arc::clone(&player);
        thread::spawn(move || {
            let start = Instant::now();
            while player.status() != PlaybackStatus::Playing {
                assert!(start.elapsed() < Duration::from_secs(2), "never started");
                thread::sleep(Duration::from_millis(1));
            }
            thread::sleep(Duration::from_millis(20));
            player.stop().expect("stop while running");
        })
    };

    let sink_delivered = Arc::clone(&delivered);
    let report = player
        .play_source(
            // Endless input: only stop() can end this playback.
            Box::new(RawPcmReader::new(std::io::repeat(0x11), PcmFormat::default())),
            move |sync, diagnostics, _format| {
                Ok(SimulatedCallback::start(
                    sync,
                    diagnostics,
                    32,
                    Duration::from_millis(2),
                    sink_delivered,
                ))
            },
        )
        .expect("playback failed");

    stopper.join().unwrap();
    assert_eq!(report.status, PlaybackStatus::Stopped);
    assert!(delivered.lock().iter().all(|b| *b == 0x11));
    assert!(matches!(player.stop(), Err(PlaybackError::NotRunning)));
}

#[test]
fn output_open_failure_is_fatal() {
    let player = small_chunk_player();
    let result = player.play_source(
        Box::new(RawPcmReader::new(Cursor::new(vec![0u8; 256]), PcmFormat::default())),
        |_sync, _diagnostics, _format| -> pcmdeck_core::error::Result<SimulatedCallback> {
            Err(PlaybackError::NoDefaultOutputDevice)
        },
    );

    assert!(matches!(result, Err(PlaybackError::NoDefaultOutputDevice)));
    assert_eq!(player.status(), PlaybackStatus::Error);
    assert!(!player.is_running());
}

#[test]
fn missing_file_is_fatal() {
    let player = small_chunk_player();
    let result = player.play_file(std::path::Path::new("/nonexistent/input.pcm"));
    assert!(matches!(result, Err(PlaybackError::SourceOpen { .. })));
    assert_eq!(player.status(), PlaybackStatus::Error);
}

#[test]
fn half_volume_is_applied_end_to_end() {
    let player = Player::new(PlayerConfig {
        chunk_bytes: 16,
        volume: 0.5,
        ..PlayerConfig::default()
    })
    .unwrap();
    let samples: Vec<i16> = (0..32).map(|i| (i * 200) as i16).collect();
    let input: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let delivered = Arc::new(Mutex::new(Vec::new()));

    let sink_delivered = Arc::clone(&delivered);
    player
        .play_source(
            Box::new(RawPcmReader::new(Cursor::new(input), PcmFormat::default())),
            move |sync, diagnostics, _| {
                Ok(SimulatedCallback::start(
                    sync,
                    diagnostics,
                    8,
                    Duration::from_millis(1),
                    sink_delivered,
                ))
            },
        )
        .unwrap();

    let out: Vec<i16> = delivered
        .lock()
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    let expected: Vec<i16> = samples.iter().map(|s| s / 2).collect();
    assert_eq!(out, expected);
}
