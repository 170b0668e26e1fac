// src/main.rs

mod config;
mod controller;
mod detector;
mod filter;
mod fusion;
mod pipeline;
mod transport;
mod types;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use controller::Command;
use fusion::Homography;
use pipeline::FollowerPipeline;
use tracing::{debug, info, warn};
use transport::{CommandSink, TcpVideoSource};

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = types::Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(log_directive(&config.logging.level))
        .init();

    info!("🤖 Target Follower starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Control gains: desired_time={:.1}s stop={:.0}cm max_vx={:.2} wz_gain={:.2}",
        config.control.desired_time_s,
        config.control.stop_distance_cm,
        config.control.max_vx,
        config.control.wz_gain
    );
    if config.runtime.gui {
        warn!("runtime.gui is set but this build has no display; overlay text goes to the debug log");
    }

    // Interrupt → orderly socket shutdown
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .context("failed to install signal handler")?;
    }

    // Homography is optional: width-only distance is a valid permanent mode
    let homography = match &config.geometry.homography_path {
        Some(path) => match Homography::load(path) {
            Ok(h) => {
                info!("✓ Homography loaded from {}", path);
                Some(h)
            }
            Err(e) => {
                warn!(
                    "cannot load homography ({}); falling back to width-based distance",
                    e
                );
                None
            }
        },
        None => {
            info!("No homography configured; using width-based distance only");
            None
        }
    };

    let mut detector = detector::build(&config.detector)?;

    let mut video = TcpVideoSource::new(
        &config.video.host,
        config.video.port,
        Duration::from_secs_f64(config.video.connect_timeout_s),
        Duration::from_secs_f64(config.video.read_timeout_s),
        Duration::from_secs_f64(config.video.reconnect_delay_s),
        running.clone(),
    );
    let mut sink = CommandSink::new(
        &config.command.host,
        config.command.port,
        config.command.format,
        config.control.stop_distance_cm,
        Duration::from_secs_f64(config.command.connect_timeout_s),
        Duration::from_secs_f64(config.command.reconnect_delay_s),
        config.runtime.print_cmd,
        running.clone(),
    );

    if !video.connect() || !sink.connect() {
        info!("interrupted before startup finished");
        return Ok(());
    }

    let mut pipeline = FollowerPipeline::new(&config, homography);
    info!("✓ Pipeline ready, entering control loop");

    while running.load(Ordering::SeqCst) {
        // 1) Frame in. A missed frame still produces exactly one command
        //    (safe STOP), then the link reconnects and the cycle is skipped.
        let payload = match video.read_frame() {
            Some(p) => p,
            None => {
                send_safe_stop(&mut sink);
                if !video.connect() {
                    break;
                }
                continue;
            }
        };

        // 2) Decode. A corrupt payload is a skipped cycle, not a crash.
        let image = match image::load_from_memory(&payload) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                warn!("frame decode failed: {}; skipping cycle", e);
                send_safe_stop(&mut sink);
                continue;
            }
        };

        // 3) Detect (throttled), fuse, filter, decide. Detector trouble is
        //    "no target", never fatal.
        let detections = if pipeline.should_run_detector() {
            match detector.detect(&image) {
                Ok(dets) => Some(dets),
                Err(e) => {
                    warn!("detector failed: {}; treating as no target", e);
                    Some(Vec::new())
                }
            }
        } else {
            None
        };

        let cmd = pipeline.process(detections.as_deref(), image.width(), image.height());
        debug!("{}", cmd.reason);

        // 4) Command out. The sink already reconnected-and-retried once;
        //    a second failure just skips this cycle.
        if let Err(e) = sink.send(&cmd) {
            warn!("command send failed: {}; skipping cycle", e);
        }
    }

    info!("shutting down");
    video.close();
    sink.close();
    Ok(())
}

fn send_safe_stop(sink: &mut CommandSink) {
    if let Err(e) = sink.send(&Command::stop_no_data()) {
        warn!("safe stop not delivered: {}", e);
    }
}

/// Filter directive scoped to this crate's own events. Event targets are
/// rooted at the compiled crate name, not the package name, so the
/// directive must be derived from it.
fn log_directive(level: &str) -> String {
    format!("{}={}", env!("CARGO_CRATE_NAME"), level)
}
