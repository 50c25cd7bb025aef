use crate::common::timestamp_utils;
use crate::config_loader::MasterConfig;
use crate::core::capture_worker::{CaptureEvent, CaptureWorker, StopReason, WorkerReport};
use crate::core::control_state::ControlState;
use crate::core::recorder::RecorderSettings;
use crate::operations::op_helper;
use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::ArgMatches;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;

const PROGRESS_EVERY_FRAMES: u64 = 100;

pub async fn handle_capture_cli(master_config: &MasterConfig, args: &ArgMatches) -> Result<()> {
    let op_start_time = Instant::now();
    let capture = master_config.capture.clone();
    let label = capture.backend.label();
    let record = args.get_flag("record");
    let duration = op_helper::duration_arg(args, "duration");

    let output_dir = op_helper::determine_output_dir(master_config, args, "output")?;
    let mut settings = RecorderSettings::from_app_config(&master_config.app_settings, &label);
    settings.output_dir = output_dir.clone();
    info!(
        "🎬 Capture session for {:?}: record={} duration={:?} output={}",
        capture.backend,
        record,
        duration,
        output_dir.display()
    );

    let control = ControlState::shared(false, false, record);
    let mut worker = CaptureWorker::new(capture, Arc::clone(&control)).with_recorder_settings(settings);
    let mut events = worker
        .take_events()
        .ok_or_else(|| anyhow!("capture worker event channel already taken"))?;
    worker.start().context("Failed to start capture worker")?;

    let report = drive_session(&worker, &mut events, duration).await;

    // The thread has already emitted Stopped or is about to; joining only waits for its exit.
    let join_result = tokio::task::spawn_blocking(move || worker.join())
        .await
        .map_err(|e| anyhow!("capture worker join task failed: {}", e))?;
    let report = match (report, join_result) {
        (Some(report), _) => report,
        (None, Ok(report)) => report,
        (None, Err(e)) => return Err(anyhow::Error::from(e).context("Capture worker did not report")),
    };

    log_summary(&report, op_start_time);
    match report.stop_reason {
        StopReason::Failed(reason) => bail!("Capture session failed: {}", reason),
        _ => Ok(()),
    }
}

/// Logs worker events until `Stopped`. Ctrl-C or the optional duration requests a stop.
async fn drive_session(
    worker: &CaptureWorker,
    events: &mut UnboundedReceiver<CaptureEvent>,
    duration: Option<std::time::Duration>,
) -> Option<WorkerReport> {
    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let mut stop_requested = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !stop_requested => {
                info!("🛑 Ctrl-C received, stopping capture...");
                worker.request_stop();
                stop_requested = true;
            }
            _ = &mut deadline, if !stop_requested => {
                info!("⏱️ Capture duration elapsed, stopping...");
                worker.request_stop();
                stop_requested = true;
            }
            event = events.recv() => match event {
                Some(CaptureEvent::FrameReady(frame)) => {
                    if frame.sequence() % PROGRESS_EVERY_FRAMES == 0 {
                        debug!(
                            "  Frame {} ({}), delivered {} ms after capture",
                            frame.sequence(),
                            frame.resolution(),
                            timestamp_utils::millis_between(frame.captured_at(), Utc::now())
                        );
                    }
                }
                Some(CaptureEvent::RecordingStarted { path, resolution }) => {
                    info!("⏺️ Recording to {} at {}", path.display(), resolution);
                }
                Some(CaptureEvent::RecordingFinished(summary)) => {
                    info!("💾 Saved {} ({} frames)", summary.path.display(), summary.frames);
                }
                Some(CaptureEvent::Ended) => info!("🏁 Source reached end of stream."),
                Some(CaptureEvent::SourceInvalid(reason)) => error!("❌ Source invalid: {}", reason),
                Some(CaptureEvent::Stopped(report)) => return Some(report),
                None => {
                    warn!("⚠️ Capture worker event channel closed without a Stopped event.");
                    return None;
                }
            }
        }
    }
}

fn log_summary(report: &WorkerReport, started: Instant) {
    info!("📋 ----- Capture Summary ({:?}) -----", started.elapsed());
    if let Some(res) = report.negotiated_resolution {
        info!("Negotiated resolution: {}", res);
    }
    info!("Frames emitted: {} | Frames recorded: {}", report.frames_emitted, report.frames_recorded);
    if report.recordings.is_empty() {
        info!("No recordings written.");
    }
    for recording in &report.recordings {
        info!("Recording: {:<60} | Frames: {}", recording.path.display(), recording.frames);
    }
    info!("Stop reason: {:?}", report.stop_reason);
}
