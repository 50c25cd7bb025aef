use crate::app_config::ApplicationConfig;
use crate::camera_config::{CaptureBackend, CaptureConfig};
use crate::core::recorder::EncoderKind;
use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Deserialize, Clone)]
pub struct MasterConfig {
    #[serde(rename = "application", default)]
    pub app_settings: ApplicationConfig,
    pub capture: CaptureConfig,
}

pub fn load_config(path: &str) -> Result<MasterConfig> {
    debug!("📄 Attempting to load config from: {}", path);
    let start_time = Instant::now();

    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file '{}'. 📖", path))?;
    let config = parse_config(&config_str)
        .with_context(|| format!("Failed to load configuration from '{}'", path))?;

    info!("✅ Successfully loaded and validated configuration from '{}' in {:?}", path, start_time.elapsed());
    Ok(config)
}

/// Parses and validates a YAML document. Creates the output directory when missing.
pub fn parse_config(yaml: &str) -> Result<MasterConfig> {
    let parse_start_time = Instant::now();
    let config: MasterConfig = serde_yaml::from_str(yaml).context("Failed to parse YAML configuration. 💔")?;
    debug!("Parsed YAML in {:?}", parse_start_time.elapsed());

    validate_master_config(&config).context("Master configuration validation failed 👎")?;
    Ok(config)
}

fn validate_master_config(config: &MasterConfig) -> Result<()> {
    debug!("🕵️ Validating master configuration...");
    let validation_start_time = Instant::now();
    let app = &config.app_settings;

    if app.output_directory.is_empty() {
        bail!("❌ Application output_directory cannot be empty.");
    }
    let output_path = Path::new(&app.output_directory);
    if output_path.exists() && !output_path.is_dir() {
        bail!("❌ Output directory '{}' exists but is not a directory.", app.output_directory);
    }
    if !output_path.exists() {
        debug!("Output directory '{}' does not exist. Attempting to create it.", app.output_directory);
        fs::create_dir_all(output_path).with_context(|| {
            format!("Output directory '{}' is not writable or cannot be created 📂💥", app.output_directory)
        })?;
        info!("📁 Created output directory: {}", app.output_directory);
    }

    if app.video_format.is_empty() {
        bail!("❌ Application video_format cannot be empty.");
    }
    if app.video_codec.chars().count() != 4 {
        bail!("❌ Application video_codec '{}' must be a four character code.", app.video_codec);
    }
    if app.video_encoder == EncoderKind::Opencv && !cfg!(feature = "opencv") {
        bail!("❌ video_encoder 'opencv' needs a build with the `opencv` feature; use 'jpeg_sequence'.");
    }
    if let Some(quality) = app.jpeg_quality {
        if !(1..=100).contains(&quality) {
            bail!("❌ jpeg_quality must be between 1 and 100, got {}.", quality);
        }
    }

    let capture = &config.capture;
    if capture.target_fps == 0 {
        bail!("❌ capture.target_fps must be greater than zero.");
    }
    if capture.frame_size.width == 0 || capture.frame_size.height == 0 {
        bail!(
            "❌ capture.frame_size must be non-zero, got {}x{}.",
            capture.frame_size.width,
            capture.frame_size.height
        );
    }
    match &capture.backend {
        CaptureBackend::FileOrStream { path } if path.trim().is_empty() => {
            bail!("❌ file_or_stream backend needs a non-empty path.");
        }
        CaptureBackend::ExternalCamera { index } if *index < 0 => {
            bail!("❌ external_camera index cannot be negative, got {}.", index);
        }
        CaptureBackend::RealsenseDevice { serial_number: Some(sn) } if sn.is_empty() => {
            bail!("❌ realsense_device serial_number cannot be empty when set.");
        }
        _ => {}
    }
    if capture.fourcc.chars().count() != 4 {
        bail!("❌ capture.fourcc '{}' must be a four character code.", capture.fourcc);
    }

    info!("👍 Master configuration validated successfully in {:?}.", validation_start_time.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn yaml_with(output: &Path, application_extra: &str, capture: &str) -> String {
        format!(
            "application:\n  output_directory: {}\n{}capture:\n{}",
            output.display(),
            application_extra,
            capture
        )
    }

    #[test]
    fn test_full_config_parses_and_creates_output_dir() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("recordings");
        let yaml = yaml_with(
            &out,
            "  jpeg_quality: 80\n  log_level: debug\n",
            "  backend: { type: external_camera, index: 1 }\n  frame_size: { width: 1280, height: 720 }\n  target_fps: 30\n  autofocus: false\n  focus_value: 521\n",
        );
        let config = parse_config(&yaml).unwrap();
        assert!(out.is_dir());
        assert_eq!(config.app_settings.video_format, "avi");
        assert_eq!(config.app_settings.video_encoder, EncoderKind::default());
        assert_eq!(config.app_settings.jpeg_quality, Some(80));
        assert_eq!(config.capture.backend, CaptureBackend::ExternalCamera { index: 1 });
        assert!(!config.capture.autofocus);
    }

    #[test]
    fn test_rejects_zero_fps() {
        let dir = tempdir().unwrap();
        let yaml = yaml_with(
            dir.path(),
            "",
            "  backend: { type: file_or_stream, path: clip.avi }\n  target_fps: 0\n",
        );
        let err = parse_config(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("target_fps"));
    }

    #[test]
    fn test_rejects_empty_file_path() {
        let dir = tempdir().unwrap();
        let yaml = yaml_with(dir.path(), "", "  backend: { type: file_or_stream, path: \"\" }\n");
        assert!(parse_config(&yaml).is_err());
    }

    #[test]
    fn test_jpeg_sequence_encoder_parses() {
        let dir = tempdir().unwrap();
        let yaml = yaml_with(
            dir.path(),
            "  video_encoder: jpeg_sequence\n",
            "  backend: { type: realsense_device }\n",
        );
        let config = parse_config(&yaml).unwrap();
        assert_eq!(config.app_settings.video_encoder, EncoderKind::JpegSequence);
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_opencv_encoder_needs_feature() {
        let dir = tempdir().unwrap();
        let yaml = yaml_with(dir.path(), "  video_encoder: opencv\n", "  backend: { type: realsense_device }\n");
        let err = parse_config(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("opencv"));
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let err = load_config("/nonexistent/vidcap.yaml").unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read configuration file"));
    }
}
