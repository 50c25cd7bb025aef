use crate::core::recorder::EncoderKind;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationConfig {
    #[serde(default = "default_output_directory")]
    pub output_directory: String,
    #[serde(default = "default_video_format")]
    pub video_format: String, // container extension, e.g. "avi"
    #[serde(default = "default_video_codec")]
    pub video_codec: String, // fourcc, e.g. "MJPG"
    #[serde(default)]
    pub video_encoder: EncoderKind,
    #[serde(default)]
    pub jpeg_quality: Option<u8>, // JPEG quality (1-100) for the jpeg_sequence encoder
    #[serde(default = "default_timestamp_format")]
    pub filename_timestamp_format: String, // strftime format string
    #[serde(default)]
    pub log_level: Option<String>, // --debug on the CLI takes precedence
}

fn default_output_directory() -> String {
    "./recordings".to_string()
}

fn default_video_format() -> String {
    "avi".to_string()
}

fn default_video_codec() -> String {
    "MJPG".to_string()
}

fn default_timestamp_format() -> String {
    "%Y%m%d_%H%M%S".to_string()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        ApplicationConfig {
            output_directory: default_output_directory(),
            video_format: default_video_format(),
            video_codec: default_video_codec(),
            video_encoder: EncoderKind::default(),
            jpeg_quality: Some(90),
            filename_timestamp_format: default_timestamp_format(),
            log_level: Some("info".to_string()),
        }
    }
}
