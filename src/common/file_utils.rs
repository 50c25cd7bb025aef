use crate::common::timestamp_utils;
use crate::errors::CaptureError;
use log::debug;
use std::path::{Path, PathBuf};

/// `<base>_<timestamp>_span<NNN>`. The span index keeps spans started
/// within the same second apart.
pub fn generate_span_name(
    base_name: &str,        // e.g., backend label
    timestamp_format: &str, // from config, e.g., "%Y%m%d_%H%M%S"
    span_index: u32,
) -> String {
    let timestamp = timestamp_utils::current_local_timestamp_str(timestamp_format);
    format!("{}_{}_span{:03}", sanitize_base_name(base_name), timestamp, span_index)
}

pub fn generate_span_filename(base_name: &str, timestamp_format: &str, span_index: u32, extension: &str) -> String {
    format!("{}.{}", generate_span_name(base_name, timestamp_format, span_index), extension)
}

fn sanitize_base_name(base_name: &str) -> String {
    let cleaned: String = base_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "capture".to_string()
    } else {
        cleaned
    }
}

pub fn ensure_output_directory(dir_path: &Path) -> Result<PathBuf, CaptureError> {
    if !dir_path.exists() {
        debug!("Output directory '{}' does not exist, attempting to create it.", dir_path.display());
        std::fs::create_dir_all(dir_path).map_err(|e| {
            CaptureError::Io(format!(
                "Failed to create output directory '{}': {}",
                dir_path.display(),
                e
            ))
        })?;
    } else if !dir_path.is_dir() {
        return Err(CaptureError::Io(format!(
            "Output path '{}' exists but is not a directory.",
            dir_path.display()
        )));
    }
    Ok(dir_path.to_path_buf())
}
