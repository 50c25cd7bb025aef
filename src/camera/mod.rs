pub mod external_camera;
pub mod file_source;
pub mod realsense_device;

#[cfg(feature = "opencv")]
pub mod camera_media;
