pub mod capture_source;
pub mod capture_worker;
pub mod control_state;
pub mod frame;
pub mod recorder;
