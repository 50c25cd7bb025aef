pub mod capture_session_op;
pub mod diagnostic_op;
pub mod op_helper;
