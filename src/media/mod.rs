pub mod jpeg_sequence;
