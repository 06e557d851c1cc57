pub mod display_surface;
pub mod frame_source;
pub mod image_writer;
