pub mod ffmpeg_frame_source;
pub mod ffmpeg_recording_surface;
pub mod frame_painter;
pub mod headless_surface;
pub mod image_file_source;
pub mod image_file_writer;
pub mod stdin_key_poller;
