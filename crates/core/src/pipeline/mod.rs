pub mod admission_controller;
pub mod classify_image_use_case;
pub mod pipeline_logger;
pub mod realtime_stream_use_case;
pub mod result_formatter;
pub mod slot_table;
pub mod stream_config;
pub mod stream_error;
pub mod worker_dispatcher;
