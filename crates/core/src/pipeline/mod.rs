pub mod control;
pub mod fps_tracker;
pub mod frame_source;
pub mod frame_sink;
pub mod pipeline_controller;
pub mod pipeline_logger;
pub mod run_summary;
