pub mod config;
pub mod constants;
pub mod error;
pub mod frame;
pub mod rect;
pub mod source_info;
