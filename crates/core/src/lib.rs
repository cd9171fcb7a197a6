pub mod annotation;
pub mod detection;
pub mod pipeline;
pub mod realtime;
pub mod shared;
pub mod video;
