pub mod messages;
pub mod realtime_session;
pub mod session_worker;
pub mod single_image;
