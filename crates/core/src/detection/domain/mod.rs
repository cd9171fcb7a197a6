pub mod detection_params;
pub mod detector;
pub mod face_classifier;
pub mod rect_grouper;
