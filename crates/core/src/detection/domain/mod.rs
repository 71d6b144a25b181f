pub mod detection;
pub mod detector;
pub mod face_eye_detection;
