pub mod model_resolver;
pub mod yolo_eye_detector;
pub mod yolo_face_detector;
pub mod yolo_model;
