pub mod detection_event;
pub mod event_log;
