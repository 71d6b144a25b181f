pub mod file_event_log;
