pub mod pipeline_config;
pub mod pipeline_error;
pub mod pipeline_logger;
pub mod pipeline_loop;
pub mod stop_signal;
