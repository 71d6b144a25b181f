pub mod annotation;
pub mod detection;
pub mod events;
pub mod pipeline;
pub mod preprocessing;
pub mod shared;
pub mod video;
