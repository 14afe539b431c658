pub mod alert;
pub mod camera;
pub mod config;
pub mod drowsiness;
pub mod face;
pub mod metrics;
pub mod monitor;
pub mod render;
