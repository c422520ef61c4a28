pub mod embed_controller;
pub mod health_controller;
pub mod metrics_controller;
