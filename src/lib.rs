pub mod accessibility;
pub mod contour;
pub mod geo;
pub mod orchestrator;
pub mod server;
pub mod services;
