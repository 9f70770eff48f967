pub mod config_api;
pub mod file_config_source;
pub mod gateway_handler;
pub mod http_client;
pub mod registry_api;

pub use file_config_source::{FileConfigSource, spawn_refresh_task};
pub use gateway_handler::GatewayHandler;
pub use http_client::UpstreamClient;
