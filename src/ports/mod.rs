pub mod config_source;
pub mod http_client;
