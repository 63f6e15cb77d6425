pub mod app;
pub mod config;

pub use app::build_app;
pub use config::ServerConfig;
