pub mod config;
mod http_layers;
mod index_routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
pub(self) use index_routes::make_index_routes;
pub use server::{make_app, run_server};
