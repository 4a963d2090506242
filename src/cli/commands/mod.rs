//! CLI command implementations

pub mod build;
pub mod cache;
pub mod completions;
pub mod config;
pub mod render;
pub mod routes;
pub mod serve;

pub use build::execute as build;
pub use cache::execute as cache;
pub use completions::execute as completions;
pub use config::execute as config;
pub use render::execute as render;
pub use routes::execute as routes;
pub use serve::execute as serve;
