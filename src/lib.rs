//! Background Removal API service library.

pub mod config;
pub mod http;
pub mod observability;
pub mod pipeline;
pub mod security;
pub mod transform;
pub mod upload;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use pipeline::RequestPipeline;
