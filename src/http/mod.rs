//! HTTP surface: router, handlers, and response encoding.

pub mod handlers;
pub mod response;
pub mod server;

pub use server::HttpServer;
