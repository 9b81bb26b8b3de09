//! Tool gateway adapters.

pub mod http;

pub use http::HttpToolGateway;
