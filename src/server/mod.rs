//! HTTP server for Boost Guard

pub mod http;

pub use http::{run, AppState};
