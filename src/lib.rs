//! Job control: submit background jobs and halt, resume or stop them over HTTP.

pub mod config;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod server;
