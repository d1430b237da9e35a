//! HTTP surface of the server.

pub mod admin;
pub mod extractors;
