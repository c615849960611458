//! Phishing email classification over HTTP, backed by a pretrained
//! transformer sequence classifier.

pub mod client;
pub mod config;
pub mod eml;
pub mod inference;
pub mod server;
