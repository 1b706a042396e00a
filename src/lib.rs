//! Browser chat against Gemini models: attachment encoding, per-connection sessions,
//! streamed replies, and the transcript they are reconciled into.

pub mod agent;
pub mod attachment;
pub mod config;
pub mod errors;
pub mod models;
pub mod routes;
pub mod service;
