// Library exports for PingBoard
// This allows integration tests and the binary to share one core

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod pings;
pub mod routes;
pub mod state;
