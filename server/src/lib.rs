//! Roboflow Server Library
//!
//! Runs robot workflows as dependency graphs and drives raybots over
//! WebSocket sessions.

pub mod app;
pub mod command;
pub mod errors;
pub mod events;
pub mod logs;
pub mod models;
pub mod server;
pub mod session;
pub mod storage;
pub mod utils;
pub mod workers;
pub mod workflow;
