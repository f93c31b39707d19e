//! Domain models

pub mod command;
pub mod dynamic_value;
pub mod execution;
pub mod raybot;
pub mod workflow;
