//! Workflow execution engine

pub mod executor;
pub mod graph;
pub mod phases;
pub mod service;
pub mod tasks;
