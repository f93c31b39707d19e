//! Raybot command lifecycle

pub mod fsm;
pub mod poller;
pub mod service;
