//! Raybot duplex protocol
//!
//! JSON frames exchanged between the server and a connected raybot.

pub mod models;
