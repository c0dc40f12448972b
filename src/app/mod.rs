//! Application layer: the orchestrating service and its port boundary.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
