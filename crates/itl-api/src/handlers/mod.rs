//! API handlers

pub mod graph;
pub mod health;
pub mod sync;
