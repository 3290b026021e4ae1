//! Core of the `linr` Linear client: identifier resolution backed by
//! expiring caches, and attachment retrieval with auth, retry and resizing.

pub mod attachment;
pub mod cache;
pub mod config;
pub mod linear;
pub mod logging;
pub mod output;
pub mod resolver;
