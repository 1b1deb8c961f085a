//! # pilgrim-server
//!
//! HTTP server library for the pilgrim geofencing service.
//!
//! This library provides the API handlers, the event journal and state
//! management for pilgrim.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod journal;
pub mod logging;
pub mod state;
