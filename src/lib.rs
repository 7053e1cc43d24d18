//! Operator console for a telemetry stream server.
//!
//! A page polls JSON sources on a fixed period, mirrors their fields into
//! bound elements, and writes operator toggles and clicks back to the
//! server. See [`page::PageSession`] for the moving parts in one place.

pub mod binder;
pub mod binding;
pub mod cli;
pub mod config;
pub mod logging;
pub mod page;
pub mod poller;
pub mod snapshot;
pub mod status;
pub mod team;
pub mod writer;
