//! Shared types for the dial mixer plugin: configuration, filesystem
//! locations, host/daemon wire formats and the application snapshot store.

pub mod config;
pub mod platform;
pub mod protocol;
pub mod store;
