//! Plancton — a host-local daemon that opportunistically fills spare
//! CPU with ephemeral worker containers and evicts them under
//! pressure, TTL, or operator request.

pub mod config;
pub mod control_plane;
pub mod docker;
pub mod engine;
pub mod error;
pub mod host;
pub mod main_loop;
pub mod overhead;
pub mod owned;
pub mod reconciler;
pub mod spawner;
pub mod state;
pub mod telemetry;
