//! Docker module — bollard-backed client, split by domain.

pub mod client;
pub mod container;
pub mod image;
pub mod inventory;

pub use client::DockerClient;
pub use container::{resolve_devices, ContainerSpec, DeviceMapping};
pub use inventory::{ContainerInfo, ContainerState};
