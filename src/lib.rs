//! # Fleet View
//!
//! Real-time fleet visualization engine: ingests periodic vehicle snapshots,
//! animates them as markers on a map surface, frames the camera and draws
//! traffic-aware routes.
//!
//! The host supplies a [`realtime::MapSurface`] backend, a
//! [`fleet::PositionFeed`] and a [`route::RoutingService`] (or the HTTP
//! adapters built on [`realtime::HttpRequest`]) and mounts a [`FleetView`].

mod config;
mod view;

pub use {fleet, realtime, route};

pub use crate::config::Config;
pub use crate::view::{FleetUpdate, FleetView};
