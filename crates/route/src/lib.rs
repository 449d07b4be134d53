//! # Route
//!
//! Camera framing and route drawing on the shared map surface, plus the
//! HTTP-backed routing service.

pub mod camera;
pub mod directions;
mod model;
pub mod polyline;
pub mod renderer;

pub use crate::camera::{CameraAction, CameraController, CameraOptions, FitOptions, FocusOptions};
pub use crate::directions::HttpRoutingService;
pub use crate::model::*;
pub use crate::renderer::{RouteNotice, RouteOptions, RoutePhase, RouteRenderer};
