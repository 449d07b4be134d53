//! # Realtime Core
//!
//! Core modules shared by the fleet visualization crates: the error type,
//! host provider traits, geographic math, the map-surface capability, event
//! listeners and cancellable tasks.

mod error;
mod provider;

pub mod events;
pub mod geo;
pub mod surface;
pub mod task;

pub use crate::error::*;
pub use crate::events::{Listeners, Subscription};
pub use crate::geo::{LatLng, LatLngBounds};
pub use crate::provider::*;
pub use crate::surface::*;
pub use crate::task::TaskHandle;
