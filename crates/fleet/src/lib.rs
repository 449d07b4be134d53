//! # Fleet
//!
//! Tracked vehicles: the position feed, the authoritative store with its
//! filter and counters, marker icons, and per-marker animation.

pub mod animator;
pub mod feed;
pub mod heading;
pub mod icon;
pub mod model;
pub mod store;

pub use crate::animator::{AnimationOptions, Pose, PositionAnimator};
pub use crate::feed::{FeedControl, FeedEvent, FeedOptions, FeedPoller, HttpPositionFeed, PositionFeed};
pub use crate::icon::MarkerIconFactory;
pub use crate::model::*;
pub use crate::store::{CategoryCounts, FeedStatus, FleetSnapshot, FleetStore, Reconciliation};
