use std::fmt;

use chrono::{DateTime, Utc};
use realtime::{Error, LatLng};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::heading;

/// Availability reported by the driver app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    #[default]
    Available,
    Busy,
    Offline,
}

/// Vehicle category. Unknown categories deserialize to `Other` so a new
/// service class on the backend does not break ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    #[default]
    Taxi,
    MotoFlash,
    VanFlex,
    TruckMaxicharge,
    #[serde(other)]
    Other,
}

impl VehicleClass {
    /// Classes that carry parcels rather than passengers.
    #[must_use]
    pub const fn is_delivery(self) -> bool {
        matches!(self, Self::MotoFlash | Self::VanFlex | Self::TruckMaxicharge)
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Taxi => "taxi",
            Self::MotoFlash => "moto_flash",
            Self::VanFlex => "van_flex",
            Self::TruckMaxicharge => "truck_maxicharge",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPhase {
    Pickup,
    InTransit,
    Delivered,
}

/// Which slice of the fleet is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetFilter {
    #[default]
    All,
    Taxi,
    Delivery,
}

impl FleetFilter {
    #[must_use]
    pub const fn matches(self, entity: &TrackedEntity) -> bool {
        match self {
            Self::All => true,
            Self::Taxi => matches!(entity.class, VehicleClass::Taxi),
            Self::Delivery => entity.is_delivering || entity.class.is_delivery(),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Taxi => "taxi",
            Self::Delivery => "delivery",
        }
    }
}

/// One vehicle as reported by the position feed, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntity {
    pub id: String,
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lng: f64,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub status: Option<VehicleStatus>,
    #[serde(rename = "class", alias = "vehicleType", default)]
    pub class: Option<VehicleClass>,
    #[serde(default)]
    pub is_delivering: bool,
    #[serde(default)]
    pub delivery_phase: Option<DeliveryPhase>,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub driver_photo: Option<String>,
    #[serde(default)]
    pub vehicle_model: Option<String>,
}

/// One periodic response of the position feed.
///
/// Entries are decoded one at a time: an entry that does not match the wire
/// shape is counted in `malformed` and skipped, the rest of the batch is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireResponse")]
pub struct FeedResponse {
    pub entities: Vec<FeedEntity>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub malformed: usize,
}

impl FeedResponse {
    #[must_use]
    pub const fn new(entities: Vec<FeedEntity>, timestamp: DateTime<Utc>) -> Self {
        Self { entities, timestamp, malformed: 0 }
    }
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    entities: Vec<serde_json::Value>,
    timestamp: DateTime<Utc>,
}

impl From<WireResponse> for FeedResponse {
    fn from(wire: WireResponse) -> Self {
        let mut malformed = 0;
        let entities = wire
            .entities
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<FeedEntity>(value) {
                Ok(entity) => Some(entity),
                Err(err) => {
                    malformed += 1;
                    warn!(monotonic_counter.dropped_entities = 1, error = %err, "skipping malformed feed entry");
                    None
                }
            })
            .collect();

        Self { entities, timestamp: wire.timestamp, malformed }
    }
}

/// Parameters the position feed is scoped to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRequest {
    pub filter: FleetFilter,
    pub origin: Option<LatLng>,
    pub radius_km: f64,
    pub enabled: bool,
}

impl Default for FeedRequest {
    fn default() -> Self {
        Self { filter: FleetFilter::All, origin: None, radius_km: 5.0, enabled: true }
    }
}

/// A validated vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntity {
    pub id: String,
    pub position: LatLng,
    /// Degrees in `[0, 360)`.
    pub heading: f64,
    pub speed: Option<f64>,
    pub status: VehicleStatus,
    pub class: VehicleClass,
    pub is_delivering: bool,
    pub delivery_phase: Option<DeliveryPhase>,
    pub driver_name: Option<String>,
    pub driver_photo: Option<String>,
    pub vehicle_model: Option<String>,
}

impl TrackedEntity {
    /// Whether the rendered marker has to move to reflect `other`.
    #[must_use]
    pub fn moved_from(&self, other: &Self) -> bool {
        self.position != other.position || (self.heading - other.heading).abs() > f64::EPSILON
    }
}

impl TryFrom<FeedEntity> for TrackedEntity {
    type Error = Error;

    fn try_from(raw: FeedEntity) -> Result<Self, Self::Error> {
        let id = raw.id.trim();
        if id.is_empty() {
            return Err(Error::InvalidEntity("missing id".to_string()));
        }

        let position = LatLng::new(raw.lat, raw.lng);
        if !position.is_valid() {
            return Err(Error::InvalidEntity(format!(
                "{id}: invalid position ({}, {})",
                raw.lat, raw.lng
            )));
        }

        Ok(Self {
            id: id.to_string(),
            position,
            heading: raw.heading.map_or(0.0, heading::normalize),
            speed: raw.speed.filter(|speed| speed.is_finite() && *speed >= 0.0),
            status: raw.status.unwrap_or_default(),
            class: raw.class.unwrap_or_default(),
            is_delivering: raw.is_delivering,
            delivery_phase: raw.delivery_phase,
            driver_name: raw.driver_name,
            driver_photo: raw.driver_photo,
            vehicle_model: raw.vehicle_model,
        })
    }
}
