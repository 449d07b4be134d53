//! Marker visuals derived from vehicle class, status and delivery flag.

use std::collections::HashMap;
use std::sync::Arc;

use realtime::{Badge, MarkerIcon, MarkerStyle};

use crate::heading;
use crate::model::{TrackedEntity, VehicleClass, VehicleStatus};

const AVAILABLE_GREEN: &str = "#22C55E";
const OFFLINE_GREY: &str = "#9CA3AF";
const OFFLINE_OPACITY: f64 = 0.45;

const fn class_color(class: VehicleClass) -> &'static str {
    match class {
        VehicleClass::Taxi => "#FACC15",
        VehicleClass::MotoFlash => "#F97316",
        VehicleClass::VanFlex => "#3B82F6",
        VehicleClass::TruckMaxicharge => "#7C3AED",
        VehicleClass::Other => "#64748B",
    }
}

const fn silhouette(class: VehicleClass) -> &'static str {
    match class {
        VehicleClass::Taxi => "taxi",
        VehicleClass::MotoFlash => "moto",
        VehicleClass::VanFlex => "van",
        VehicleClass::TruckMaxicharge => "truck",
        VehicleClass::Other => "car",
    }
}

/// Builds the style for a vehicle. Pure; see [`MarkerIconFactory`] for the
/// memoized variant.
#[must_use]
pub fn marker_style(class: VehicleClass, status: VehicleStatus, is_delivering: bool) -> MarkerStyle {
    let (badge, color, opacity) = match status {
        VehicleStatus::Available => {
            (Badge::PulseRing { color: AVAILABLE_GREEN }, class_color(class), 1.0)
        }
        VehicleStatus::Busy => {
            (Badge::ProgressHalo { color: class_color(class) }, class_color(class), 1.0)
        }
        VehicleStatus::Offline => (Badge::Dimmed, OFFLINE_GREY, OFFLINE_OPACITY),
    };

    MarkerStyle {
        silhouette: silhouette(class),
        color,
        badge,
        opacity,
        package: is_delivering && class != VehicleClass::Taxi,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct StyleKey {
    class: VehicleClass,
    status: VehicleStatus,
    is_delivering: bool,
}

/// Memoizes marker styles so identical inputs share one allocation and
/// backends can skip redraws with a pointer comparison.
#[derive(Debug, Default)]
pub struct MarkerIconFactory {
    styles: HashMap<StyleKey, Arc<MarkerStyle>>,
}

impl MarkerIconFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Icon for (class, heading, status, delivery flag). The silhouette
    /// rotation equals the normalized heading.
    pub fn icon(
        &mut self, class: VehicleClass, heading: f64, status: VehicleStatus, is_delivering: bool,
    ) -> MarkerIcon {
        let key = StyleKey { class, status, is_delivering };
        let style = self
            .styles
            .entry(key)
            .or_insert_with(|| Arc::new(marker_style(class, status, is_delivering)));

        MarkerIcon { style: Arc::clone(style), rotation: heading::normalize(heading) }
    }

    pub fn icon_for(&mut self, entity: &TrackedEntity) -> MarkerIcon {
        self.icon(entity.class, entity.heading, entity.status, entity.is_delivering)
    }
}
