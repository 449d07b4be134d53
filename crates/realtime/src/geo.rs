//! Geographic primitives and Web Mercator math.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Pixel size of one Web Mercator tile at zoom 0.
pub const TILE_SIZE: f64 = 256.0;

const MAX_SIN_LAT: f64 = 0.9999;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lng: f64,
}

impl LatLng {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and within the WGS84 latitude/longitude ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Linear interpolation towards `other`. `t` is clamped to `[0, 1]` and
    /// `t == 1` yields `other` exactly.
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        if t >= 1.0 {
            return *other;
        }
        let t = t.max(0.0);
        Self {
            lat: (other.lat - self.lat).mul_add(t, self.lat),
            lng: (other.lng - self.lng).mul_add(t, self.lng),
        }
    }
}

/// Minimal axis-aligned region covering a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatLngBounds {
    #[serde(alias = "southwest")]
    pub south_west: LatLng,
    #[serde(alias = "northeast")]
    pub north_east: LatLng,
}

impl LatLngBounds {
    #[must_use]
    pub const fn from_point(point: LatLng) -> Self {
        Self { south_west: point, north_east: point }
    }

    /// Bounds covering every point, or `None` for an empty iterator.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a LatLng>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut bounds = Self::from_point(*first);
        for point in points {
            bounds.extend(point);
        }
        Some(bounds)
    }

    pub fn extend(&mut self, point: &LatLng) {
        self.south_west.lat = self.south_west.lat.min(point.lat);
        self.south_west.lng = self.south_west.lng.min(point.lng);
        self.north_east.lat = self.north_east.lat.max(point.lat);
        self.north_east.lng = self.north_east.lng.max(point.lng);
    }

    #[must_use]
    pub fn contains(&self, point: &LatLng) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&point.lat)
            && (self.south_west.lng..=self.north_east.lng).contains(&point.lng)
    }

    #[must_use]
    pub fn contains_bounds(&self, other: &Self) -> bool {
        self.contains(&other.south_west) && self.contains(&other.north_east)
    }

    #[must_use]
    pub fn center(&self) -> LatLng {
        LatLng {
            lat: (self.south_west.lat + self.north_east.lat) / 2.0,
            lng: (self.south_west.lng + self.north_east.lng) / 2.0,
        }
    }

    /// Zero (or near-zero) extent along both axes, which cannot be fitted.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        const EPSILON: f64 = 1e-9;
        (self.north_east.lat - self.south_west.lat).abs() < EPSILON
            && (self.north_east.lng - self.south_west.lng).abs() < EPSILON
    }
}

/// A point in world pixel space at a given zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub x: f64,
    pub y: f64,
}

fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * zoom.exp2()
}

fn mercator_y(lat: f64) -> f64 {
    let sin = lat.to_radians().sin().clamp(-MAX_SIN_LAT, MAX_SIN_LAT);
    ((1.0 + sin) / (1.0 - sin)).ln() / 2.0
}

/// Projects a coordinate to world pixels at `zoom`.
#[must_use]
pub fn project(point: &LatLng, zoom: f64) -> Pixel {
    let size = world_size(zoom);
    Pixel {
        x: (point.lng + 180.0) / 360.0 * size,
        y: (0.5 - mercator_y(point.lat) / (2.0 * PI)) * size,
    }
}

/// Inverse of [`project`].
#[must_use]
pub fn unproject(pixel: &Pixel, zoom: f64) -> LatLng {
    let size = world_size(zoom);
    let lng = pixel.x / size * 360.0 - 180.0;
    let n = PI - 2.0 * PI * pixel.y / size;
    let lat = n.sinh().atan().to_degrees();
    LatLng { lat, lng }
}

/// Largest (fractional) zoom at which `bounds` fits in a `width` x `height`
/// pixel area. Degenerate extents yield `f64::INFINITY`.
#[must_use]
pub fn zoom_to_fit(bounds: &LatLngBounds, width: f64, height: f64) -> f64 {
    let lng_fraction = (bounds.north_east.lng - bounds.south_west.lng).abs() / 360.0;
    let lat_fraction =
        (mercator_y(bounds.north_east.lat) - mercator_y(bounds.south_west.lat)).abs() / (2.0 * PI);

    let zoom_for = |pixels: f64, fraction: f64| {
        if fraction <= f64::EPSILON {
            f64::INFINITY
        } else {
            (pixels.max(1.0) / TILE_SIZE / fraction).log2()
        }
    };

    zoom_for(width, lng_fraction).min(zoom_for(height, lat_fraction))
}

/// Cubic ease-out over `[0, 1]`.
#[must_use]
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}
