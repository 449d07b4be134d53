use anyhow::Result;
use async_trait::async_trait;
use realtime::{LatLng, LatLngBounds};
use serde::{Deserialize, Serialize};

/// Parameters of one route computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub origin: LatLng,
    pub destination: LatLng,
    pub want_traffic: bool,
    pub smoothing: bool,
}

/// Travel conditions along a stretch of route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Congestion {
    Free,
    Moderate,
    Heavy,
    Severe,
}

impl Congestion {
    /// Classifies a stretch by how much slower it is than free flow.
    #[must_use]
    pub fn from_ratio(in_traffic_secs: f64, free_flow_secs: f64) -> Self {
        if free_flow_secs <= 0.0 || !in_traffic_secs.is_finite() {
            return Self::Free;
        }
        let ratio = in_traffic_secs / free_flow_secs;
        if ratio < 1.1 {
            Self::Free
        } else if ratio < 1.4 {
            Self::Moderate
        } else if ratio < 1.8 {
            Self::Heavy
        } else {
            Self::Severe
        }
    }

    /// Stroke colour for the overlay.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Free => "#22C55E",
            Self::Moderate => "#F59E0B",
            Self::Heavy => "#EF4444",
            Self::Severe => "#991B1B",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSegment {
    pub path: Vec<LatLng>,
    pub congestion: Congestion,
}

/// A computed route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResult {
    pub geometry: Vec<LatLng>,
    #[serde(default)]
    pub traffic_segments: Vec<TrafficSegment>,
    pub bounds: LatLngBounds,
    pub distance_text: String,
    pub duration_text: String,
}

impl RouteResult {
    /// Builds a result whose bounds cover `geometry`. Returns `None` for an
    /// empty geometry.
    #[must_use]
    pub fn new(
        geometry: Vec<LatLng>, traffic_segments: Vec<TrafficSegment>, distance_text: String,
        duration_text: String,
    ) -> Option<Self> {
        let bounds = LatLngBounds::from_points(&geometry)?;
        Some(Self { geometry, traffic_segments, bounds, distance_text, duration_text })
    }
}

/// Upstream route computation.
#[async_trait]
pub trait RoutingService: Send + Sync {
    async fn route(&self, request: &RouteRequest) -> Result<RouteResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn congestion_thresholds() {
        assert_eq!(Congestion::from_ratio(100.0, 100.0), Congestion::Free);
        assert_eq!(Congestion::from_ratio(120.0, 100.0), Congestion::Moderate);
        assert_eq!(Congestion::from_ratio(150.0, 100.0), Congestion::Heavy);
        assert_eq!(Congestion::from_ratio(300.0, 100.0), Congestion::Severe);
        assert_eq!(Congestion::from_ratio(300.0, 0.0), Congestion::Free);
    }

    #[test]
    fn result_bounds_cover_geometry() {
        let geometry = vec![LatLng::new(-4.30, 15.30), LatLng::new(-4.35, 15.25)];
        let result = RouteResult::new(geometry.clone(), vec![], "6 km".into(), "12 min".into())
            .expect("non-empty");

        assert!(geometry.iter().all(|point| result.bounds.contains(point)));
        assert!(RouteResult::new(vec![], vec![], String::new(), String::new()).is_none());
    }
}
