//! # Directions
//!
//! Routing service backed by the directions HTTP API.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use http::header::ACCEPT;
use http_body_util::Empty;
use realtime::{HttpRequest, LatLng};
use serde::Deserialize;
use tracing::debug;
use urlencoding::encode;

use crate::model::{Congestion, RouteRequest, RouteResult, RoutingService, TrafficSegment};
use crate::polyline;

/// Chaikin passes applied when smoothing is requested.
const SMOOTHING_PASSES: usize = 2;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionsResponse {
    #[serde(default)]
    pub routes: Vec<WireRoute>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRoute {
    pub polyline: String,
    pub distance_text: String,
    pub duration_text: String,
    #[serde(default)]
    pub steps: Vec<WireStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireStep {
    pub polyline: String,
    pub duration_secs: f64,
    #[serde(default)]
    pub duration_in_traffic_secs: Option<f64>,
}

impl WireRoute {
    /// Decodes the wire route into a [`RouteResult`].
    ///
    /// # Errors
    ///
    /// Returns an error when a polyline cannot be decoded or the geometry is
    /// empty.
    pub fn into_result(self, request: &RouteRequest) -> Result<RouteResult> {
        let mut geometry = polyline::decode(&self.polyline).context("decoding route polyline")?;
        if request.smoothing {
            geometry = polyline::smooth(&geometry, SMOOTHING_PASSES);
        }

        let mut segments = Vec::new();
        if request.want_traffic {
            for step in &self.steps {
                let Some(in_traffic) = step.duration_in_traffic_secs else {
                    continue;
                };
                let path = polyline::decode(&step.polyline).context("decoding step polyline")?;
                if path.len() < 2 {
                    continue;
                }
                segments.push(TrafficSegment {
                    path,
                    congestion: Congestion::from_ratio(in_traffic, step.duration_secs),
                });
            }
        }

        RouteResult::new(geometry, segments, self.distance_text, self.duration_text)
            .ok_or_else(|| realtime::not_found!("route has no geometry").into())
    }
}

/// Routing service calling `GET {base}/directions`.
pub struct HttpRoutingService<H: HttpRequest> {
    http: Arc<H>,
    base_url: String,
}

impl<H: HttpRequest> HttpRoutingService<H> {
    #[must_use]
    pub fn new(http: Arc<H>, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }
}

fn coordinate(point: &LatLng) -> String {
    encode(&format!("{},{}", point.lat, point.lng)).into_owned()
}

/// Query string for a route request.
#[must_use]
pub fn query(request: &RouteRequest) -> String {
    format!(
        "origin={}&destination={}&traffic={}",
        coordinate(&request.origin),
        coordinate(&request.destination),
        request.want_traffic
    )
}

#[async_trait]
impl<H> RoutingService for HttpRoutingService<H>
where
    H: HttpRequest + 'static,
{
    async fn route(&self, request: &RouteRequest) -> Result<RouteResult> {
        let url = self.base_url.trim_end_matches('/');
        let http_request = http::Request::builder()
            .method(Method::GET)
            .uri(format!("{url}/directions?{}", query(request)))
            .header(ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())
            .context("building directions request")?;

        let response = self.http.fetch(http_request).await.context("calling directions")?;
        if !response.status().is_success() {
            return Err(realtime::bad_gateway!("directions returned {}", response.status()).into());
        }

        let directions: DirectionsResponse =
            serde_json::from_slice(response.body()).context("deserializing directions")?;
        debug!(routes = directions.routes.len(), "directions received");

        let Some(route) = directions.routes.into_iter().next() else {
            return Err(realtime::route_failed!("no route between the endpoints").into());
        };
        route.into_result(request)
    }
}
