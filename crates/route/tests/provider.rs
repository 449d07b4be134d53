#![allow(missing_docs)]

use std::any::Any;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use realtime::{
    CameraFit, CameraMove, ClickHandler, HttpRequest, LatLng, MapSurface, MarkerIcon, MarkerId,
    PolylineId, StrokeStyle, Viewport,
};
use route::{RouteRequest, RouteResult, RoutingService};

/// Map surface recording polylines and camera calls.
pub struct RecordingSurface {
    ready: bool,
    state: Mutex<SurfaceState>,
}

#[derive(Default)]
pub struct SurfaceState {
    pub next_id: u64,
    pub lines: HashMap<PolylineId, (Vec<LatLng>, StrokeStyle)>,
    pub fits: Vec<CameraFit>,
    pub moves: Vec<CameraMove>,
    pub stops: usize,
    pub removed: usize,
}

#[allow(unused)]
impl RecordingSurface {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self { ready: true, state: Mutex::default() })
    }

    pub fn not_ready() -> Arc<Self> {
        Arc::new(Self { ready: false, state: Mutex::default() })
    }

    pub fn fits(&self) -> Vec<CameraFit> {
        self.state.lock().expect("lock").fits.clone()
    }

    pub fn moves(&self) -> Vec<CameraMove> {
        self.state.lock().expect("lock").moves.clone()
    }

    pub fn lines(&self) -> Vec<(Vec<LatLng>, StrokeStyle)> {
        let state = self.state.lock().expect("lock");
        let mut lines: Vec<_> = state.lines.iter().map(|(id, line)| (*id, line.clone())).collect();
        lines.sort_by_key(|(id, _)| *id);
        lines.into_iter().map(|(_, line)| line).collect()
    }

    pub fn removed(&self) -> usize {
        self.state.lock().expect("lock").removed
    }
}

impl MapSurface for RecordingSurface {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn viewport(&self) -> Viewport {
        Viewport { width: 1280.0, height: 800.0, center: LatLng::new(-4.32, 15.3), zoom: 13.0 }
    }

    fn place_marker(&self, _: LatLng, _: &MarkerIcon) -> MarkerId {
        MarkerId(0)
    }

    fn move_marker(&self, _: MarkerId, _: LatLng, _: f64) {}

    fn set_marker_icon(&self, _: MarkerId, _: &MarkerIcon) {}

    fn remove_marker(&self, _: MarkerId) {}

    fn set_camera(&self, camera: &CameraMove) {
        self.state.lock().expect("lock").moves.push(*camera);
    }

    fn fit_bounds(&self, fit: &CameraFit) {
        self.state.lock().expect("lock").fits.push(*fit);
    }

    fn stop_camera(&self) {
        self.state.lock().expect("lock").stops += 1;
    }

    fn draw_polyline(&self, path: &[LatLng], style: &StrokeStyle) -> PolylineId {
        let mut state = self.state.lock().expect("lock");
        state.next_id += 1;
        let id = PolylineId(state.next_id);
        state.lines.insert(id, (path.to_vec(), style.clone()));
        id
    }

    fn update_polyline(&self, line: PolylineId, path: &[LatLng]) {
        if let Some(entry) = self.state.lock().expect("lock").lines.get_mut(&line) {
            entry.0 = path.to_vec();
        }
    }

    fn remove_polyline(&self, line: PolylineId) {
        let mut state = self.state.lock().expect("lock");
        if state.lines.remove(&line).is_some() {
            state.removed += 1;
        }
    }

    fn on_click(&self, _: ClickHandler) {}
}

/// Routing service answering with a straight 21-point line between the
/// endpoints after `latency`. Fails while `fail` is set.
#[derive(Default)]
pub struct MockRouting {
    pub latency: Duration,
    pub fail: Mutex<bool>,
    pub requests: Mutex<Vec<RouteRequest>>,
}

#[allow(unused)]
impl MockRouting {
    pub fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self { latency, ..Self::default() })
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().expect("lock") = fail;
    }

    pub fn requests(&self) -> Vec<RouteRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl RoutingService for MockRouting {
    async fn route(&self, request: &RouteRequest) -> Result<RouteResult> {
        self.requests.lock().expect("lock").push(*request);
        tokio::time::sleep(self.latency).await;

        if *self.fail.lock().expect("lock") {
            return Err(anyhow!("ZERO_RESULTS")).context("routing service");
        }

        let geometry: Vec<LatLng> =
            (0..=20).map(|step| request.origin.lerp(&request.destination, f64::from(step) / 20.0)).collect();
        let segments = vec![route::TrafficSegment {
            path: geometry[..5].to_vec(),
            congestion: route::Congestion::Heavy,
        }];
        RouteResult::new(geometry, segments, "4.2 km".to_string(), "11 min".to_string())
            .context("empty geometry")
    }
}

/// HTTP provider serving a canned directions payload.
#[derive(Clone, Default)]
pub struct MockHttp {
    pub uris: Arc<Mutex<Vec<String>>>,
}

impl HttpRequest for MockHttp {
    async fn fetch<T>(&self, request: Request<T>) -> Result<Response<Bytes>>
    where
        T: http_body::Body + Any,
        T::Data: Into<Vec<u8>>,
        T::Error: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        self.uris.lock().expect("lock").push(request.uri().to_string());

        let body = match request.uri().path() {
            "/directions" if request.uri().query().is_some_and(|q| q.contains("destination=0%2C0")) => {
                serde_json::json!({"routes": []})
            }
            "/directions" => serde_json::json!({
                "routes": [{
                    "polyline": "_p~iF~ps|U_ulLnnqC_mqNvxq`@",
                    "distanceText": "812 km",
                    "durationText": "9 h",
                    "steps": [
                        {"polyline": "_p~iF~ps|U_ulLnnqC", "durationSecs": 100.0, "durationInTrafficSecs": 230.0}
                    ]
                }]
            }),
            path => return Err(anyhow!("unknown path: {path}")),
        };

        let data = serde_json::to_vec(&body).context("failed to serialize")?;
        Response::builder().status(200).body(Bytes::from(data)).context("failed to build response")
    }
}
