//! # Route Renderer
//!
//! Computes and draws the route between two endpoints.
//!
//! ```text
//! Idle -> Computing -> Rendered -> Recomputing -> Rendered -> ... -> Idle
//! ```
//!
//! Endpoint changes are debounced and strictly last-write-wins: every
//! scheduled computation carries a request id and only the latest id may
//! apply its result. The camera is fitted once per endpoint pair.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use realtime::geo::ease_out_cubic;
use realtime::{Error, LatLng, Listeners, PolylineId, StrokeStyle, Subscription, SurfaceRef, TaskHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::camera::CameraController;
use crate::model::{RouteRequest, RouteResult, RoutingService};

const PRIMARY_COLOR: &str = "#2563EB";
const SHADOW_COLOR: &str = "#0F172A";
const DRAW_FRAME: Duration = Duration::from_millis(16);

/// Route behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteOptions {
    /// Quiet period before an endpoint change is computed.
    pub debounce: Duration,
    pub want_traffic: bool,
    pub smoothing: bool,
    /// Reveal the primary stroke gradually.
    pub progressive_draw: bool,
    pub draw_duration: Duration,
    /// Height of the panel covering the bottom of the map.
    pub bottom_sheet_px: f64,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            want_traffic: true,
            smoothing: true,
            progressive_draw: true,
            draw_duration: Duration::from_millis(700),
            bottom_sheet_px: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutePhase {
    #[default]
    Idle,
    /// First computation for the current endpoints; nothing drawn yet.
    Computing,
    Rendered,
    /// A newer computation is pending while the previous route stays drawn.
    Recomputing,
}

/// Transient, user-visible failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteNotice {
    pub message: String,
    pub error: Error,
}

type Pair = (LatLng, LatLng);

#[derive(Debug)]
struct Layers {
    shadow: PolylineId,
    primary: PolylineId,
    traffic: Vec<PolylineId>,
}

#[derive(Debug, Default)]
struct State {
    phase: RoutePhase,
    endpoints: Option<Pair>,
    latest: u64,
    pending: Option<TaskHandle>,
    layers: Option<Layers>,
    draw: Option<TaskHandle>,
    fitted: Option<Pair>,
    result: Option<RouteResult>,
}

struct Shared {
    surface: SurfaceRef,
    camera: CameraController,
    routing: Arc<dyn RoutingService>,
    options: RouteOptions,
    calculated: Listeners<RouteResult>,
    notices: Listeners<RouteNotice>,
    issued: AtomicU64,
    state: Mutex<State>,
}

/// Draws the route between the current endpoints.
pub struct RouteRenderer {
    shared: Arc<Shared>,
}

fn shadow_style() -> StrokeStyle {
    StrokeStyle { color: SHADOW_COLOR.to_string(), width: 10.0, opacity: 0.2, z_index: 1 }
}

fn primary_style() -> StrokeStyle {
    StrokeStyle { color: PRIMARY_COLOR.to_string(), width: 5.0, opacity: 1.0, z_index: 2 }
}

fn traffic_style(color: &str) -> StrokeStyle {
    StrokeStyle { color: color.to_string(), width: 5.0, opacity: 0.9, z_index: 3 }
}

/// Number of geometry points revealed at `progress` of the draw, from 2 up
/// to the full path.
#[must_use]
pub fn revealed_points(total: usize, progress: f64) -> usize {
    if total <= 2 || progress >= 1.0 {
        return total;
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let extra = ((total - 2) as f64 * ease_out_cubic(progress)).round() as usize;
    (2 + extra).min(total)
}

impl RouteRenderer {
    #[must_use]
    pub fn new(
        surface: SurfaceRef, camera: CameraController, routing: Arc<dyn RoutingService>,
        options: RouteOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                surface,
                camera,
                routing,
                options,
                calculated: Listeners::new(),
                notices: Listeners::new(),
                issued: AtomicU64::new(0),
                state: Mutex::default(),
            }),
        }
    }

    /// Sets the endpoints. Both present schedules a (debounced) computation;
    /// either missing tears the route down.
    pub fn set_endpoints(&self, origin: Option<LatLng>, destination: Option<LatLng>) {
        let (Some(origin), Some(destination)) = (origin, destination) else {
            self.clear();
            return;
        };
        if !origin.is_valid() || !destination.is_valid() {
            warn!(?origin, ?destination, "ignoring invalid route endpoints");
            return;
        }

        let pair = (origin, destination);
        let mut state = self.shared.lock();
        if state.endpoints == Some(pair) {
            return;
        }
        state.endpoints = Some(pair);
        schedule(&self.shared, &mut state, pair, self.shared.options.debounce);
    }

    /// Recomputes the current route (e.g. to refresh traffic) without
    /// re-fitting the camera.
    pub fn refresh(&self) {
        let mut state = self.shared.lock();
        if let Some(pair) = state.endpoints {
            schedule(&self.shared, &mut state, pair, Duration::ZERO);
        }
    }

    /// Removes every layer and forgets the endpoints.
    pub fn clear(&self) {
        let mut state = self.shared.lock();
        if state.endpoints.is_none() && state.layers.is_none() && state.phase == RoutePhase::Idle {
            return;
        }
        info!("clearing route");
        teardown(&self.shared, &mut state);
    }

    #[must_use]
    pub fn phase(&self) -> RoutePhase {
        self.shared.lock().phase
    }

    #[must_use]
    pub fn endpoints(&self) -> Option<(LatLng, LatLng)> {
        self.shared.lock().endpoints
    }

    /// Route currently drawn.
    #[must_use]
    pub fn result(&self) -> Option<RouteResult> {
        self.shared.lock().result.clone()
    }

    /// Number of requests sent to the routing service.
    #[must_use]
    pub fn requests_issued(&self) -> u64 {
        self.shared.issued.load(Ordering::SeqCst)
    }

    pub fn on_calculated(&self, handler: impl Fn(&RouteResult) + Send + Sync + 'static) -> Subscription {
        self.shared.calculated.subscribe(handler)
    }

    pub fn on_notice(&self, handler: impl Fn(&RouteNotice) + Send + Sync + 'static) -> Subscription {
        self.shared.notices.subscribe(handler)
    }
}

impl Drop for RouteRenderer {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        teardown(&self.shared, &mut state);
    }
}

impl fmt::Debug for RouteRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("RouteRenderer")
            .field("phase", &state.phase)
            .field("endpoints", &state.endpoints)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn schedule(shared: &Arc<Shared>, state: &mut State, pair: Pair, delay: Duration) {
    state.latest += 1;
    let id = state.latest;
    state.phase = if state.layers.is_some() { RoutePhase::Recomputing } else { RoutePhase::Computing };

    let request = RouteRequest {
        origin: pair.0,
        destination: pair.1,
        want_traffic: shared.options.want_traffic,
        smoothing: shared.options.smoothing,
    };
    let routing = Arc::clone(&shared.routing);
    let weak = Arc::downgrade(shared);
    debug!(id, ?delay, "scheduling route computation");

    // replacing the handle cancels the computation it superseded
    state.pending = Some(TaskHandle::spawn(move |token| async move {
        tokio::select! {
            biased;
            () = token.cancelled() => return,
            () = time::sleep(delay) => {}
        }

        let Some(shared) = Weak::upgrade(&weak) else { return };
        shared.issued.fetch_add(1, Ordering::SeqCst);
        drop(shared);

        let result = tokio::select! {
            biased;
            () = token.cancelled() => return,
            result = routing.route(&request) => result,
        };

        if let Some(shared) = Weak::upgrade(&weak) {
            complete(&shared, id, pair, result);
        }
    }));
}

fn complete(shared: &Shared, id: u64, pair: Pair, result: anyhow::Result<RouteResult>) {
    let mut state = shared.lock();
    if id != state.latest {
        debug!(id, latest = state.latest, "discarding superseded route");
        return;
    }

    match result {
        Ok(route) => {
            render(shared, &mut state, &route);
            state.phase = RoutePhase::Rendered;
            state.result = Some(route.clone());

            if state.fitted != Some(pair) {
                let fit = shared.camera.options().fit(shared.options.bottom_sheet_px);
                if shared.camera.fit_to_route(pair.0, pair.1, &fit).is_some() {
                    state.fitted = Some(pair);
                }
            }
            drop(state);

            info!(
                points = route.geometry.len(),
                segments = route.traffic_segments.len(),
                distance = %route.distance_text,
                "route calculated"
            );
            shared.calculated.emit(&route);
        }
        Err(err) => {
            let error = Error::RouteFailed(format!("{err:#}"));
            let kept = state.layers.is_some();
            state.phase = if kept { RoutePhase::Rendered } else { RoutePhase::Idle };
            drop(state);

            warn!(monotonic_counter.route_failures = 1, error = %error, kept, "route computation failed");
            let message = if kept {
                "Could not update the route. Showing the last known route."
            } else {
                "Could not calculate the route."
            };
            shared.notices.emit(&RouteNotice { message: message.to_string(), error });
        }
    }
}

fn render(shared: &Shared, state: &mut State, route: &RouteResult) {
    remove_layers(shared, state);

    let options = &shared.options;
    let geometry = &route.geometry;
    let initial = if options.progressive_draw { revealed_points(geometry.len(), 0.0) } else { geometry.len() };

    state.layers = shared.surface.with(|surface| {
        let shadow = surface.draw_polyline(geometry, &shadow_style());
        let primary = surface.draw_polyline(&geometry[..initial], &primary_style());
        let traffic = if options.want_traffic {
            route
                .traffic_segments
                .iter()
                .map(|segment| surface.draw_polyline(&segment.path, &traffic_style(segment.congestion.color())))
                .collect()
        } else {
            Vec::new()
        };
        Layers { shadow, primary, traffic }
    });

    if let Some(layers) = &state.layers
        && initial < geometry.len()
    {
        state.draw = Some(progressive_draw(
            shared.surface.clone(),
            layers.primary,
            geometry.clone(),
            options.draw_duration,
        ));
    }
}

fn progressive_draw(
    surface: SurfaceRef, line: PolylineId, geometry: Vec<LatLng>, duration: Duration,
) -> TaskHandle {
    TaskHandle::spawn(move |token| async move {
        let start = Instant::now();
        let mut ticker = time::interval(DRAW_FRAME);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let progress = if duration.is_zero() {
                1.0
            } else {
                start.elapsed().as_secs_f64() / duration.as_secs_f64()
            };
            let count = revealed_points(geometry.len(), progress);
            surface.with(|s| s.update_polyline(line, &geometry[..count]));

            if count >= geometry.len() || !surface.is_alive() {
                return;
            }
        }
    })
}

fn remove_layers(shared: &Shared, state: &mut State) {
    if let Some(draw) = state.draw.take() {
        draw.cancel();
    }
    if let Some(layers) = state.layers.take() {
        shared.surface.with(|surface| {
            surface.remove_polyline(layers.shadow);
            surface.remove_polyline(layers.primary);
            for line in layers.traffic {
                surface.remove_polyline(line);
            }
        });
    }
}

fn teardown(shared: &Shared, state: &mut State) {
    // invalidate anything in flight
    state.latest += 1;
    if let Some(pending) = state.pending.take() {
        pending.cancel();
    }
    remove_layers(shared, state);
    state.phase = RoutePhase::Idle;
    state.endpoints = None;
    state.fitted = None;
    state.result = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reveal_starts_with_two_points() {
        assert_eq!(revealed_points(100, 0.0), 2);
        assert_eq!(revealed_points(100, 1.0), 100);
        assert_eq!(revealed_points(100, 2.0), 100);
        assert_eq!(revealed_points(2, 0.0), 2);
        assert_eq!(revealed_points(1, 0.0), 1);
    }

    #[test]
    fn reveal_is_monotonic_and_front_loaded() {
        let counts: Vec<usize> = (0..=10).map(|step| revealed_points(50, f64::from(step) / 10.0)).collect();
        assert!(counts.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(counts[5] > 26);
    }
}
