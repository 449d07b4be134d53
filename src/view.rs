//! # Fleet View
//!
//! Composition root of the engine. The view owns the map surface and every
//! background task; the other components receive a [`SurfaceRef`] and can
//! neither replace nor dispose of the surface.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use fleet::{
    CategoryCounts, FeedEvent, FeedPoller, FeedRequest, FeedStatus, FleetFilter, FleetSnapshot,
    FleetStore, MarkerIconFactory, Pose, PositionAnimator, PositionFeed, TrackedEntity,
};
use realtime::{
    Error, LatLng, Listeners, MapSurface, MarkerId, MarkerStyle, Subscription, SurfaceClick,
    SurfaceRef, TaskHandle,
};
use route::{
    CameraAction, CameraController, RouteNotice, RoutePhase, RouteRenderer, RouteResult,
    RoutingService,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::Config;

/// Published after every change to the tracked fleet or its filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetUpdate {
    pub filter: FleetFilter,
    pub counts: CategoryCounts,
    pub status: FeedStatus,
    pub tracked: usize,
}

struct MarkerSlot {
    marker: MarkerId,
    style: Arc<MarkerStyle>,
    animator: PositionAnimator,
}

struct ViewState {
    store: FleetStore,
    icons: MarkerIconFactory,
    markers: HashMap<String, MarkerSlot>,
    owners: HashMap<MarkerId, String>,
    layer_visible: bool,
}

struct Inner {
    surface: SurfaceRef,
    config: Config,
    camera: CameraController,
    routes: RouteRenderer,
    vehicle_clicks: Listeners<TrackedEntity>,
    updates: Listeners<FleetUpdate>,
    state: Mutex<ViewState>,
}

/// The mounted fleet visualization.
///
/// Methods that start animations must be called from within the tokio
/// runtime the view was mounted on.
pub struct FleetView {
    inner: Arc<Inner>,
    poller: Option<FeedPoller>,
    pump: Option<TaskHandle>,
    surface: Option<Arc<dyn MapSurface>>,
}

impl FleetView {
    /// Mounts the view on `surface` and starts polling `feed`.
    #[must_use]
    pub fn mount(
        surface: Arc<dyn MapSurface>, feed: Arc<dyn PositionFeed>, routing: Arc<dyn RoutingService>,
        config: Config,
    ) -> Self {
        let surface_ref = SurfaceRef::new(&surface);
        let camera = CameraController::new(surface_ref.clone(), config.camera);
        let routes = RouteRenderer::new(surface_ref.clone(), camera.clone(), routing, config.route);

        let request = FeedRequest {
            filter: FleetFilter::All,
            origin: None,
            radius_km: config.search_radius_km,
            enabled: true,
        };
        let (poller, events) = FeedPoller::spawn(feed, request, config.feed);

        let mut store = FleetStore::new(FleetFilter::All);
        store.attach_feed(poller.control());

        let inner = Arc::new(Inner {
            surface: surface_ref,
            config,
            camera,
            routes,
            vehicle_clicks: Listeners::new(),
            updates: Listeners::new(),
            state: Mutex::new(ViewState {
                store,
                icons: MarkerIconFactory::new(),
                markers: HashMap::new(),
                owners: HashMap::new(),
                layer_visible: true,
            }),
        });

        let weak = Arc::downgrade(&inner);
        surface.on_click(Arc::new(move |click| {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.handle_click(click);
            }
        }));

        let pump = pump(Arc::downgrade(&inner), events);
        info!("fleet view mounted");

        Self { inner, poller: Some(poller), pump: Some(pump), surface: Some(surface) }
    }

    /// Stops polling and animation and removes everything drawn. Dropping the
    /// view has the same effect.
    pub fn unmount(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(surface) = self.surface.take() else {
            return;
        };
        if let Some(pump) = self.pump.take() {
            pump.cancel();
        }
        self.poller = None;

        self.inner.routes.clear();
        let mut state = self.inner.lock();
        let removed = state.markers.len();
        for (_, slot) in state.markers.drain() {
            self.inner.remove_marker(slot);
        }
        state.owners.clear();
        drop(state);

        info!(removed, "fleet view unmounted");
        drop(surface);
    }

    /// Changes the visible category and re-scopes the feed.
    pub fn set_filter(&self, filter: FleetFilter) {
        let mut state = self.inner.lock();
        if !state.store.set_filter(filter) {
            return;
        }
        self.inner.sync_markers(&mut state);
        let update = fleet_update(&state.store);
        drop(state);
        self.inner.updates.emit(&update);
    }

    #[must_use]
    pub fn filter(&self) -> FleetFilter {
        self.inner.lock().store.filter()
    }

    /// Shows or hides the whole vehicle layer. Hiding removes the markers but
    /// keeps the tracked fleet, so showing again is immediate.
    pub fn set_layer_visible(&self, visible: bool) {
        let mut state = self.inner.lock();
        if state.layer_visible == visible {
            return;
        }
        debug!(visible, "vehicle layer toggled");
        state.layer_visible = visible;
        self.inner.sync_markers(&mut state);
    }

    #[must_use]
    pub fn is_layer_visible(&self) -> bool {
        self.inner.lock().layer_visible
    }

    #[must_use]
    pub fn counts(&self) -> CategoryCounts {
        self.inner.lock().store.counts()
    }

    #[must_use]
    pub fn status(&self) -> FeedStatus {
        self.inner.lock().store.status().clone()
    }

    /// Every tracked entity, regardless of filter.
    #[must_use]
    pub fn entities(&self) -> FleetSnapshot {
        self.inner.lock().store.snapshot()
    }

    /// Tracked entities matching the filter.
    #[must_use]
    pub fn visible_entities(&self) -> Vec<TrackedEntity> {
        self.inner.lock().store.visible().cloned().collect()
    }

    /// Number of markers currently on the surface.
    #[must_use]
    pub fn marker_count(&self) -> usize {
        self.inner.lock().markers.len()
    }

    /// Marker drawn for entity `id`.
    #[must_use]
    pub fn marker_for(&self, id: &str) -> Option<MarkerId> {
        self.inner.lock().markers.get(id).map(|slot| slot.marker)
    }

    /// Centers the camera on entity `id`.
    pub fn focus_vehicle(&self, id: &str) -> Option<CameraAction> {
        let position = self.inner.lock().store.get(id).map(|entity| entity.position)?;
        self.inner.focus(position)
    }

    /// Scopes the feed to vehicles around `origin`.
    pub fn set_origin(&self, origin: Option<LatLng>) {
        self.inner.update_feed(|request| request.origin = origin);
    }

    /// Pauses or resumes polling.
    pub fn set_feed_enabled(&self, enabled: bool) {
        self.inner.update_feed(|request| request.enabled = enabled);
    }

    /// Polls the feed immediately.
    pub fn refresh(&self) {
        if let Some(feed) = self.inner.lock().store.feed() {
            feed.refresh();
        }
    }

    /// Sets the route endpoints; a missing endpoint clears the route.
    pub fn set_route_endpoints(&self, origin: Option<LatLng>, destination: Option<LatLng>) {
        self.inner.routes.set_endpoints(origin, destination);
    }

    /// Recomputes the current route without moving the camera.
    pub fn refresh_route(&self) {
        self.inner.routes.refresh();
    }

    #[must_use]
    pub fn route(&self) -> Option<RouteResult> {
        self.inner.routes.result()
    }

    #[must_use]
    pub fn route_phase(&self) -> RoutePhase {
        self.inner.routes.phase()
    }

    pub fn on_vehicle_click(&self, handler: impl Fn(&TrackedEntity) + Send + Sync + 'static) -> Subscription {
        self.inner.vehicle_clicks.subscribe(handler)
    }

    pub fn on_route_calculated(&self, handler: impl Fn(&RouteResult) + Send + Sync + 'static) -> Subscription {
        self.inner.routes.on_calculated(handler)
    }

    pub fn on_notice(&self, handler: impl Fn(&RouteNotice) + Send + Sync + 'static) -> Subscription {
        self.inner.routes.on_notice(handler)
    }

    pub fn on_fleet_updated(&self, handler: impl Fn(&FleetUpdate) + Send + Sync + 'static) -> Subscription {
        self.inner.updates.subscribe(handler)
    }
}

impl Drop for FleetView {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for FleetView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("FleetView")
            .field("filter", &state.store.filter())
            .field("tracked", &state.store.len())
            .field("markers", &state.markers.len())
            .field("layer_visible", &state.layer_visible)
            .finish_non_exhaustive()
    }
}

fn pump(view: Weak<Inner>, mut events: mpsc::UnboundedReceiver<FeedEvent>) -> TaskHandle {
    TaskHandle::spawn(move |token| async move {
        loop {
            let event = tokio::select! {
                biased;
                () = token.cancelled() => return,
                event = events.recv() => event,
            };
            let (Some(event), Some(inner)) = (event, Weak::upgrade(&view)) else {
                return;
            };
            inner.handle_feed(event);
        }
    })
}

fn fleet_update(store: &FleetStore) -> FleetUpdate {
    FleetUpdate {
        filter: store.filter(),
        counts: store.counts(),
        status: store.status().clone(),
        tracked: store.len(),
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_feed(&self, event: FeedEvent) {
        let mut state = self.lock();
        match event {
            FeedEvent::Snapshot { request, response } => match state.store.apply(response, request.filter) {
                Ok(reconciliation) => {
                    if !reconciliation.is_empty() || state.markers.len() != state.store.visible().count() {
                        self.sync_markers(&mut state);
                    }
                }
                Err(Error::Outdated(reason)) => {
                    debug!(reason, "ignoring outdated snapshot");
                    return;
                }
                Err(err) => {
                    state.store.mark_failed(&err, request.filter);
                }
            },
            FeedEvent::Failed { request, error } => state.store.mark_failed(&error, request.filter),
        }

        let update = fleet_update(&state.store);
        drop(state);
        self.updates.emit(&update);
    }

    /// Brings the markers in line with the visible tracked set.
    fn sync_markers(&self, state: &mut ViewState) {
        let ViewState { store, icons, markers, owners, layer_visible } = state;

        let visible: HashMap<&str, &TrackedEntity> = if *layer_visible {
            store.visible().map(|entity| (entity.id.as_str(), entity)).collect()
        } else {
            HashMap::new()
        };

        let stale: Vec<String> = markers.keys().filter(|id| !visible.contains_key(id.as_str())).cloned().collect();
        for id in &stale {
            if let Some(slot) = markers.remove(id) {
                owners.remove(&slot.marker);
                self.remove_marker(slot);
            }
        }

        let (mut added, mut moved) = (0_usize, 0_usize);
        for (id, entity) in visible {
            let icon = icons.icon_for(entity);
            let target = Pose::new(entity.position, entity.heading);

            if let Some(slot) = markers.get_mut(id) {
                if !Arc::ptr_eq(&slot.style, &icon.style) {
                    self.surface.with(|surface| surface.set_marker_icon(slot.marker, &icon));
                    slot.style = Arc::clone(&icon.style);
                }
                if slot.animator.target() != target {
                    slot.animator.move_to(entity.position, entity.heading);
                    moved += 1;
                }
                continue;
            }

            let Some(marker) = self.surface.with(|surface| surface.place_marker(entity.position, &icon)) else {
                continue;
            };
            let animator = PositionAnimator::new(self.surface.clone(), marker, target, self.config.animation);
            markers.insert(id.to_string(), MarkerSlot { marker, style: Arc::clone(&icon.style), animator });
            owners.insert(marker, id.to_string());
            added += 1;
        }

        debug!(added, moved, removed = stale.len(), markers = markers.len(), "markers synced");
    }

    fn remove_marker(&self, mut slot: MarkerSlot) {
        slot.animator.stop();
        self.surface.with(|surface| surface.remove_marker(slot.marker));
    }

    fn handle_click(&self, click: SurfaceClick) {
        let SurfaceClick::Marker(marker) = click else {
            return;
        };

        let entity = {
            let state = self.lock();
            state.owners.get(&marker).and_then(|id| state.store.get(id)).cloned()
        };
        let Some(entity) = entity else {
            debug!(?marker, "click on unknown marker");
            return;
        };

        info!(id = %entity.id, class = %entity.class, "vehicle clicked");
        if self.config.focus_on_click {
            self.focus(entity.position);
        }
        self.vehicle_clicks.emit(&entity);
    }

    fn focus(&self, position: LatLng) -> Option<CameraAction> {
        let options = self.config.camera.focus(self.config.contextual_zoom);
        self.camera.zoom_to_single_point(position, &options)
    }

    fn update_feed(&self, edit: impl FnOnce(&mut FeedRequest)) {
        if let Some(feed) = self.lock().store.feed() {
            feed.update(edit);
        }
    }
}
