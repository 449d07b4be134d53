//! # Map Surface
//!
//! The rendering capability consumed by the engine. A backend (web map, native
//! map view, test recorder) implements [`MapSurface`]; the composition root
//! owns the only strong reference and every other component holds a
//! [`SurfaceRef`], which cannot keep the surface alive or dispose of it.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;

use crate::geo::{LatLng, LatLngBounds};

/// Backend-assigned marker identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MarkerId(pub u64);

/// Backend-assigned polyline identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PolylineId(pub u64);

/// Status badge drawn around a vehicle silhouette.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Badge {
    /// Pulsing ring, used for vehicles that can take a job.
    PulseRing { color: &'static str },
    /// Animated progress halo, used while a vehicle is on a job.
    ProgressHalo { color: &'static str },
    /// No animation; the marker is greyed out.
    Dimmed,
}

/// Immutable visual content of a marker, excluding its rotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerStyle {
    pub silhouette: &'static str,
    pub color: &'static str,
    pub badge: Badge,
    pub opacity: f64,
    pub package: bool,
}

/// A marker style plus the rotation applied to the silhouette.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerIcon {
    pub style: Arc<MarkerStyle>,
    pub rotation: f64,
}

/// Stroke parameters for a polyline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeStyle {
    pub color: String,
    pub width: f64,
    pub opacity: f64,
    pub z_index: i32,
}

/// Per-side pixel insets applied when fitting bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Padding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// Current camera and pixel size of the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub center: LatLng,
    pub zoom: f64,
}

/// Move the camera to a center and zoom, animated over `duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMove {
    pub center: LatLng,
    pub zoom: f64,
    pub duration: Duration,
}

/// Fit the camera to `bounds` inside `padding`. `center` and `zoom` are the
/// resolved camera, so backends without native fit support can use
/// [`MapSurface::set_camera`] semantics instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFit {
    pub bounds: LatLngBounds,
    pub padding: Padding,
    pub center: LatLng,
    pub zoom: f64,
    pub duration: Duration,
}

/// A click delivered by the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceClick {
    Marker(MarkerId),
    Map(LatLng),
}

/// Click callback registered with a surface.
pub type ClickHandler = Arc<dyn Fn(SurfaceClick) + Send + Sync>;

/// Rendering capability required by the engine.
///
/// Implementations must not invoke click handlers from inside their own
/// methods; clicks arrive from the backend's event loop.
pub trait MapSurface: Send + Sync {
    /// Whether the backend has finished initializing.
    fn is_ready(&self) -> bool;

    fn viewport(&self) -> Viewport;

    fn place_marker(&self, position: LatLng, icon: &MarkerIcon) -> MarkerId;

    fn move_marker(&self, marker: MarkerId, position: LatLng, rotation: f64);

    fn set_marker_icon(&self, marker: MarkerId, icon: &MarkerIcon);

    fn remove_marker(&self, marker: MarkerId);

    /// Starts a camera transition, superseding any transition in progress.
    fn set_camera(&self, camera: &CameraMove);

    /// Starts a fit-to-bounds transition, superseding any transition in progress.
    fn fit_bounds(&self, fit: &CameraFit);

    /// Halts the current camera transition where it is.
    fn stop_camera(&self);

    fn draw_polyline(&self, path: &[LatLng], style: &StrokeStyle) -> PolylineId;

    fn update_polyline(&self, line: PolylineId, path: &[LatLng]);

    fn remove_polyline(&self, line: PolylineId);

    fn on_click(&self, handler: ClickHandler);
}

/// Non-owning handle to the map surface.
#[derive(Clone, Default)]
pub struct SurfaceRef {
    inner: Option<Weak<dyn MapSurface>>,
}

impl SurfaceRef {
    #[must_use]
    pub fn new(surface: &Arc<dyn MapSurface>) -> Self {
        Self { inner: Some(Arc::downgrade(surface)) }
    }

    /// A handle that never resolves, for components created before the
    /// surface exists.
    #[must_use]
    pub const fn detached() -> Self {
        Self { inner: None }
    }

    /// Runs `f` against the surface when it is alive and ready. Returns `None`
    /// (and does nothing) otherwise.
    pub fn with<R>(&self, f: impl FnOnce(&dyn MapSurface) -> R) -> Option<R> {
        let Some(surface) = self.inner.as_ref().and_then(Weak::upgrade) else {
            tracing::debug!("map surface released; skipping");
            return None;
        };
        if !surface.is_ready() {
            tracing::debug!("map surface not ready; skipping");
            return None;
        }
        Some(f(surface.as_ref()))
    }

    /// Whether the owning surface still exists.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.as_ref().is_some_and(|weak| weak.strong_count() > 0)
    }
}

impl fmt::Debug for SurfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceRef").field("alive", &self.is_alive()).finish()
    }
}
