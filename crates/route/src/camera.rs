//! # Camera
//!
//! Frames the map on a single point or on a pair of route endpoints.
//!
//! Every operation resolves to a [`CameraAction`] computed from the current
//! [`Viewport`] and is then handed to the surface, which supersedes any
//! transition already in progress. When the surface is missing or not ready
//! the operation does nothing and returns `None`.

use std::time::Duration;

use realtime::geo::{self, Pixel};
use realtime::{CameraFit, CameraMove, LatLng, LatLngBounds, Padding, SurfaceRef, Viewport};
use tracing::debug;

/// Zoom levels a contextual zoom may wander below the base zoom.
const CONTEXT_ZOOM_RANGE: f64 = 2.0;

/// Smallest share of the viewport left for content after padding.
const MIN_CONTENT_SHARE: f64 = 0.2;

/// Camera defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraOptions {
    pub base_zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub animation: Duration,
    /// Viewports narrower than this use mobile padding.
    pub mobile_breakpoint: f64,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            base_zoom: 15.0,
            min_zoom: 3.0,
            max_zoom: 17.0,
            animation: Duration::from_millis(800),
            mobile_breakpoint: 768.0,
        }
    }
}

impl CameraOptions {
    #[must_use]
    pub const fn focus(&self, contextual_zoom: bool) -> FocusOptions {
        FocusOptions {
            contextual_zoom,
            base_zoom: self.base_zoom,
            max_zoom: self.max_zoom,
            duration: self.animation,
        }
    }

    #[must_use]
    pub const fn fit(&self, bottom_sheet_px: f64) -> FitOptions {
        FitOptions {
            bottom_sheet_px,
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom,
            duration: self.animation,
        }
    }
}

/// Options of [`CameraController::zoom_to_single_point`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusOptions {
    /// Keep the user's zoom when it is close to `base_zoom`.
    pub contextual_zoom: bool,
    pub base_zoom: f64,
    pub max_zoom: f64,
    pub duration: Duration,
}

/// Options of [`CameraController::fit_to_route`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Height of the panel covering the bottom of the map.
    pub bottom_sheet_px: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub duration: Duration,
}

/// The transition a camera operation resolved to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraAction {
    Move(CameraMove),
    Fit(CameraFit),
}

/// Zoom used when centering on a point.
#[must_use]
pub fn focus_zoom(current: f64, options: &FocusOptions) -> f64 {
    if options.contextual_zoom && current.is_finite() {
        let floor = (options.base_zoom - CONTEXT_ZOOM_RANGE).min(options.max_zoom);
        clamp_zoom(current, floor, options.max_zoom)
    } else {
        options.base_zoom
    }
}

/// `f64::clamp` without the panic on NaN or inverted bounds; a NaN bound is
/// ignored.
fn clamp_zoom(zoom: f64, floor: f64, ceiling: f64) -> f64 {
    zoom.max(floor).min(ceiling)
}

/// Insets keeping route endpoints clear of the bottom panel and screen
/// edges. Mobile viewports get narrower side insets.
#[must_use]
pub fn dynamic_padding(width: f64, height: f64, bottom_sheet_px: f64, mobile_breakpoint: f64) -> Padding {
    let sheet = bottom_sheet_px.max(0.0);
    let mut padding = if width < mobile_breakpoint {
        let side = (width * 0.08).max(24.0);
        Padding { top: 60.0, right: side, bottom: sheet + 32.0, left: side }
    } else {
        Padding { top: 80.0, right: 80.0, bottom: sheet + 80.0, left: 80.0 }
    };

    // shrink proportionally when the insets would swallow the viewport
    let max_horizontal = width * (1.0 - MIN_CONTENT_SHARE);
    let horizontal = padding.left + padding.right;
    if horizontal > max_horizontal && horizontal > 0.0 {
        let scale = max_horizontal / horizontal;
        padding.left *= scale;
        padding.right *= scale;
    }
    let max_vertical = height * (1.0 - MIN_CONTENT_SHARE);
    let vertical = padding.top + padding.bottom;
    if vertical > max_vertical && vertical > 0.0 {
        let scale = max_vertical / vertical;
        padding.top *= scale;
        padding.bottom *= scale;
    }

    padding
}

/// Resolves the camera for centering on `point`.
#[must_use]
pub fn plan_focus(point: LatLng, viewport: &Viewport, options: &FocusOptions) -> CameraMove {
    CameraMove { center: point, zoom: focus_zoom(viewport.zoom, options), duration: options.duration }
}

/// Resolves the camera for framing `a` and `b`. Coincident endpoints fall
/// back to centering on `a` at `base_zoom`.
#[must_use]
pub fn plan_fit(
    a: LatLng, b: LatLng, viewport: &Viewport, options: &FitOptions, camera: &CameraOptions,
) -> CameraAction {
    let bounds = LatLngBounds::from_points([&a, &b]).unwrap_or_else(|| LatLngBounds::from_point(a));
    if bounds.is_degenerate() {
        return CameraAction::Move(plan_focus(a, viewport, &camera.focus(false)));
    }

    let padding = dynamic_padding(viewport.width, viewport.height, options.bottom_sheet_px, camera.mobile_breakpoint);
    let inner_width = viewport.width - padding.left - padding.right;
    let inner_height = viewport.height - padding.top - padding.bottom;

    let floor = options.min_zoom.min(options.max_zoom);
    let zoom = clamp_zoom(geo::zoom_to_fit(&bounds, inner_width, inner_height), floor, options.max_zoom);

    // shift the center so the bounds sit in the middle of the padded area
    let south_west = geo::project(&bounds.south_west, zoom);
    let north_east = geo::project(&bounds.north_east, zoom);
    let shifted = Pixel {
        x: (south_west.x + north_east.x + padding.right - padding.left) / 2.0,
        y: (south_west.y + north_east.y + padding.bottom - padding.top) / 2.0,
    };

    CameraAction::Fit(CameraFit {
        bounds,
        padding,
        center: geo::unproject(&shifted, zoom),
        zoom,
        duration: options.duration,
    })
}

/// Drives camera transitions on the shared surface.
#[derive(Debug, Clone)]
pub struct CameraController {
    surface: SurfaceRef,
    options: CameraOptions,
}

impl CameraController {
    #[must_use]
    pub const fn new(surface: SurfaceRef, options: CameraOptions) -> Self {
        Self { surface, options }
    }

    #[must_use]
    pub const fn options(&self) -> &CameraOptions {
        &self.options
    }

    /// Centers the camera on `point`.
    pub fn zoom_to_single_point(&self, point: LatLng, options: &FocusOptions) -> Option<CameraAction> {
        if !point.is_valid() {
            debug!(?point, "ignoring focus on invalid point");
            return None;
        }

        self.surface.with(|surface| {
            let camera = plan_focus(point, &surface.viewport(), options);
            debug!(zoom = camera.zoom, "centering camera");
            surface.set_camera(&camera);
            CameraAction::Move(camera)
        })
    }

    /// Frames both route endpoints.
    pub fn fit_to_route(&self, a: LatLng, b: LatLng, options: &FitOptions) -> Option<CameraAction> {
        if !a.is_valid() || !b.is_valid() {
            debug!(?a, ?b, "ignoring fit on invalid endpoints");
            return None;
        }

        self.surface.with(|surface| {
            let action = plan_fit(a, b, &surface.viewport(), options, &self.options);
            match &action {
                CameraAction::Move(camera) => {
                    debug!("route endpoints coincide; centering instead");
                    surface.set_camera(camera);
                }
                CameraAction::Fit(fit) => {
                    debug!(zoom = fit.zoom, "fitting camera to route");
                    surface.fit_bounds(fit);
                }
            }
            action
        })
    }

    /// Halts the transition in progress.
    pub fn cancel(&self) {
        self.surface.with(|surface| surface.stop_camera());
    }
}
