use std::env;
use std::time::Duration;

use fleet::{AnimationOptions, FeedOptions};
use route::{CameraOptions, RouteOptions};

const DEFAULT_FEED_URL: &str = "http://localhost:8080";
const DEFAULT_ROUTING_URL: &str = "http://localhost:8081";

/// Engine configuration. [`Config::default`] holds the built-in defaults;
/// [`Config::from_env`] overrides them from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub feed: FeedOptions,
    pub search_radius_km: f64,
    pub animation: AnimationOptions,
    pub route: RouteOptions,
    pub camera: CameraOptions,
    /// Keep the user's zoom when centering on a vehicle.
    pub contextual_zoom: bool,
    /// Center the camera on a vehicle when its marker is clicked.
    pub focus_on_click: bool,
    pub feed_url: String,
    pub routing_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedOptions::default(),
            search_radius_km: 5.0,
            animation: AnimationOptions::default(),
            route: RouteOptions::default(),
            camera: CameraOptions::default(),
            contextual_zoom: true,
            focus_on_click: true,
            feed_url: DEFAULT_FEED_URL.to_string(),
            routing_url: DEFAULT_ROUTING_URL.to_string(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let feed = FeedOptions {
            poll_interval: Duration::from_secs(env_u64(
                "FLEET_POLL_INTERVAL_SECS",
                defaults.feed.poll_interval.as_secs(),
            )),
        };

        let animation = AnimationOptions {
            enabled: env_bool("FLEET_ANIMATION_ENABLED", defaults.animation.enabled),
            duration: env_millis("FLEET_ANIMATION_DURATION_MS", defaults.animation.duration),
            frame_interval: env_millis("FLEET_FRAME_INTERVAL_MS", defaults.animation.frame_interval),
            heading_steps: u32::try_from(env_u64(
                "FLEET_HEADING_STEPS",
                u64::from(defaults.animation.heading_steps),
            ))
            .unwrap_or(defaults.animation.heading_steps),
            heading_tick: env_millis("FLEET_HEADING_TICK_MS", defaults.animation.heading_tick),
        };

        let route = RouteOptions {
            debounce: env_millis("ROUTE_DEBOUNCE_MS", defaults.route.debounce),
            want_traffic: env_bool("ROUTE_TRAFFIC", defaults.route.want_traffic),
            smoothing: env_bool("ROUTE_SMOOTHING", defaults.route.smoothing),
            progressive_draw: env_bool("ROUTE_PROGRESSIVE_DRAW", defaults.route.progressive_draw),
            draw_duration: env_millis("ROUTE_DRAW_DURATION_MS", defaults.route.draw_duration),
            bottom_sheet_px: env_f64("ROUTE_BOTTOM_SHEET_PX", defaults.route.bottom_sheet_px),
        };

        let camera = CameraOptions {
            base_zoom: env_f64("CAMERA_BASE_ZOOM", defaults.camera.base_zoom),
            min_zoom: env_f64("CAMERA_MIN_ZOOM", defaults.camera.min_zoom),
            max_zoom: env_f64("CAMERA_MAX_ZOOM", defaults.camera.max_zoom),
            animation: env_millis("CAMERA_ANIMATION_MS", defaults.camera.animation),
            mobile_breakpoint: env_f64("CAMERA_MOBILE_BREAKPOINT_PX", defaults.camera.mobile_breakpoint),
        };

        Self {
            feed,
            search_radius_km: env_f64("FLEET_SEARCH_RADIUS_KM", defaults.search_radius_km),
            animation,
            route,
            camera,
            contextual_zoom: env_bool("CAMERA_CONTEXTUAL_ZOOM", defaults.contextual_zoom),
            focus_on_click: env_bool("FLEET_FOCUS_ON_CLICK", defaults.focus_on_click),
            feed_url: env_string("FLEET_FEED_URL", DEFAULT_FEED_URL),
            routing_url: env_string("ROUTING_URL", DEFAULT_ROUTING_URL),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        tracing::trace!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|value| value.parse::<u64>().ok()).unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_environment() {
        // SAFETY:
        // Only this test touches these variables.
        unsafe {
            env::set_var("ROUTE_DEBOUNCE_MS", "150");
            env::set_var("FLEET_ANIMATION_ENABLED", "false");
            env::set_var("CAMERA_MAX_ZOOM", "18.5");
            env::set_var("FLEET_HEADING_STEPS", "not a number");
            env::set_var("CAMERA_BASE_ZOOM", "nan");
            env::set_var("CAMERA_MIN_ZOOM", "-inf");
        };

        let config = Config::from_env();

        assert_eq!(config.route.debounce, Duration::from_millis(150));
        assert!(!config.animation.enabled);
        assert!((config.camera.max_zoom - 18.5).abs() < f64::EPSILON);
        assert_eq!(config.animation.heading_steps, 10);
        assert_eq!(config.feed.poll_interval, Duration::from_secs(10));
        assert!((config.camera.base_zoom - 15.0).abs() < f64::EPSILON);
        assert!((config.camera.min_zoom - 3.0).abs() < f64::EPSILON);

        // SAFETY:
        // See above.
        unsafe {
            env::remove_var("ROUTE_DEBOUNCE_MS");
            env::remove_var("FLEET_ANIMATION_ENABLED");
            env::remove_var("CAMERA_MAX_ZOOM");
            env::remove_var("FLEET_HEADING_STEPS");
            env::remove_var("CAMERA_BASE_ZOOM");
            env::remove_var("CAMERA_MIN_ZOOM");
        };
    }
}
