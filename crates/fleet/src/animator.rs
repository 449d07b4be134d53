//! Smooth marker movement between position reports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use realtime::{LatLng, MarkerId, SurfaceRef, TaskHandle};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::heading;

const MIN_FRAME: Duration = Duration::from_millis(1);

/// Timing of marker animations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationOptions {
    /// When false every move is applied immediately.
    pub enabled: bool,
    /// Duration of the position interpolation.
    pub duration: Duration,
    /// Interval between rendered frames.
    pub frame_interval: Duration,
    /// Number of increments the heading rotation is split into.
    pub heading_steps: u32,
    /// Interval between heading increments.
    pub heading_tick: Duration,
}

impl Default for AnimationOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            duration: Duration::from_millis(600),
            frame_interval: Duration::from_millis(16),
            heading_steps: 10,
            heading_tick: Duration::from_millis(30),
        }
    }
}

/// A rendered marker position and rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: LatLng,
    pub heading: f64,
}

impl Pose {
    #[must_use]
    pub fn new(position: LatLng, heading: f64) -> Self {
        Self { position, heading: heading::normalize(heading) }
    }
}

/// Interpolation from one pose to another. Position is linear over
/// `duration`; heading advances along the shorter arc in `heading_steps`
/// increments, one every `heading_tick`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovePlan {
    from: Pose,
    to: Pose,
    duration: Duration,
    heading_steps: u32,
    heading_tick: Duration,
}

impl MovePlan {
    #[must_use]
    pub fn new(from: Pose, to: Pose, duration: Duration, options: &AnimationOptions) -> Self {
        Self {
            from,
            to: Pose::new(to.position, to.heading),
            duration,
            heading_steps: options.heading_steps,
            heading_tick: options.heading_tick,
        }
    }

    /// Time until the final frame.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.duration.max(self.heading_tick.saturating_mul(self.heading_steps))
    }

    /// Pose at `elapsed`, and whether the plan is complete. The completing
    /// frame is exactly the target pose.
    #[must_use]
    pub fn frame_at(&self, elapsed: Duration) -> (Pose, bool) {
        let progress = if self.duration.is_zero() {
            1.0
        } else {
            elapsed.as_secs_f64() / self.duration.as_secs_f64()
        };

        let step = if self.heading_tick.is_zero() {
            self.heading_steps
        } else {
            let ticks = elapsed.as_nanos() / self.heading_tick.as_nanos();
            u32::try_from(ticks).unwrap_or(u32::MAX).min(self.heading_steps)
        };

        let pose = Pose {
            position: self.from.position.lerp(&self.to.position, progress),
            heading: heading::step_towards(self.from.heading, self.to.heading, step, self.heading_steps),
        };
        (pose, progress >= 1.0 && step >= self.heading_steps)
    }
}

/// Owns the animation loop of one marker.
///
/// At most one loop runs at a time: every move first stops the previous one,
/// and dropping the animator cancels whatever is in flight.
#[derive(Debug)]
pub struct PositionAnimator {
    surface: SurfaceRef,
    marker: MarkerId,
    options: AnimationOptions,
    rendered: Arc<Mutex<Pose>>,
    target: Pose,
    running: Option<TaskHandle>,
    live_loops: Arc<AtomicUsize>,
}

impl PositionAnimator {
    /// Animator for a marker already placed at `initial`.
    #[must_use]
    pub fn new(surface: SurfaceRef, marker: MarkerId, initial: Pose, options: AnimationOptions) -> Self {
        Self {
            surface,
            marker,
            options,
            rendered: Arc::new(Mutex::new(initial)),
            target: initial,
            running: None,
            live_loops: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub const fn marker(&self) -> MarkerId {
        self.marker
    }

    /// Pose most recently pushed to the surface.
    #[must_use]
    pub fn rendered(&self) -> Pose {
        *lock(&self.rendered)
    }

    /// Pose the marker is heading to (or resting at).
    #[must_use]
    pub const fn target(&self) -> Pose {
        self.target
    }

    /// Moves the marker to `position`/`heading` over the configured duration.
    pub fn move_to(&mut self, position: LatLng, heading: f64) {
        self.move_to_over(position, heading, self.options.duration);
    }

    /// Moves the marker over `duration`, starting from the rendered pose.
    /// A zero duration, or disabled animation, applies the pose immediately.
    pub fn move_to_over(&mut self, position: LatLng, heading: f64, duration: Duration) {
        self.stop();

        let to = Pose::new(position, heading);
        self.target = to;

        if !self.options.enabled || duration.is_zero() {
            self.render(to);
            return;
        }

        let plan = MovePlan::new(self.rendered(), to, duration, &self.options);
        let surface = self.surface.clone();
        let marker = self.marker;
        let rendered = Arc::clone(&self.rendered);
        let live = Arc::clone(&self.live_loops);
        let frame = self.options.frame_interval.max(MIN_FRAME);

        self.running = Some(TaskHandle::spawn(move |token| async move {
            let _live = LiveLoop::enter(live);
            let start = Instant::now();
            let mut ticker = time::interval(frame);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                let (pose, done) = plan.frame_at(start.elapsed());
                {
                    // `stop` cancels while holding this lock
                    let mut current = lock(&rendered);
                    if token.is_cancelled() {
                        return;
                    }
                    *current = pose;
                    surface.with(|s| s.move_marker(marker, pose.position, pose.heading));
                }

                if done || !surface.is_alive() {
                    return;
                }
            }
        }));
    }

    /// Cancels the loop in flight, leaving the marker at its last
    /// interpolated pose. No frame reaches the surface after this returns,
    /// whichever runtime flavor drives the loop.
    pub fn stop(&mut self) {
        if let Some(task) = self.running.take() {
            let _frame = lock(&self.rendered);
            task.cancel();
        }
    }

    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.running.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Number of loops of this animator still executing.
    #[must_use]
    pub fn live_loops(&self) -> usize {
        self.live_loops.load(Ordering::SeqCst)
    }

    fn render(&self, pose: Pose) {
        *lock(&self.rendered) = pose;
        self.surface.with(|s| s.move_marker(self.marker, pose.position, pose.heading));
    }
}

impl Drop for PositionAnimator {
    fn drop(&mut self) {
        self.stop();
    }
}

struct LiveLoop(Arc<AtomicUsize>);

impl LiveLoop {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveLoop {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock(pose: &Mutex<Pose>) -> MutexGuard<'_, Pose> {
    pose.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> MovePlan {
        let from = Pose::new(LatLng::new(-4.32, 15.30), 355.0);
        let to = Pose::new(LatLng::new(-4.321, 15.301), 5.0);
        MovePlan::new(from, to, Duration::from_millis(600), &AnimationOptions::default())
    }

    #[test]
    fn first_frame_is_start() {
        let (pose, done) = plan().frame_at(Duration::ZERO);
        assert_eq!(pose.position, LatLng::new(-4.32, 15.30));
        assert!((pose.heading - 355.0).abs() < 1e-9);
        assert!(!done);
    }

    #[test]
    fn heading_finishes_before_position() {
        let (pose, done) = plan().frame_at(Duration::from_millis(300));
        assert!((pose.heading - 5.0).abs() < 1e-9);
        assert!((pose.position.lat - -4.3205).abs() < 1e-9);
        assert!(!done);
    }

    #[test]
    fn heading_rotates_through_north() {
        let plan = plan();
        for ms in (0..=300).step_by(30) {
            let (pose, _) = plan.frame_at(Duration::from_millis(ms));
            let from_start = heading::shortest_delta(355.0, pose.heading);
            assert!((0.0..=10.0 + 1e-9).contains(&from_start), "{ms}ms: heading {}", pose.heading);
        }
    }

    #[test]
    fn last_frame_is_exact_target() {
        let (pose, done) = plan().frame_at(Duration::from_millis(650));
        assert_eq!(pose.position, LatLng::new(-4.321, 15.301));
        assert!((pose.heading - 5.0).abs() < f64::EPSILON);
        assert!(done);
    }

    #[test]
    fn total_covers_slowest_channel() {
        let options = AnimationOptions::default();
        let start = Pose::new(LatLng::new(0.0, 0.0), 0.0);
        let short = MovePlan::new(start, start, Duration::from_millis(100), &options);
        assert_eq!(short.total(), Duration::from_millis(300));
        assert_eq!(plan().total(), Duration::from_millis(600));
    }
}
