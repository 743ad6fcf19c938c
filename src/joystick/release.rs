//! Release animation ("simulated touch")
//!
//! When a finger lifts, the stick handle travels from its last live position
//! back to the origin over a fixed wall-clock duration. [`ReleaseAnimation`]
//! is the pure interpolation schedule; [`ReleaseAnimator`] runs it on its own
//! tokio timer and hands back a [`ReleaseHandle`] for cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use super::{JoystickSide, PointSample};

/// Interpolation schedule for one released stick
#[derive(Debug, Clone)]
pub struct ReleaseAnimation {
    side: JoystickSide,
    start_point: PointSample,
    origin: PointSample,
    frame_rate: u32,
    duration: Duration,
}

impl ReleaseAnimation {
    /// Create a schedule from `start_point` back to `origin`
    ///
    /// A frame rate of 0 is treated as 1 fps.
    pub fn new(
        side: JoystickSide,
        start_point: PointSample,
        origin: PointSample,
        frame_rate: u32,
        duration: Duration,
    ) -> Self {
        Self {
            side,
            start_point,
            origin,
            frame_rate: frame_rate.max(1),
            duration,
        }
    }

    /// Frame period, `1000 / frame_rate` milliseconds
    pub fn tick(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate as f64)
    }

    /// Number of frames the animation is expected to take (at least one)
    pub fn step_count(&self) -> u32 {
        let frames = self.duration.as_secs_f64() / self.tick().as_secs_f64();
        (frames.round() as u32).max(1)
    }

    /// Elapsed fraction, clamped to `[0, 1]`
    pub fn progress(&self, elapsed: Duration) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Interpolated handle position after `elapsed`
    pub fn point_at(&self, elapsed: Duration) -> PointSample {
        self.start_point.lerp(self.origin, self.progress(elapsed))
    }

    /// Position for the 1-based frame `step` taken `elapsed` after start,
    /// and whether it is the last one
    ///
    /// The run ends at the expected frame count or once the duration has
    /// elapsed, whichever comes first. The last frame lands exactly on the
    /// origin regardless of rounding.
    pub fn frame(&self, step: u32, elapsed: Duration) -> (PointSample, bool) {
        if step >= self.step_count() || elapsed >= self.duration {
            return (self.origin, true);
        }
        (self.point_at(elapsed), false)
    }
}

/// Receiver of animation frames
///
/// `on_complete` fires exactly once after the final step of a run that was
/// not cancelled.
pub trait ReleaseCallbacks: Send + 'static {
    fn on_step(&mut self, point: PointSample);
    fn on_complete(&mut self);
}

#[derive(Debug, Default)]
struct RunFlags {
    ready: AtomicBool,
    finished: AtomicBool,
    cancelled: AtomicBool,
}

/// Handle to a running animation
///
/// Dropping the handle cancels the run and releases its timer.
#[derive(Debug)]
pub struct ReleaseHandle {
    flags: Arc<RunFlags>,
    task: Option<JoinHandle<()>>,
}

impl ReleaseHandle {
    /// Whether at least one step has executed
    pub fn is_ready(&self) -> bool {
        self.flags.ready.load(Ordering::Acquire)
    }

    /// Whether the run reached its final step and completed
    pub fn is_finished(&self) -> bool {
        self.flags.finished.load(Ordering::Acquire)
    }

    /// Stop future steps; `on_complete` will not be invoked
    pub fn cancel(&mut self) {
        if self.is_finished() {
            self.task.take();
            return;
        }
        self.flags.cancelled.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ReleaseHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Timer-driven runner for [`ReleaseAnimation`]
pub struct ReleaseAnimator;

impl ReleaseAnimator {
    /// Start animating on the current tokio runtime
    ///
    /// Each frame computes the wall-clock elapsed time since start, so frame
    /// jitter does not stretch the animation. The run ends when either the
    /// duration has elapsed or the expected frame count is reached.
    pub fn start<C: ReleaseCallbacks>(animation: ReleaseAnimation, mut callbacks: C) -> ReleaseHandle {
        let flags = Arc::new(RunFlags::default());
        let run_flags = Arc::clone(&flags);

        let tick = animation.tick();
        let step_count = animation.step_count();

        debug!(
            "Release animation started: side={}, from=({:.1}, {:.1}) to=({:.1}, {:.1}), {} steps over {:?}",
            animation.side,
            animation.start_point.x,
            animation.start_point.y,
            animation.origin.x,
            animation.origin.y,
            step_count,
            animation.duration
        );

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut interval = interval_at(started + tick, tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut step = 0u32;
            loop {
                interval.tick().await;

                if run_flags.cancelled.load(Ordering::Acquire) {
                    trace!("Release animation ({}) cancelled before step {}", animation.side, step + 1);
                    return;
                }

                step += 1;
                let (point, is_final) = animation.frame(step, started.elapsed());

                trace!(
                    "Release step {} ({}): ({:.1}, {:.1})",
                    step,
                    animation.side,
                    point.x,
                    point.y
                );
                callbacks.on_step(point);
                run_flags.ready.store(true, Ordering::Release);

                if is_final {
                    if run_flags.cancelled.load(Ordering::Acquire) {
                        return;
                    }
                    run_flags.finished.store(true, Ordering::Release);
                    callbacks.on_complete();
                    debug!("Release animation ({}) completed after {} steps", animation.side, step);
                    return;
                }
            }
        });

        ReleaseHandle {
            flags,
            task: Some(task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Frame {
        Step(PointSample),
        Complete,
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Frame>>>);

    impl Recorder {
        fn frames(&self) -> Vec<Frame> {
            self.0.lock().clone()
        }
    }

    impl ReleaseCallbacks for Recorder {
        fn on_step(&mut self, point: PointSample) {
            self.0.lock().push(Frame::Step(point));
        }

        fn on_complete(&mut self) {
            self.0.lock().push(Frame::Complete);
        }
    }

    fn animation(duration_ms: u64) -> ReleaseAnimation {
        ReleaseAnimation::new(
            JoystickSide::Left,
            PointSample::new(200.0, 250.0),
            PointSample::new(200.0, 300.0),
            30,
            Duration::from_millis(duration_ms),
        )
    }

    #[test]
    fn test_step_count_rounds() {
        assert_eq!(animation(100).step_count(), 3);
        assert_eq!(animation(250).step_count(), 8); // 7.5 rounds up
        assert_eq!(animation(500).step_count(), 15);
        assert_eq!(animation(0).step_count(), 1);
    }

    #[test]
    fn test_progress_is_clamped() {
        let a = animation(100);
        assert_eq!(a.progress(Duration::ZERO), 0.0);
        assert_eq!(a.progress(Duration::from_millis(50)), 0.5);
        assert_eq!(a.progress(Duration::from_millis(500)), 1.0);
        assert_eq!(animation(0).progress(Duration::ZERO), 1.0);
    }

    #[test]
    fn test_last_frame_lands_on_origin() {
        let a = animation(250);
        let origin = PointSample::new(200.0, 300.0);

        let (mid, is_final) = a.frame(4, a.tick() * 4);
        assert!(!is_final);
        assert!(mid.y > 250.0 && mid.y < 300.0);

        // Frame count reached, even if the clock says otherwise
        let (last, is_final) = a.frame(a.step_count(), Duration::from_millis(200));
        assert!(is_final);
        assert_eq!(last, origin);

        // Late timer: the duration is over after only a few frames
        let (late, is_final) = a.frame(2, Duration::from_millis(260));
        assert!(is_final);
        assert_eq!(late, origin);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_on_origin() {
        let recorder = Recorder::default();
        let handle = ReleaseAnimator::start(animation(100), recorder.clone());
        assert!(!handle.is_ready());

        tokio::time::sleep(Duration::from_millis(300)).await;

        let frames = recorder.frames();
        assert_eq!(frames.len(), 4); // 3 steps + completion
        assert_eq!(frames[2], Frame::Step(PointSample::new(200.0, 300.0)));
        assert_eq!(frames[3], Frame::Complete);
        assert!(handle.is_ready());
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_move_towards_origin() {
        let recorder = Recorder::default();
        let _handle = ReleaseAnimator::start(animation(500), recorder.clone());

        tokio::time::sleep(Duration::from_millis(600)).await;

        let ys: Vec<f64> = recorder
            .frames()
            .iter()
            .filter_map(|f| match f {
                Frame::Step(p) => Some(p.y),
                Frame::Complete => None,
            })
            .collect();

        assert_eq!(ys.len(), 15);
        assert!(ys.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*ys.last().unwrap(), 300.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_steps_without_completion() {
        let recorder = Recorder::default();
        let mut handle = ReleaseAnimator::start(animation(500), recorder.clone());

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(handle.is_ready());
        let seen = recorder.frames().len();
        assert!(seen > 0);

        handle.cancel();

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let frames = recorder.frames();
        assert_eq!(frames.len(), seen);
        assert!(!frames.contains(&Frame::Complete));
        assert!(!handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_timer() {
        let recorder = Recorder::default();
        let handle = ReleaseAnimator::start(animation(500), recorder.clone());
        drop(handle);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(recorder.frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_runs() {
        let left = Recorder::default();
        let right = Recorder::default();

        let mut left_handle = ReleaseAnimator::start(animation(500), left.clone());
        let _right_handle = ReleaseAnimator::start(
            ReleaseAnimation::new(
                JoystickSide::Right,
                PointSample::new(600.0, 300.0),
                PointSample::new(650.0, 300.0),
                30,
                Duration::from_millis(100),
            ),
            right.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        left_handle.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(right.frames().last(), Some(&Frame::Complete));
        assert!(!left.frames().contains(&Frame::Complete));
    }
}
