//! Dual-touch tracker - the stateful core of the virtual joystick
//!
//! Owns the LEFT and RIGHT touch streams. Every sample is classified by
//! screen half, clamped against the side's origin and turned into axis
//! values; released sides are handed to a [`ReleaseAnimator`] that walks the
//! handle back to center while overwriting that side's axes.
//!
//! ## Per-side state machine
//!
//! `Idle → Tracking → Releasing → Idle`
//!
//! - A release run is identified by a per-side run id. Starting a new gesture
//!   cancels the run and bumps the id, so a step that was already queued can
//!   never write into the new gesture.
//! - A side with hold enabled whose primary axis is beyond the hold
//!   threshold is not animated on release; it stays live at its last value.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace};

use super::axis::{hold_if_beyond_threshold, is_out_of_range, primary_axis, secondary_axis};
use super::release::{ReleaseAnimation, ReleaseAnimator, ReleaseCallbacks, ReleaseHandle};
use super::{JoystickSide, PointSample, MOUSE_JOYSTICK_COLOR};
use crate::config::{JoystickConfig, OriginCapture};
use crate::control::{ControlChannel, ControlVector};


/// Live state of one side
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TouchState {
    /// Reference point captured at gesture start
    pub origin: Option<PointSample>,
    /// Last in-range sample
    pub current: Option<PointSample>,
    /// Vertical axis (throttle on LEFT, pitch on RIGHT)
    pub primary: f64,
    /// Horizontal axis (yaw on LEFT, roll on RIGHT)
    pub secondary: f64,
    /// Whether a finger was on this side in the last touch batch
    pub tracking: bool,
}

/// What the rendering layer needs to draw one stick
#[derive(Debug, Clone, PartialEq)]
pub struct DrawHandle {
    pub side: JoystickSide,
    pub current: PointSample,
    pub origin: PointSample,
    pub color: &'static str,
}

struct ActiveRelease {
    run_id: u64,
    origin: PointSample,
    current: PointSample,
    handle: ReleaseHandle,
}

#[derive(Default)]
struct SideSlot {
    state: TouchState,
    release: Option<ActiveRelease>,
    next_run_id: u64,
}

impl SideSlot {
    fn cancel_release(&mut self) {
        if let Some(mut release) = self.release.take() {
            release.handle.cancel();
            trace!("Cancelled release run {}", release.run_id);
        }
    }
}

struct TrackerInner {
    config: JoystickConfig,
    viewport_width: f64,
    viewport_height: f64,
    sides: [SideSlot; 2],
    mouse_active: bool,
}

impl TrackerInner {
    fn slot(&self, side: JoystickSide) -> &SideSlot {
        &self.sides[side.index()]
    }

    fn slot_mut(&mut self, side: JoystickSide) -> &mut SideSlot {
        &mut self.sides[side.index()]
    }

    fn hold_enabled(&self, side: JoystickSide) -> bool {
        match side {
            JoystickSide::Left => self.config.hold_left,
            JoystickSide::Right => self.config.hold_right,
        }
    }

    /// Whether `side` keeps its position after the finger lifts
    fn is_held(&self, side: JoystickSide) -> bool {
        self.hold_enabled(side)
            && hold_if_beyond_threshold(self.slot(side).state.primary, self.config.hold_threshold)
    }

    fn may_capture_origin(&self, side: JoystickSide) -> bool {
        let state = &self.slot(side).state;
        match self.config.origin_capture {
            OriginCapture::Always => true,
            OriginCapture::IfNotTracking => !state.tracking,
            OriginCapture::HoldAware => {
                !state.tracking && (state.origin.is_none() || !self.is_held(side))
            }
        }
    }

    /// Clamp and apply one sample; returns false if it was dropped
    fn apply_sample(&mut self, side: JoystickSide, sample: PointSample) -> bool {
        let max_range = self.config.max_range;
        let state = &mut self.slot_mut(side).state;

        let Some(origin) = state.origin else {
            return false;
        };
        if is_out_of_range(sample, Some(origin), max_range) {
            trace!(
                "Dropping {} sample ({:.1}, {:.1}): beyond {:.0}px from origin",
                side,
                sample.x,
                sample.y,
                max_range
            );
            return false;
        }

        state.current = Some(sample);
        state.primary = primary_axis(sample, origin);
        state.secondary = secondary_axis(sample, origin);
        true
    }

    fn control_vector(&self) -> ControlVector {
        let left = &self.slot(JoystickSide::Left).state;
        let right = &self.slot(JoystickSide::Right).state;
        ControlVector {
            throttle: left.primary,
            yaw: left.secondary,
            pitch: right.primary,
            roll: right.secondary,
        }
    }
}

/// Dual-touch joystick tracker
///
/// Cheap to clone; clones share the same state. Separate trackers never
/// share anything. Releasing a side spawns a timer task, so release-capable
/// calls must run inside a tokio runtime.
#[derive(Clone)]
pub struct DualTouchTracker {
    inner: Arc<Mutex<TrackerInner>>,
    channel: Arc<dyn ControlChannel>,
}

impl DualTouchTracker {
    /// Create a tracker for a viewport of the given size
    pub fn new(
        config: JoystickConfig,
        viewport_width: f64,
        viewport_height: f64,
        channel: Arc<dyn ControlChannel>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackerInner {
                config,
                viewport_width,
                viewport_height,
                sides: Default::default(),
                mouse_active: false,
            })),
            channel,
        }
    }

    /// Apply new joystick settings; in-flight gestures keep their origins
    ///
    /// A lifted side that was only held in place by the old settings starts
    /// releasing, so it must run inside a tokio runtime.
    pub fn update_config(&self, config: JoystickConfig) {
        let mut inner = self.inner.lock();
        let was_held = JoystickSide::ALL.map(|side| inner.is_held(side));
        inner.config = config;

        for side in JoystickSide::ALL {
            let lifted = !inner.slot(side).state.tracking;
            if was_held[side.index()] && lifted && !inner.is_held(side) {
                debug!("{} stick no longer held, releasing", side);
                self.begin_release(&mut inner, side);
            }
        }
    }

    /// Resize/orientation change of the input surface
    pub fn set_viewport(&self, width: f64, height: f64) {
        let mut inner = self.inner.lock();
        inner.viewport_width = width;
        inner.viewport_height = height;
        debug!("Viewport set to {}x{}", width, height);
    }

    pub fn viewport(&self) -> (f64, f64) {
        let inner = self.inner.lock();
        (inner.viewport_width, inner.viewport_height)
    }

    /// Touch start with every currently active touch
    pub fn touch_start(&self, touches: &[PointSample]) {
        let mut inner = self.inner.lock();

        // A new gesture on a releasing side preempts its animation
        for touch in touches {
            let side = JoystickSide::classify(touch.x, inner.viewport_width);
            inner.slot_mut(side).cancel_release();
        }

        let tracked = self.parse_batch(&mut inner, touches, true);
        for &side in &tracked {
            inner.slot_mut(side).state.tracking = true;
        }

        if !tracked.is_empty() {
            self.emit(&inner);
        }
    }

    /// Touch move with every currently active touch
    ///
    /// A batch with no in-range sample changes nothing and emits nothing.
    pub fn touch_move(&self, touches: &[PointSample]) {
        let mut inner = self.inner.lock();
        if !self.parse_batch(&mut inner, touches, false).is_empty() {
            self.emit(&inner);
        }
    }

    /// Touch end with the touches that are still down
    ///
    /// Sides that were tracked but have no remaining touch start releasing.
    pub fn touch_end(&self, remaining: &[PointSample]) {
        let mut inner = self.inner.lock();

        let mut still_down = [false; 2];
        for touch in remaining {
            still_down[JoystickSide::classify(touch.x, inner.viewport_width).index()] = true;
        }

        for side in JoystickSide::ALL {
            let down = still_down[side.index()];
            let state = &mut inner.slot_mut(side).state;
            let ended = state.tracking && !down;
            state.tracking = down;
            if ended {
                self.begin_release(&mut inner, side);
            }
        }
    }

    /// Mouse button pressed: the whole surface acts as one joystick
    pub fn mouse_down(&self, point: PointSample) {
        let mut inner = self.inner.lock();
        let side = inner.config.mouse_side;
        inner.mouse_active = true;

        let slot = inner.slot_mut(side);
        slot.cancel_release();
        slot.state = TouchState {
            origin: Some(point),
            current: Some(point),
            primary: 0.0,
            secondary: 0.0,
            tracking: true,
        };

        self.emit(&inner);
    }

    pub fn mouse_move(&self, point: PointSample) {
        let mut inner = self.inner.lock();
        if !inner.mouse_active {
            return;
        }
        let side = inner.config.mouse_side;
        if inner.apply_sample(side, point) {
            self.emit(&inner);
        }
    }

    pub fn mouse_up(&self) {
        let mut inner = self.inner.lock();
        if !inner.mouse_active {
            return;
        }
        inner.mouse_active = false;
        let side = inner.config.mouse_side;
        inner.slot_mut(side).state.tracking = false;
        self.begin_release(&mut inner, side);
    }

    /// Cancel everything and zero all axes
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.mouse_active = false;
        for slot in inner.sides.iter_mut() {
            slot.cancel_release();
            slot.state = TouchState::default();
        }
        self.emit(&inner);
    }

    /// Current values of all four axes
    pub fn control_vector(&self) -> ControlVector {
        self.inner.lock().control_vector()
    }

    pub fn side_state(&self, side: JoystickSide) -> TouchState {
        self.inner.lock().slot(side).state.clone()
    }

    /// Whether a release animation is in flight for `side`
    pub fn is_releasing(&self, side: JoystickSide) -> bool {
        self.inner.lock().slot(side).release.is_some()
    }

    /// Sticks to draw: live or held sides, and releases that have stepped
    pub fn draw_handles(&self) -> Vec<DrawHandle> {
        let inner = self.inner.lock();
        let mut handles = Vec::new();

        for side in JoystickSide::ALL {
            let slot = inner.slot(side);
            if slot.state.tracking || inner.is_held(side) {
                if let (Some(current), Some(origin)) = (slot.state.current, slot.state.origin) {
                    let color = if inner.mouse_active && side == inner.config.mouse_side {
                        MOUSE_JOYSTICK_COLOR
                    } else {
                        side.color()
                    };
                    handles.push(DrawHandle {
                        side,
                        current,
                        origin,
                        color,
                    });
                }
            }

            if let Some(release) = slot.release.as_ref().filter(|r| r.handle.is_ready()) {
                handles.push(DrawHandle {
                    side,
                    current: release.current,
                    origin: release.origin,
                    color: side.color(),
                });
            }
        }

        handles
    }

    /// Classify, clamp and apply a batch; returns the sides that took a sample
    fn parse_batch(
        &self,
        inner: &mut TrackerInner,
        touches: &[PointSample],
        define_origin: bool,
    ) -> Vec<JoystickSide> {
        let mut sides = Vec::with_capacity(2);

        for &touch in touches {
            let side = JoystickSide::classify(touch.x, inner.viewport_width);

            if define_origin && inner.may_capture_origin(side) {
                inner.slot_mut(side).state.origin = Some(touch);
            }

            if inner.apply_sample(side, touch) && !sides.contains(&side) {
                sides.push(side);
            }
        }

        sides
    }

    /// Tracking → Releasing for one side
    fn begin_release(&self, inner: &mut TrackerInner, side: JoystickSide) {
        if inner.is_held(side) {
            debug!(
                "Holding {} stick at {:.1} (beyond threshold {:.1})",
                side,
                inner.slot(side).state.primary,
                inner.config.hold_threshold
            );
            return;
        }

        let frame_rate = inner.config.frame_rate;
        let duration = Duration::from_millis(inner.config.release_duration_ms);
        let slot = inner.slot_mut(side);
        slot.cancel_release();

        let current = slot.state.current.take();
        let origin = slot.state.origin.take();

        let (Some(current), Some(origin)) = (current, origin) else {
            // Nothing was ever in range; settle immediately
            slot.state.primary = 0.0;
            slot.state.secondary = 0.0;
            self.emit(inner);
            return;
        };

        slot.next_run_id += 1;
        let run_id = slot.next_run_id;

        let callbacks = SideRelease {
            side,
            run_id,
            inner: Arc::downgrade(&self.inner),
            channel: Arc::clone(&self.channel),
        };
        let animation = ReleaseAnimation::new(side, current, origin, frame_rate, duration);
        let handle = ReleaseAnimator::start(animation, callbacks);

        slot.release = Some(ActiveRelease {
            run_id,
            origin,
            current,
            handle,
        });
    }

    fn emit(&self, inner: &TrackerInner) {
        let vector = inner.control_vector();
        debug!(
            "Control update: throttle={:.1} yaw={:.1} pitch={:.1} roll={:.1}",
            vector.throttle, vector.yaw, vector.pitch, vector.roll
        );
        self.channel.send(&vector);
    }
}

/// Release callbacks bound to one side and one run
struct SideRelease {
    side: JoystickSide,
    run_id: u64,
    inner: Weak<Mutex<TrackerInner>>,
    channel: Arc<dyn ControlChannel>,
}

impl SideRelease {
    fn with_current_run(&self, f: impl FnOnce(&mut TrackerInner)) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut inner = inner.lock();
        let is_current = inner
            .slot(self.side)
            .release
            .as_ref()
            .is_some_and(|r| r.run_id == self.run_id);
        if is_current {
            f(&mut *inner);
            self.channel.send(&inner.control_vector());
        }
    }
}

impl ReleaseCallbacks for SideRelease {
    fn on_step(&mut self, point: PointSample) {
        let side = self.side;
        self.with_current_run(|inner| {
            let slot = inner.slot_mut(side);
            if let Some(release) = slot.release.as_mut() {
                release.current = point;
                slot.state.primary = primary_axis(point, release.origin);
                slot.state.secondary = secondary_axis(point, release.origin);
            }
        });
    }

    fn on_complete(&mut self) {
        let side = self.side;
        self.with_current_run(|inner| {
            let slot = inner.slot_mut(side);
            slot.state.primary = 0.0;
            slot.state.secondary = 0.0;
            slot.release = None;
            debug!("{} stick back at center", side);
        });
    }
}
