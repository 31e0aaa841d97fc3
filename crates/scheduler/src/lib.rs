use std::fmt;
use std::time::{Duration, Instant};

use renderer::Stack;
use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("frame rate must be a finite, non-negative number (got {0})")]
    InvalidFps(f32),
}

/// Something the driver can replay: a [`Stack`] or a test double.
pub trait Frame {
    fn render(&mut self);

    fn clear(&mut self);

    /// Whether the frame asked to be drawn again since the last call.
    fn take_redraw_request(&mut self) -> bool {
        false
    }
}

impl Frame for Stack {
    fn render(&mut self) {
        Stack::render(self);
    }

    fn clear(&mut self) {
        Stack::clear(self);
    }

    fn take_redraw_request(&mut self) -> bool {
        Stack::take_redraw_request(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Schedule {
    /// Redraw on every display refresh until stopped, optionally capped.
    Continuous { fps: Option<f32> },
    /// Redraw once per change notification.
    #[default]
    OnDemand,
}

impl Schedule {
    pub fn continuous() -> Self {
        Schedule::Continuous { fps: None }
    }

    pub fn capped(fps: f32) -> Self {
        Schedule::Continuous { fps: Some(fps) }
    }
}

/// What runs before each frame draws.
pub enum ClearPolicy<F> {
    Off,
    /// [`Frame::clear`].
    Default,
    Custom(Box<dyn FnMut(&mut F)>),
}

impl<F> fmt::Debug for ClearPolicy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClearPolicy::Off => f.write_str("Off"),
            ClearPolicy::Default => f.write_str("Default"),
            ClearPolicy::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Answer to a display refresh: whether the caller should keep calling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reschedule {
    Continue,
    Stop,
}

fn normalize_fps(value: Option<f32>) -> Result<Option<Duration>, SchedulerError> {
    match value {
        None => Ok(None),
        Some(fps) if !fps.is_finite() || fps < 0.0 => Err(SchedulerError::InvalidFps(fps)),
        Some(fps) if fps == 0.0 => Ok(None),
        Some(fps) => Ok(Some(Duration::from_secs_f32(1.0 / fps))),
    }
}

/// Decides when a [`Frame`] is replayed.
///
/// The driver owns no timer: the host calls [`FrameDriver::on_display_refresh`]
/// from its vsync callback and [`FrameDriver::notify_change`] when an input
/// changed.
pub struct FrameDriver<F> {
    schedule: Schedule,
    interval: Option<Duration>,
    clear: ClearPolicy<F>,
    listeners: Vec<Box<dyn FnMut()>>,
    running: bool,
    last_frame: Option<Instant>,
    frames: u64,
}

impl<F: Frame> FrameDriver<F> {
    pub fn new(schedule: Schedule) -> Result<Self, SchedulerError> {
        let interval = match schedule {
            Schedule::Continuous { fps } => normalize_fps(fps)?,
            Schedule::OnDemand => None,
        };
        debug!(?schedule, "frame driver created");
        Ok(Self {
            schedule,
            interval,
            clear: ClearPolicy::Default,
            listeners: Vec::new(),
            running: matches!(schedule, Schedule::Continuous { .. }),
            last_frame: None,
            frames: 0,
        })
    }

    pub fn with_clear(mut self, clear: ClearPolicy<F>) -> Self {
        self.clear = clear;
        self
    }

    /// Runs before the frame renders, after clearing.
    pub fn on_render(&mut self, listener: impl FnMut() + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Frames drawn so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn stop(&mut self) {
        if self.running {
            debug!(frames = self.frames, "frame driver stopped");
        }
        self.running = false;
    }

    /// Resumes continuous rendering after [`FrameDriver::stop`].
    pub fn start(&mut self) {
        if matches!(self.schedule, Schedule::Continuous { .. }) && !self.running {
            debug!("frame driver started");
            self.running = true;
            self.last_frame = None;
        }
    }

    pub fn on_display_refresh(&mut self, now: Instant, frame: &mut F) -> Reschedule {
        if !self.running {
            return Reschedule::Stop;
        }
        if let (Some(interval), Some(last)) = (self.interval, self.last_frame) {
            if now.saturating_duration_since(last) < interval {
                trace!("frame skipped by fps cap");
                return Reschedule::Continue;
            }
        }
        self.last_frame = Some(now);
        self.draw(frame);
        Reschedule::Continue
    }

    /// Draws once in on-demand mode. Continuous drivers pick the change up
    /// on the next refresh; returns whether a frame was drawn.
    pub fn notify_change(&mut self, frame: &mut F) -> bool {
        match self.schedule {
            Schedule::OnDemand => {
                self.draw(frame);
                true
            }
            Schedule::Continuous { .. } => false,
        }
    }

    /// Forwards a pending redraw request from the frame itself, such as a
    /// sampled render texture drawn outside the frame.
    pub fn poll(&mut self, frame: &mut F) -> bool {
        frame.take_redraw_request() && self.notify_change(frame)
    }

    fn draw(&mut self, frame: &mut F) {
        match &mut self.clear {
            ClearPolicy::Off => {}
            ClearPolicy::Default => frame.clear(),
            ClearPolicy::Custom(clear) => clear(frame),
        }
        for listener in &mut self.listeners {
            listener();
        }
        frame.render();
        self.frames += 1;
        trace!(frame = self.frames, "frame drawn");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        renders: usize,
        clears: usize,
        pending: bool,
        log: Vec<&'static str>,
    }

    impl Frame for Recorder {
        fn render(&mut self) {
            self.renders += 1;
            self.log.push("render");
        }

        fn clear(&mut self) {
            self.clears += 1;
            self.log.push("clear");
        }

        fn take_redraw_request(&mut self) -> bool {
            std::mem::take(&mut self.pending)
        }
    }

    #[test]
    fn continuous_driver_renders_every_refresh_until_stopped() {
        let mut driver = FrameDriver::new(Schedule::continuous()).unwrap();
        let mut frame = Recorder::default();
        let start = Instant::now();

        for tick in 0..3 {
            let now = start + Duration::from_millis(16 * tick);
            assert_eq!(driver.on_display_refresh(now, &mut frame), Reschedule::Continue);
        }
        assert_eq!(frame.renders, 3);
        assert_eq!(frame.clears, 3);

        driver.stop();
        assert_eq!(
            driver.on_display_refresh(start + Duration::from_millis(64), &mut frame),
            Reschedule::Stop
        );
        assert_eq!(frame.renders, 3);
    }

    #[test]
    fn fps_cap_skips_early_refreshes() {
        let mut driver = FrameDriver::new(Schedule::capped(30.0)).unwrap();
        let mut frame = Recorder::default();
        let start = Instant::now();

        driver.on_display_refresh(start, &mut frame);
        driver.on_display_refresh(start + Duration::from_millis(16), &mut frame);
        driver.on_display_refresh(start + Duration::from_millis(34), &mut frame);
        driver.on_display_refresh(start + Duration::from_millis(50), &mut frame);
        assert_eq!(frame.renders, 2);
        assert_eq!(driver.frames(), 2);
    }

    #[test]
    fn zero_fps_means_uncapped() {
        let mut driver = FrameDriver::new(Schedule::capped(0.0)).unwrap();
        let mut frame = Recorder::default();
        let now = Instant::now();
        driver.on_display_refresh(now, &mut frame);
        driver.on_display_refresh(now, &mut frame);
        assert_eq!(frame.renders, 2);
    }

    #[test]
    fn negative_fps_is_rejected() {
        let err = FrameDriver::<Recorder>::new(Schedule::capped(-5.0))
            .err()
            .unwrap();
        assert!(matches!(err, SchedulerError::InvalidFps(fps) if fps == -5.0));
    }

    #[test]
    fn on_demand_driver_renders_once_per_change() {
        let mut driver = FrameDriver::new(Schedule::OnDemand).unwrap();
        let mut frame = Recorder::default();

        assert!(!driver.is_running());
        assert_eq!(
            driver.on_display_refresh(Instant::now(), &mut frame),
            Reschedule::Stop
        );
        assert_eq!(frame.renders, 0);

        assert!(driver.notify_change(&mut frame));
        assert!(driver.notify_change(&mut frame));
        assert_eq!(frame.renders, 2);
    }

    #[test]
    fn continuous_driver_ignores_change_notifications() {
        let mut driver = FrameDriver::new(Schedule::continuous()).unwrap();
        let mut frame = Recorder::default();
        assert!(!driver.notify_change(&mut frame));
        assert_eq!(frame.renders, 0);
    }

    #[test]
    fn poll_forwards_frame_redraw_requests() {
        let mut driver = FrameDriver::new(Schedule::OnDemand).unwrap();
        let mut frame = Recorder::default();
        assert!(!driver.poll(&mut frame));
        frame.pending = true;
        assert!(driver.poll(&mut frame));
        assert!(!driver.poll(&mut frame));
        assert_eq!(frame.renders, 1);
    }

    #[test]
    fn clear_policy_and_listeners_run_before_render() {
        let custom = Rc::new(Cell::new(0));
        let seen = custom.clone();
        let mut driver = FrameDriver::new(Schedule::OnDemand)
            .unwrap()
            .with_clear(ClearPolicy::Custom(Box::new(move |frame: &mut Recorder| {
                seen.set(seen.get() + 1);
                frame.log.push("custom clear");
            })));
        let hooks = Rc::new(Cell::new(0));
        let counter = hooks.clone();
        driver.on_render(move || counter.set(counter.get() + 1));

        let mut frame = Recorder::default();
        driver.notify_change(&mut frame);
        assert_eq!(custom.get(), 1);
        assert_eq!(hooks.get(), 1);
        assert_eq!(frame.clears, 0);
        assert_eq!(frame.log, vec!["custom clear", "render"]);

        let mut driver = FrameDriver::new(Schedule::OnDemand)
            .unwrap()
            .with_clear(ClearPolicy::Off);
        driver.notify_change(&mut frame);
        assert_eq!(frame.clears, 0);
    }

    #[test]
    fn restarting_resets_the_cap_window() {
        let mut driver = FrameDriver::new(Schedule::capped(10.0)).unwrap();
        let mut frame = Recorder::default();
        let start = Instant::now();
        driver.on_display_refresh(start, &mut frame);
        driver.stop();
        driver.start();
        driver.on_display_refresh(start + Duration::from_millis(10), &mut frame);
        assert_eq!(frame.renders, 2);
    }
}
