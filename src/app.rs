//! App loop: tick delivery, the event loop that steps the simulator, and the
//! render loop that draws it.
//!
//! Thread layout:
//! - **Ticker** (`spawn_ticker`): pushes `AppEvent::Tick` into a bounded queue
//! - **Event loop** (`event_loop`, main thread): steps the simulator on each
//!   tick and relays bounces to feedback sinks
//! - **Render loop** (`render_loop`, render thread): reads the position and
//!   draws the logo onto a [`Surface`]
//!
//! The simulator is shared as `Arc<Mutex<BounceSimulator>>`. Every access
//! takes the lock once and copies what it needs, so the renderer never sees
//! an `(x, y)` pair that is half updated.
//!
//! ## Rust concepts
//! - `mpsc::sync_channel` for a bounded queue, `try_send` for non-blocking sends
//! - `recv_timeout` so the consumer wakes up to check the stop flag
//! - Generic functions over a trait (`S: Surface`)

use crate::bounce::{Bounce, BounceSimulator, Position};
use crate::feedback::{self, Effect, FeedbackSink, FlashSlot};
use crate::logo::Logo;
use crate::{Color, PanelConfig, is_running};
use image::RgbImage;
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Capacity of the event queue. Ticks beyond this are dropped.
pub const EVENT_QUEUE_CAPACITY: usize = 8;

/// How long the event loop waits for an event before re-checking the stop flag.
pub const EVENT_TIMEOUT: Duration = Duration::from_millis(100);

/// Default simulation rate.
pub const DEFAULT_TICK_HZ: u32 = 8;

// ── Events ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEvent {
    /// Advance the simulation one step
    Tick,
    /// Leave the event loop
    Stop,
}

/// Create the bounded event queue shared by all producers.
pub fn event_queue() -> (SyncSender<AppEvent>, Receiver<AppEvent>) {
    mpsc::sync_channel(EVENT_QUEUE_CAPACITY)
}

/// Convert a rate in Hz to the period between ticks.
pub fn tick_interval(hz: u32) -> Duration {
    Duration::from_secs(1) / hz.max(1)
}

/// Send `Tick` every `interval` until `running` clears or the queue closes.
///
/// A full queue means the consumer is behind; the tick is dropped rather
/// than waiting for room.
pub fn spawn_ticker(
    tx: SyncSender<AppEvent>,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut dropped: u64 = 0;
        while is_running(&running) {
            thread::sleep(interval);
            match tx.try_send(AppEvent::Tick) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    tracing::trace!("Event queue full, dropping tick");
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
        if dropped > 0 {
            tracing::warn!("Ticker dropped {} ticks", dropped);
        }
    })
}

/// Send a single `Stop` after `after` has elapsed.
pub fn spawn_stop_timer(tx: SyncSender<AppEvent>, after: Duration) -> JoinHandle<()> {
    thread::spawn(move || {
        thread::sleep(after);
        // Stop is the one event worth waiting for room.
        if tx.send(AppEvent::Stop).is_err() {
            tracing::debug!("Event queue already closed, stop not delivered");
        }
    })
}

// ── Event loop ───────────────────────────────────────────────────────

pub type SharedSimulator = Arc<Mutex<BounceSimulator>>;

pub fn share(simulator: BounceSimulator) -> SharedSimulator {
    Arc::new(Mutex::new(simulator))
}

/// Copy the current position out of the shared simulator.
pub fn current_position(shared: &SharedSimulator) -> Position {
    shared
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .position()
}

/// Counters collected by the event loop, printed at exit with `--summary`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub wall_bounces: u64,
    pub corner_bounces: u64,
    pub final_position: Position,
    pub last_bounce: Bounce,
}

impl RunSummary {
    pub fn record(&mut self, bounce: Bounce) {
        self.ticks += 1;
        match bounce {
            Bounce::None => {}
            Bounce::Wall => self.wall_bounces += 1,
            Bounce::Corner => self.corner_bounces += 1,
        }
        self.last_bounce = bounce;
    }
}

/// Process events until `Stop`, a cleared `running` flag, or every sender
/// hanging up.
///
/// The simulator lock is released before feedback runs, so a slow sink
/// never delays the renderer.
pub fn event_loop(
    rx: &Receiver<AppEvent>,
    shared: &SharedSimulator,
    sinks: &mut [Box<dyn FeedbackSink + Send>],
    running: &AtomicBool,
) -> RunSummary {
    let mut summary = RunSummary::default();

    while is_running(running) {
        match rx.recv_timeout(EVENT_TIMEOUT) {
            Ok(AppEvent::Tick) => {
                let (bounce, position) = {
                    let mut sim = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    let bounce = sim.step();
                    (bounce, sim.position())
                };

                summary.record(bounce);
                if let Some(effect) = Effect::for_bounce(bounce) {
                    tracing::debug!(?bounce, x = position.x, y = position.y, "bounce");
                    feedback::relay(&effect, sinks);
                }
            }
            Ok(AppEvent::Stop) => {
                tracing::info!("Stop requested");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("Event queue closed, shutting down.");
                break;
            }
        }
    }

    summary.final_position = current_position(shared);
    summary
}

// ── Drawing ──────────────────────────────────────────────────────────

/// Anything the logo can be drawn on.
///
/// Implemented by the LED matrix (in `render`) and by [`FrameBuffer`] for
/// headless runs and tests.
pub trait Surface {
    fn clear(&mut self);
    fn set(&mut self, x: i32, y: i32, color: Color);
    /// Show everything drawn since the last `present`.
    fn present(&mut self);
}

/// In-memory surface backed by an `RgbImage`.
pub struct FrameBuffer {
    image: RgbImage,
    frames: u64,
}

impl FrameBuffer {
    pub fn new(panel: PanelConfig) -> Self {
        Self {
            image: RgbImage::new(panel.cols, panel.rows),
            frames: 0,
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        let [r, g, b] = self.image.get_pixel(x, y).0;
        Color::new(r, g, b)
    }

    /// Number of frames presented so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Surface for FrameBuffer {
    fn clear(&mut self) {
        for px in self.image.pixels_mut() {
            *px = Color::BLACK.into();
        }
    }

    fn set(&mut self, x: i32, y: i32, color: Color) {
        // Off-panel pixels are ignored, like the matrix canvas does.
        if let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) {
            if x < self.image.width() && y < self.image.height() {
                self.image.put_pixel(x, y, color.into());
            }
        }
    }

    fn present(&mut self) {
        self.frames += 1;
    }
}

/// Logo colors and brightness used by the render loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderStyle {
    pub logo_color: Color,
    /// 0-100
    pub brightness: u8,
    pub frame_interval: Duration,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            logo_color: Color::WHITE,
            brightness: 75,
            frame_interval: Duration::from_millis(33),
        }
    }
}

/// Draw one frame: the logo at `position` in `color`.
pub fn draw_frame<S: Surface>(surface: &mut S, logo: &Logo, position: Position, color: Color) {
    surface.clear();
    for (lx, ly) in logo.lit_pixels() {
        surface.set(position.x + lx as i32, position.y + ly as i32, color);
    }
    surface.present();
}

/// Redraw at `style.frame_interval` until `running` clears.
///
/// While a bounce flash is active the logo is drawn in the flash color.
pub fn render_loop<S: Surface>(
    surface: &mut S,
    shared: &SharedSimulator,
    flash: &FlashSlot,
    logo: &Logo,
    style: RenderStyle,
    running: &AtomicBool,
) {
    tracing::info!("Render loop started");

    while is_running(running) {
        let position = current_position(shared);
        let color = feedback::active_flash(flash, Instant::now()).unwrap_or(style.logo_color);

        draw_frame(surface, logo, position, color.apply_brightness(style.brightness));
        thread::sleep(style.frame_interval);
    }

    tracing::info!("Render loop stopped");
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounce::{Bounds, Direction};
    use crate::feedback::{FeedbackError, Flash, PanelFlash, new_flash_slot};
    use crate::request_stop;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    /// Records every effect it is given.
    struct Recorder(Arc<Mutex<Vec<Effect>>>);

    impl FeedbackSink for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn play(&mut self, effect: &Effect) -> Result<(), FeedbackError> {
            self.0.lock().unwrap().push(*effect);
            Ok(())
        }
    }

    fn corner_start() -> SharedSimulator {
        share(BounceSimulator::new(
            Bounds::new(82, 38),
            2,
            Position::new(0, 0),
            Direction::new(1, 1),
        ))
    }

    #[rstest]
    #[case(8, 125)]
    #[case(1, 1000)]
    #[case(0, 1000)]
    fn tick_interval_from_hz(#[case] hz: u32, #[case] millis: u64) {
        assert_eq!(tick_interval(hz), Duration::from_millis(millis));
    }

    #[test]
    fn event_loop_steps_on_ticks_and_stops() {
        let (tx, rx) = event_queue();
        let shared = corner_start();
        let running = AtomicBool::new(true);

        for _ in 0..3 {
            tx.send(AppEvent::Tick).unwrap();
        }
        tx.send(AppEvent::Stop).unwrap();

        let summary = event_loop(&rx, &shared, &mut [], &running);

        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.final_position, Position::new(6, 6));
        assert_eq!(summary.last_bounce, Bounce::None);
    }

    #[test]
    fn event_loop_exits_when_queue_closes() {
        let (tx, rx) = event_queue();
        let shared = corner_start();
        let running = AtomicBool::new(true);

        tx.send(AppEvent::Tick).unwrap();
        drop(tx);

        let summary = event_loop(&rx, &shared, &mut [], &running);
        assert_eq!(summary.ticks, 1);
    }

    #[test]
    fn event_loop_honours_cleared_flag() {
        let (tx, rx) = event_queue();
        let shared = corner_start();
        let running = AtomicBool::new(false);

        tx.send(AppEvent::Tick).unwrap();

        let summary = event_loop(&rx, &shared, &mut [], &running);
        assert_eq!(summary.ticks, 0);
        assert_eq!(summary.final_position, Position::new(0, 0));
    }

    #[test]
    fn bounces_are_relayed_to_sinks() {
        let (tx, rx) = event_queue();
        // One step from the right wall's neighbourhood: x' = 82.
        let shared = share(BounceSimulator::new(
            Bounds::new(82, 38),
            2,
            Position::new(80, 10),
            Direction::new(1, 1),
        ));
        let running = AtomicBool::new(true);
        let played = Arc::new(Mutex::new(Vec::new()));
        let mut sinks: Vec<Box<dyn FeedbackSink + Send>> = vec![Box::new(Recorder(played.clone()))];

        tx.send(AppEvent::Tick).unwrap();
        tx.send(AppEvent::Stop).unwrap();
        let summary = event_loop(&rx, &shared, &mut sinks, &running);

        assert_eq!(summary.wall_bounces, 1);
        let played = played.lock().unwrap();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].color, Color::BLUE);
    }

    #[test]
    fn busy_feedback_does_not_block_stepping() {
        let (tx, rx) = event_queue();
        let shared = share(BounceSimulator::new(
            Bounds::new(4, 4),
            2,
            Position::new(2, 2),
            Direction::new(1, 1),
        ));
        let running = AtomicBool::new(true);
        let slot = new_flash_slot();
        let mut sinks: Vec<Box<dyn FeedbackSink + Send>> =
            vec![Box::new(PanelFlash::new(slot.clone()))];

        let held = slot.lock().unwrap();
        tx.send(AppEvent::Tick).unwrap();
        tx.send(AppEvent::Stop).unwrap();
        let summary = event_loop(&rx, &shared, &mut sinks, &running);
        drop(held);

        assert_eq!(summary.corner_bounces, 1);
        assert_eq!(summary.final_position, Position::new(4, 4));
    }

    #[test]
    fn ticker_drops_ticks_when_queue_is_full() {
        let (tx, rx) = event_queue();
        let running = Arc::new(AtomicBool::new(true));

        let handle = spawn_ticker(tx, Duration::from_millis(1), running.clone());
        thread::sleep(Duration::from_millis(100));
        request_stop(&running);
        handle.join().unwrap();

        // Nobody consumed, so the queue holds at most its capacity.
        let queued = rx.try_iter().count();
        assert_eq!(queued, EVENT_QUEUE_CAPACITY);
    }

    #[test]
    fn stop_timer_sends_stop() {
        let (tx, rx) = event_queue();
        spawn_stop_timer(tx, Duration::from_millis(5)).join().unwrap();
        assert_eq!(rx.try_recv(), Ok(AppEvent::Stop));
    }

    #[test]
    fn stop_timer_survives_closed_queue() {
        let (tx, rx) = event_queue();
        drop(rx);
        assert!(spawn_stop_timer(tx, Duration::from_millis(1)).join().is_ok());
    }

    #[test]
    fn summary_counts_bounce_kinds() {
        let mut summary = RunSummary::default();
        for bounce in [Bounce::None, Bounce::Wall, Bounce::Corner, Bounce::Wall] {
            summary.record(bounce);
        }
        assert_eq!(summary.ticks, 4);
        assert_eq!(summary.wall_bounces, 2);
        assert_eq!(summary.corner_bounces, 1);
        assert_eq!(summary.last_bounce, Bounce::Wall);
    }

    #[test]
    fn summary_serializes_to_json() {
        let summary = RunSummary {
            ticks: 2,
            wall_bounces: 1,
            corner_bounces: 0,
            final_position: Position::new(3, 4),
            last_bounce: Bounce::Wall,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "ticks": 2,
                "wall_bounces": 1,
                "corner_bounces": 0,
                "final_position": { "x": 3, "y": 4 },
                "last_bounce": "wall",
            })
        );
    }

    // ── Drawing ────────────────────────────────────────────────────

    #[test]
    fn draw_frame_places_logo_at_position() {
        let mut fb = FrameBuffer::new(PanelConfig::new(64, 128));
        let logo = Logo::builtin();

        draw_frame(&mut fb, &logo, Position::new(10, 5), Color::WHITE);

        // Centre of the logo is lit, the panel origin is not.
        assert_eq!(fb.pixel(10 + 22, 5 + 12), Color::WHITE);
        assert_eq!(fb.pixel(0, 0), Color::BLACK);
        assert_eq!(fb.frames(), 1);
    }

    #[test]
    fn draw_frame_clears_previous_frame() {
        let mut fb = FrameBuffer::new(PanelConfig::new(64, 128));
        let logo = Logo::builtin();

        draw_frame(&mut fb, &logo, Position::new(0, 0), Color::WHITE);
        draw_frame(&mut fb, &logo, Position::new(60, 30), Color::WHITE);

        assert_eq!(fb.pixel(22, 12), Color::BLACK);
        assert_eq!(fb.pixel(60 + 22, 30 + 12), Color::WHITE);
    }

    #[test]
    fn frame_buffer_ignores_off_panel_pixels() {
        let mut fb = FrameBuffer::new(PanelConfig::new(4, 4));
        fb.set(-1, 0, Color::WHITE);
        fb.set(4, 0, Color::WHITE);
        fb.set(0, 4, Color::WHITE);
        assert!(fb.image().pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn render_loop_returns_at_once_when_stopped() {
        let mut fb = FrameBuffer::new(PanelConfig::new(64, 128));
        let running = AtomicBool::new(false);

        render_loop(
            &mut fb,
            &corner_start(),
            &new_flash_slot(),
            &Logo::builtin(),
            RenderStyle::default(),
            &running,
        );
        assert_eq!(fb.frames(), 0);
    }

    #[test]
    fn render_loop_draws_active_flash_color() {
        let shared = corner_start();
        let slot = new_flash_slot();
        *slot.lock().unwrap() = Some(Flash {
            color: Color::GREEN,
            until: Instant::now() + Duration::from_secs(10),
        });
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let (shared, slot, running) = (shared.clone(), slot.clone(), running.clone());
            thread::spawn(move || {
                let mut fb = FrameBuffer::new(PanelConfig::new(64, 128));
                let style = RenderStyle {
                    brightness: 100,
                    frame_interval: Duration::from_millis(1),
                    ..RenderStyle::default()
                };
                render_loop(&mut fb, &shared, &slot, &Logo::builtin(), style, &running);
                fb
            })
        };

        thread::sleep(Duration::from_millis(20));
        request_stop(&running);
        let fb = handle.join().unwrap();

        assert_eq!(fb.pixel(22, 12), Color::GREEN);
    }

    #[test]
    fn render_loop_returns_to_base_color_after_flash() {
        let shared = corner_start();
        let slot = new_flash_slot();
        *slot.lock().unwrap() = Some(Flash {
            color: Color::GREEN,
            until: Instant::now(),
        });
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let (shared, slot, running) = (shared.clone(), slot.clone(), running.clone());
            thread::spawn(move || {
                let mut fb = FrameBuffer::new(PanelConfig::new(64, 128));
                let style = RenderStyle {
                    brightness: 100,
                    frame_interval: Duration::from_millis(1),
                    ..RenderStyle::default()
                };
                render_loop(&mut fb, &shared, &slot, &Logo::builtin(), style, &running);
                fb
            })
        };

        thread::sleep(Duration::from_millis(20));
        request_stop(&running);
        let fb = handle.join().unwrap();

        assert_eq!(fb.pixel(22, 12), Color::WHITE);
    }

    #[test]
    fn readers_never_see_half_updated_position() {
        // Diagonal run from the origin: x == y until the first bounce.
        let shared = share(BounceSimulator::new(
            Bounds::new(1000, 1000),
            1,
            Position::new(0, 0),
            Direction::new(1, 1),
        ));
        let running = Arc::new(AtomicBool::new(true));

        let reader = {
            let (shared, running) = (shared.clone(), running.clone());
            thread::spawn(move || {
                let mut reads: u64 = 0;
                while is_running(&running) {
                    let Position { x, y } = current_position(&shared);
                    assert_eq!(x, y, "torn read at ({x}, {y})");
                    reads += 1;
                }
                reads
            })
        };

        for _ in 0..999 {
            shared.lock().unwrap().step();
        }
        request_stop(&running);
        let reads = reader.join().unwrap();

        assert!(reads > 0);
        assert_eq!(current_position(&shared), Position::new(999, 999));
    }

    #[test]
    fn render_thread_tracks_simulator() {
        let shared = corner_start();
        let slot = new_flash_slot();
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let shared = shared.clone();
            let slot = slot.clone();
            let running = running.clone();
            thread::spawn(move || {
                let mut fb = FrameBuffer::new(PanelConfig::new(64, 128));
                let style = RenderStyle {
                    brightness: 100,
                    frame_interval: Duration::from_millis(1),
                    ..RenderStyle::default()
                };
                render_loop(&mut fb, &shared, &slot, &Logo::builtin(), style, &running);
                fb
            })
        };

        for _ in 0..5 {
            shared.lock().unwrap().step();
        }
        thread::sleep(Duration::from_millis(30));
        request_stop(&running);
        let fb = handle.join().unwrap();

        assert!(fb.frames() > 0);
        // Five steps of 2px from the origin.
        assert_eq!(fb.pixel(10 + 22, 10 + 12), Color::WHITE);
    }
}
