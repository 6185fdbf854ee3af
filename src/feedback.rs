//! Bounce feedback: a color flash and a short tone for each bounce.
//!
//! The simulator only reports a [`Bounce`]. This module turns that into an
//! [`Effect`] and hands it to a list of [`FeedbackSink`]s. Playback is
//! best-effort: a sink that is busy or broken is skipped with a warning and
//! never holds up the next simulation step.
//!
//! ## Rust concepts
//! - Trait objects (`Box<dyn FeedbackSink + Send>`) for a heterogeneous list
//! - `Mutex::try_lock` for non-blocking access to shared state
//! - `thiserror` for a small error enum

use crate::Color;
use crate::bounce::Bounce;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long a bounce tone (and its flash) lasts.
pub const TONE_DURATION: Duration = Duration::from_millis(50);

/// Note C5, played on corner bounces.
pub const CORNER_TONE_HZ: f32 = 523.25;
/// Note C4, played on wall bounces.
pub const WALL_TONE_HZ: f32 = 261.63;

// ── Effects ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tone {
    pub frequency_hz: f32,
    pub duration: Duration,
}

/// What a bounce should look and sound like.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Effect {
    pub color: Color,
    pub tone: Tone,
}

impl Effect {
    /// Corner hits flash green with the higher note, wall hits flash blue
    /// with the lower one. No bounce, no effect.
    pub fn for_bounce(bounce: Bounce) -> Option<Self> {
        let (color, frequency_hz) = match bounce {
            Bounce::None => return None,
            Bounce::Corner => (Color::GREEN, CORNER_TONE_HZ),
            Bounce::Wall => (Color::BLUE, WALL_TONE_HZ),
        };
        Some(Self {
            color,
            tone: Tone {
                frequency_hz,
                duration: TONE_DURATION,
            },
        })
    }
}

// ── Sinks ────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedbackError {
    #[error("feedback output is busy")]
    Busy,
    #[error("feedback output unavailable: {0}")]
    Unavailable(String),
}

/// Something that can play a bounce effect.
pub trait FeedbackSink {
    fn name(&self) -> &'static str;

    /// Play `effect`. Must not block waiting for the output to free up.
    fn play(&mut self, effect: &Effect) -> Result<(), FeedbackError>;
}

/// Play `effect` on every sink, skipping the ones that fail.
///
/// Returns how many sinks played it.
pub fn relay(effect: &Effect, sinks: &mut [Box<dyn FeedbackSink + Send>]) -> usize {
    let mut played = 0;
    for sink in sinks.iter_mut() {
        match sink.play(effect) {
            Ok(()) => played += 1,
            Err(e) => tracing::warn!("Skipping {} feedback: {}", sink.name(), e),
        }
    }
    played
}

// ── Panel flash ──────────────────────────────────────────────────────

/// A color the logo should be drawn in until `until`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Flash {
    pub color: Color,
    pub until: Instant,
}

impl Flash {
    pub fn is_active(&self, now: Instant) -> bool {
        now < self.until
    }
}

/// The current flash, shared between the feedback sink and the renderer.
pub type FlashSlot = Arc<Mutex<Option<Flash>>>;

pub fn new_flash_slot() -> FlashSlot {
    Arc::new(Mutex::new(None))
}

/// Read the flash color if one is active at `now`.
///
/// The renderer calls this every frame, so it waits for the lock; the
/// writer side only ever holds it for a single assignment.
pub fn active_flash(slot: &FlashSlot, now: Instant) -> Option<Color> {
    let flash = *slot.lock().unwrap_or_else(PoisonError::into_inner);
    flash.filter(|f| f.is_active(now)).map(|f| f.color)
}

/// Panel stand-in for a notification LED: tints the logo for the length of
/// the tone, after which the renderer falls back to the normal color.
pub struct PanelFlash {
    slot: FlashSlot,
}

impl PanelFlash {
    pub fn new(slot: FlashSlot) -> Self {
        Self { slot }
    }
}

impl FeedbackSink for PanelFlash {
    fn name(&self) -> &'static str {
        "panel flash"
    }

    fn play(&mut self, effect: &Effect) -> Result<(), FeedbackError> {
        let mut current = match self.slot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(FeedbackError::Busy),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        *current = Some(Flash {
            color: effect.color,
            until: Instant::now() + effect.tone.duration,
        });
        Ok(())
    }
}

/// Speaker stand-in. The panel has no audio output, so each tone is
/// emitted as a structured log event instead.
#[derive(Default)]
pub struct ToneLog {
    played: u64,
}

impl ToneLog {
    pub fn played(&self) -> u64 {
        self.played
    }
}

impl FeedbackSink for ToneLog {
    fn name(&self) -> &'static str {
        "tone"
    }

    fn play(&mut self, effect: &Effect) -> Result<(), FeedbackError> {
        self.played += 1;
        tracing::debug!(
            frequency_hz = effect.tone.frequency_hz,
            duration_ms = effect.tone.duration.as_millis() as u64,
            "tone"
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
