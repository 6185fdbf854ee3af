//! Bouncing logo screensaver for an RGB LED matrix.
//!
//! A logo drifts across the panel and bounces off its edges. Every bounce is
//! classified as a wall or a corner hit, and the classification drives a
//! color flash and a tone.
//!
//! This module holds the helpers shared by the binary and the other modules:
//! - Panel configuration
//! - Color type with brightness scaling
//! - Matrix initialization with our hardware defaults
//! - Signal handling for clean shutdown
//!
//! The simulation itself lives in [`bounce`]; everything that runs it on
//! threads and draws it lives in [`app`] and [`render`].

pub mod app;
pub mod bounce;
pub mod feedback;
pub mod logo;
#[cfg(feature = "hardware")]
pub mod render;

use bounce::Extent;
#[cfg(feature = "hardware")]
use rpi_led_matrix::{LedMatrix, LedMatrixOptions, LedRuntimeOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Panel configuration ────────────────────────────────────────────

/// Configuration for the LED panel dimensions.
///
/// # Rust concept: derive macros
/// `Clone, Copy` make this cheaply copyable (it's just two u32s).
/// `Debug` gives us `{:?}` formatting. `PartialEq, Eq` let us compare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelConfig {
    pub rows: u32,
    pub cols: u32,
}

impl PanelConfig {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// The panel as a drawable area: columns wide, rows tall.
    pub fn extent(&self) -> Extent {
        Extent::new(self.cols, self.rows)
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self { rows: 64, cols: 64 }
    }
}

// ── Color ──────────────────────────────────────────────────────────

/// Our own color type, decoupled from the hardware crate.
///
/// This lets us test drawing and feedback logic without `rpi-led-matrix`.
/// At the hardware boundary, we convert via `Into<LedColor>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const GREEN: Color = Color::new(0, 255, 0);
    pub const BLUE: Color = Color::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Apply brightness scaling (0-100) to this color.
    pub fn apply_brightness(self, brightness: u8) -> Self {
        if brightness >= 100 {
            return self;
        }
        Self {
            r: ((self.r as u16 * brightness as u16) / 100) as u8,
            g: ((self.g as u16 * brightness as u16) / 100) as u8,
            b: ((self.b as u16 * brightness as u16) / 100) as u8,
        }
    }
}

/// Convert our Color to the hardware crate's LedColor at the boundary.
#[cfg(feature = "hardware")]
impl From<Color> for rpi_led_matrix::LedColor {
    fn from(c: Color) -> Self {
        rpi_led_matrix::LedColor {
            red: c.r,
            green: c.g,
            blue: c.b,
        }
    }
}

impl From<Color> for image::Rgb<u8> {
    fn from(c: Color) -> Self {
        image::Rgb([c.r, c.g, c.b])
    }
}

// ── Matrix initialization ──────────────────────────────────────────

/// Create a matrix configured for our hardware:
/// Pi Zero 2 W + Adafruit Bonnet + configurable panel size.
///
/// # Rust concept: Result and the ? operator
/// Matrix initialization can fail (e.g., if not running as root, or if GPIO
/// is unavailable). The caller uses `?` to propagate errors upward.
#[cfg(feature = "hardware")]
pub fn create_matrix(panel: PanelConfig) -> Result<LedMatrix, Box<dyn std::error::Error>> {
    let mut options = LedMatrixOptions::new();
    options.set_rows(panel.rows);
    options.set_cols(panel.cols);
    options.set_hardware_mapping("adafruit-hat");

    options.set_pwm_bits(8)?;
    options.set_pwm_lsb_nanoseconds(130);

    let mut rt_options = LedRuntimeOptions::new();
    rt_options.set_gpio_slowdown(2); // Pi Zero 2 W requires slowdown=2

    let matrix = LedMatrix::new(Some(options), Some(rt_options))?;

    Ok(matrix)
}

/// Set up a Ctrl+C handler that sets `running` to false.
///
/// # Rust concept: Arc and AtomicBool
/// The flag is shared between the signal handler and every loop in the
/// program (ticker, renderer, event loop). `AtomicBool` is a thread-safe
/// boolean, so no mutex is needed for a single bool.
pub fn setup_signal_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone(); // Clone the Arc, not the bool

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    Ok(running)
}

/// Check if the loops should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

/// Ask every loop watching `running` to stop.
pub fn request_stop(running: &AtomicBool) {
    running.store(false, Ordering::SeqCst);
}

// ── Tests ──────────────────────────────────────────────────────────
