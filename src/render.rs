//! LED matrix surface: draws frames onto the real panel.
//!
//! The `rpi-led-matrix` C library is not thread-safe, so the matrix is
//! created and used on the render thread only. The rest of the program talks
//! to it through the shared simulator and flash slot, never directly.
//!
//! ## Rust concepts
//! - Implementing a crate-local trait (`Surface`) for a foreign type wrapper
//! - `Option::take` to move a value out of a struct field temporarily

use crate::app::{RenderStyle, SharedSimulator, Surface, render_loop};
use crate::feedback::FlashSlot;
use crate::logo::Logo;
use crate::{Color, PanelConfig, create_matrix, request_stop};
use rpi_led_matrix::{LedCanvas, LedMatrix};
use std::sync::atomic::AtomicBool;

/// The LED matrix plus its offscreen canvas for double-buffering.
pub struct LedSurface {
    matrix: LedMatrix,
    /// Always `Some` except for the instant inside `present`.
    canvas: Option<LedCanvas>,
}

impl LedSurface {
    pub fn new(panel: PanelConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let matrix = create_matrix(panel)?;
        let canvas = matrix.offscreen_canvas();
        Ok(Self {
            matrix,
            canvas: Some(canvas),
        })
    }
}

impl Surface for LedSurface {
    fn clear(&mut self) {
        if let Some(canvas) = self.canvas.as_mut() {
            canvas.clear();
        }
    }

    fn set(&mut self, x: i32, y: i32, color: Color) {
        if let Some(canvas) = self.canvas.as_mut() {
            canvas.set(x, y, &color.into());
        }
    }

    fn present(&mut self) {
        // `swap` hands the drawn canvas to the panel and gives back the
        // previous one to draw the next frame on.
        if let Some(canvas) = self.canvas.take() {
            self.canvas = Some(self.matrix.swap(canvas));
        }
    }
}

/// Render thread entry point for the hardware build.
///
/// Opens the matrix and runs the render loop until `running` clears. If the
/// matrix cannot be opened there is nothing to show, so the whole program is
/// asked to stop.
pub fn run_led_renderer(
    panel: PanelConfig,
    shared: SharedSimulator,
    flash: FlashSlot,
    logo: Logo,
    style: RenderStyle,
    running: &AtomicBool,
) {
    let mut surface = match LedSurface::new(panel) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to initialize LED matrix: {}", e);
            request_stop(running);
            return;
        }
    };

    render_loop(&mut surface, &shared, &flash, &logo, style, running);

    surface.clear();
    surface.present();
}
