//! Bounce simulation: the logo's position, direction, and edge collisions.
//!
//! This module knows nothing about panels, threads, or timers. It is a plain
//! synchronous state machine: the caller builds a [`BounceSimulator`], then
//! calls [`BounceSimulator::step`] once per tick and relays the returned
//! [`Bounce`] to whatever should react to it.
//!
//! ## Rust concepts
//! - Newtype-ish value structs (`Bounds`, `Position`, `Direction`) that are `Copy`
//! - Generic functions over a trait (`R: Rng`) for injected randomness
//! - `Result` with a `thiserror` error enum for the one fallible constructor

use rand::Rng;
use serde::Serialize;
use thiserror::Error;

/// Default per-tick displacement, in pixels per axis.
pub const DEFAULT_SPEED: u16 = 2;

// ── Bounds ───────────────────────────────────────────────────────────

/// Width and height of something drawn on the panel, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoundsError {
    #[error("logo ({logo_w}x{logo_h}) does not fit on a {display_w}x{display_h} display")]
    LogoTooLarge {
        logo_w: u32,
        logo_h: u32,
        display_w: u32,
        display_h: u32,
    },
}

/// The largest valid top-left coordinate for the logo on each axis.
///
/// Built from `u16` so the extents are non-negative by construction; stored
/// as `i32` because all position arithmetic is signed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    max_x: i32,
    max_y: i32,
}

impl Bounds {
    pub fn new(max_x: u16, max_y: u16) -> Self {
        Self {
            max_x: i32::from(max_x),
            max_y: i32::from(max_y),
        }
    }

    /// Bounds for a logo of size `logo` drawn on a display of size `display`.
    pub fn from_extents(display: Extent, logo: Extent) -> Result<Self, BoundsError> {
        let too_large = || BoundsError::LogoTooLarge {
            logo_w: logo.width,
            logo_h: logo.height,
            display_w: display.width,
            display_h: display.height,
        };

        let max_x = display.width.checked_sub(logo.width).ok_or_else(too_large)?;
        let max_y = display.height.checked_sub(logo.height).ok_or_else(too_large)?;

        // Extents past u16 are treated as not fitting.
        let max_x = u16::try_from(max_x).map_err(|_| too_large())?;
        let max_y = u16::try_from(max_y).map_err(|_| too_large())?;

        Ok(Self::new(max_x, max_y))
    }

    pub fn max_x(&self) -> i32 {
        self.max_x
    }

    pub fn max_y(&self) -> i32 {
        self.max_y
    }

    pub fn contains(&self, position: Position) -> bool {
        (0..=self.max_x).contains(&position.x) && (0..=self.max_y).contains(&position.y)
    }

    /// True when `position` sits on a boundary of both axes.
    pub fn is_corner(&self, position: Position) -> bool {
        let on_x = position.x == 0 || position.x == self.max_x;
        let on_y = position.y == 0 || position.y == self.max_y;
        on_x && on_y
    }
}

// ── Position & direction ─────────────────────────────────────────────

/// Top-left draw coordinate of the logo.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Sign of travel on each axis.
///
/// The simulator only ever writes `+1` or `-1`. A `0` passed in by a caller
/// is kept as a stalled axis until that axis touches a boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Direction {
    pub dx: i32,
    pub dy: i32,
}

impl Direction {
    /// Build a direction from any integers; only their signs are kept.
    pub fn new(dx: i32, dy: i32) -> Self {
        Self {
            dx: dx.signum(),
            dy: dy.signum(),
        }
    }
}

// ── Classification ───────────────────────────────────────────────────

/// What happened on the most recent step.
///
/// Rust concept: FIELDLESS ENUMS
/// The three outcomes are mutually exclusive, so an enum is a better fit
/// than a pair of booleans (`bounced`, `is_corner`) that could disagree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bounce {
    #[default]
    None,
    /// Exactly one axis is resting on a boundary.
    Wall,
    /// Both axes are resting on a boundary.
    Corner,
}

impl Bounce {
    pub fn is_bounce(self) -> bool {
        self != Bounce::None
    }
}

// ── Simulator ────────────────────────────────────────────────────────

/// Owns the logo's motion state and advances it one tick at a time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BounceSimulator {
    bounds: Bounds,
    position: Position,
    direction: Direction,
    speed: i32,
    last_bounce: Bounce,
}

impl BounceSimulator {
    /// Place the logo at a fixed position and direction.
    ///
    /// `position` is clamped into `bounds`, `direction` is reduced to signs,
    /// and a speed of 0 is raised to 1.
    /// The first bounce check runs immediately so a logo placed on an edge
    /// already points inward; its result is available from
    /// [`last_bounce`](Self::last_bounce).
    pub fn new(bounds: Bounds, speed: u16, position: Position, direction: Direction) -> Self {
        let position = Position::new(
            position.x.clamp(0, bounds.max_x),
            position.y.clamp(0, bounds.max_y),
        );

        let mut simulator = Self {
            bounds,
            position,
            direction: Direction::new(direction.dx, direction.dy),
            speed: i32::from(speed.max(1)),
            last_bounce: Bounce::None,
        };
        simulator.last_bounce = simulator.resolve(position);
        simulator
    }

    /// Place the logo uniformly at random inside `bounds`, heading in a
    /// random diagonal direction.
    pub fn random<R: Rng>(bounds: Bounds, speed: u16, rng: &mut R) -> Self {
        let position = Position::new(
            rng.random_range(0..=bounds.max_x),
            rng.random_range(0..=bounds.max_y),
        );
        let mut sign = || if rng.random_bool(0.5) { 1 } else { -1 };
        let direction = Direction::new(sign(), sign());

        Self::new(bounds, speed, position, direction)
    }

    /// Advance one tick and report whether (and how) the logo bounced.
    pub fn step(&mut self) -> Bounce {
        let candidate = Position::new(
            self.position.x + self.direction.dx * self.speed,
            self.position.y + self.direction.dy * self.speed,
        );
        self.last_bounce = self.resolve(candidate);
        self.last_bounce
    }

    /// Clamp `candidate` into bounds, flipping direction on each axis that
    /// reached an edge, and commit it as the new position.
    fn resolve(&mut self, candidate: Position) -> Bounce {
        let (x, dx, x_bounced) = clamp_axis(candidate.x, self.bounds.max_x, self.direction.dx);
        let (y, dy, y_bounced) = clamp_axis(candidate.y, self.bounds.max_y, self.direction.dy);

        // Both components are committed together.
        self.position = Position::new(x, y);
        self.direction = Direction { dx, dy };
        debug_assert!(self.bounds.contains(self.position));

        if !(x_bounced || y_bounced) {
            Bounce::None
        } else if self.bounds.is_corner(self.position) {
            Bounce::Corner
        } else {
            Bounce::Wall
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn speed(&self) -> u16 {
        // Built from a u16 in `new`, so this never truncates.
        self.speed as u16
    }

    pub fn last_bounce(&self) -> Bounce {
        self.last_bounce
    }
}

/// One axis of the clamp-and-flag rule: `(coordinate, sign, bounced)`.
///
/// The upper edge is checked first. On a degenerate axis (`max == 0`) the
/// sign alternates between `-1` and `+1`, and every step reports a bounce.
fn clamp_axis(candidate: i32, max: i32, sign: i32) -> (i32, i32, bool) {
    if candidate >= max {
        (max, -1, true)
    } else if candidate <= 0 {
        (0, 1, true)
    } else {
        (candidate, sign, false)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
