//! Field geometry and ball tuning constants
//!
//! The field is a rectangle: the long axis (y) runs between the two goals,
//! the short axis (x) is bounded by the side walls. Paddles sit near each
//! goal line and slide along x only.

/// Goal-to-goal extent of the field (y axis)
pub const FIELD_LENGTH: f64 = 10.0;
/// Wall-to-wall extent of the field (x axis)
pub const FIELD_WIDTH: f64 = 6.0;

/// Side wall positions on the x axis
pub const WALL_MAX_X: f64 = FIELD_WIDTH / 2.0;
pub const WALL_MIN_X: f64 = -FIELD_WIDTH / 2.0;

// Paddles
pub const PADDLE_WIDTH: f64 = 1.0;
pub const PADDLE_HALF_WIDTH: f64 = PADDLE_WIDTH / 2.0;
pub const PADDLE_DEPTH: f64 = 0.1;
pub const PADDLE_HALF_DEPTH: f64 = PADDLE_DEPTH / 2.0;
/// Paddle travel speed along the free axis
pub const PADDLE_SPEED: f64 = 5.0;
/// Distance of each paddle's home row from the field center.
/// Paddle 1 sits at +PADDLE_HOME_Y, paddle 2 at -PADDLE_HOME_Y.
pub const PADDLE_HOME_Y: f64 = FIELD_LENGTH / 2.0 - 0.6;

// Ball
pub const BALL_RADIUS: f64 = 0.1;
pub const BALL_BASE_SPEED: f64 = 4.0;
pub const BALL_MAX_SPEED: f64 = 15.0;
/// Speed multiplier applied every third paddle exchange
pub const BALL_SPEED_FACTOR: f64 = 1.05;
/// Bound on the random deflection applied on paddle hits, in degrees
pub const BALL_MAX_DEFLECT_DEGREES: f64 = 10.0;
/// Directions within this margin of an axis are re-rolled to avoid
/// degenerate straight-line rallies, in degrees
pub const AXIS_EXCLUSION_DEGREES: f64 = 15.0;

// Scoring
pub const DEFAULT_SCORE_TO_WIN: u32 = 7;
pub const MAX_SCORE_TO_WIN: u32 = 30;
