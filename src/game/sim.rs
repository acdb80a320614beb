//! Swept-collision ball simulation
//!
//! Within one step the ball is advanced collision by collision: the earliest
//! time of impact among the two side walls and the two paddle boxes is taken,
//! the ball moves exactly to the impact point, the velocity component on the
//! impact axis is reflected, and the consumed time is subtracted from the
//! remaining budget. When nothing is hit inside the budget the ball moves
//! linearly for the remainder. Scoring happens on goal-line overrun after
//! the step, not through a collision.

use rand::Rng;
use std::cmp::Ordering;

use super::constants::*;
use super::state::{Ball, GameState, GameStats};
use super::vec2::Vec2;

/// Floor on a single collision step; prevents a zero-duration impact from
/// stalling the loop.
const MIN_STEP: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy)]
struct Collision {
    axis: Axis,
    time: f64,
    paddle: bool,
}

/// Earliest impact of the ball against a paddle box (swept AABB vs. point,
/// the ball radius folded into the box margins). Returns None when the ball
/// never reaches the box on its current course.
fn paddle_collision(ball: &Ball, paddle: Vec2) -> Option<Collision> {
    let margin_x = PADDLE_HALF_WIDTH + BALL_RADIUS;
    let margin_y = PADDLE_HALF_DEPTH + BALL_RADIUS;

    let mut time_x = f64::INFINITY;
    if ball.velocity.x != 0.0 {
        let t = if ball.velocity.x > 0.0 {
            ((paddle.x - margin_x) - ball.position.x) / ball.velocity.x
        } else {
            (ball.position.x - (paddle.x + margin_x)) / ball.velocity.x.abs()
        };
        if t >= 0.0 {
            // The orthogonal coordinate must lie within the box at impact time
            let future_y = ball.position.y + ball.velocity.y * t;
            if future_y >= paddle.y - margin_y && future_y <= paddle.y + margin_y {
                time_x = t;
            }
        }
    }

    let mut time_y = f64::INFINITY;
    if ball.velocity.y != 0.0 {
        let t = if ball.velocity.y > 0.0 {
            ((paddle.y - margin_y) - ball.position.y) / ball.velocity.y
        } else {
            (ball.position.y - (paddle.y + margin_y)) / ball.velocity.y.abs()
        };
        if t >= 0.0 {
            let future_x = ball.position.x + ball.velocity.x * t;
            if future_x >= paddle.x - margin_x && future_x <= paddle.x + margin_x {
                time_y = t;
            }
        }
    }

    if time_x.is_infinite() && time_y.is_infinite() {
        None
    } else if time_x <= time_y {
        Some(Collision {
            axis: Axis::X,
            time: time_x,
            paddle: true,
        })
    } else {
        Some(Collision {
            axis: Axis::Y,
            time: time_y,
            paddle: true,
        })
    }
}

/// Earliest impact against a side wall. Walls only exist on the x axis;
/// the y ends are open goal lines.
fn wall_collision(ball: &Ball) -> Option<Collision> {
    let min_x = WALL_MIN_X + BALL_RADIUS;
    let max_x = WALL_MAX_X - BALL_RADIUS;

    if ball.velocity.x < 0.0 && ball.position.x > min_x {
        Some(Collision {
            axis: Axis::X,
            time: (ball.position.x - min_x) / ball.velocity.x.abs(),
            paddle: false,
        })
    } else if ball.velocity.x > 0.0 && ball.position.x < max_x {
        Some(Collision {
            axis: Axis::X,
            time: (max_x - ball.position.x) / ball.velocity.x,
            paddle: false,
        })
    } else {
        None
    }
}

/// Advance the match state by exactly `dt` seconds of simulated time.
pub fn advance<R: Rng>(state: &mut GameState, stats: &mut GameStats, rng: &mut R, dt: f64) {
    let mut remaining = dt;

    while remaining > MIN_STEP {
        let earliest = [
            wall_collision(&state.ball),
            paddle_collision(&state.ball, state.paddle1_position),
            paddle_collision(&state.ball, state.paddle2_position),
        ]
        .into_iter()
        .flatten()
        .min_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(Ordering::Equal));

        match earliest {
            Some(hit) if hit.time <= remaining => {
                let step = hit.time.max(MIN_STEP);
                state.ball.position += state.ball.velocity * step;
                match hit.axis {
                    Axis::X => state.ball.velocity.x = -state.ball.velocity.x,
                    Axis::Y => state.ball.velocity.y = -state.ball.velocity.y,
                }

                if hit.paddle {
                    stats.ball_exchanges_count += 1;
                    deflect(&mut state.ball.velocity, rng);
                    if stats.ball_exchanges_count % 3 == 0 {
                        let speed =
                            (state.ball.velocity.length() * BALL_SPEED_FACTOR).min(BALL_MAX_SPEED);
                        state.ball.velocity = state.ball.velocity.with_length(speed);
                    }
                }
                stats.ball_collisions_count += 1;

                remaining -= step;
            }
            _ => {
                state.ball.position += state.ball.velocity * remaining;
                break;
            }
        }
    }

    // Goal-line overrun: score and serve again
    if state.ball.position.y - BALL_RADIUS < -FIELD_LENGTH / 2.0 {
        state.p1_score += 1;
        reset_ball(&mut state.ball, rng);
    } else if state.ball.position.y + BALL_RADIUS > FIELD_LENGTH / 2.0 {
        state.p2_score += 1;
        reset_ball(&mut state.ball, rng);
    }
}

/// True when `angle` (radians, any range) lies within the exclusion margin
/// of an axis-aligned direction.
fn near_axis(angle: f64) -> bool {
    use std::f64::consts::{FRAC_PI_2, PI, TAU};
    const AXES: [f64; 5] = [0.0, FRAC_PI_2, PI, 3.0 * FRAC_PI_2, TAU];

    let margin = AXIS_EXCLUSION_DEGREES.to_radians();
    let normalized = angle.rem_euclid(TAU);
    AXES.iter()
        .any(|axis| normalized >= axis - margin && normalized <= axis + margin)
}

/// Apply a small random deflection to the ball direction, preserving speed.
/// Resampled until the result is clear of every axis-aligned direction.
fn deflect<R: Rng>(velocity: &mut Vec2, rng: &mut R) {
    let speed = velocity.length();
    let angle = velocity.angle();

    let new_angle = loop {
        let offset = rng
            .gen_range(-BALL_MAX_DEFLECT_DEGREES..BALL_MAX_DEFLECT_DEGREES)
            .to_radians();
        let candidate = angle + offset;
        if !near_axis(candidate) {
            break candidate;
        }
    };

    *velocity = Vec2::from_angle(new_angle) * speed;
}

/// Re-center the ball and serve it in a fresh random direction at base speed
pub fn reset_ball<R: Rng>(ball: &mut Ball, rng: &mut R) {
    ball.position = Vec2::ZERO;

    let angle = loop {
        let candidate = rng.gen_range(0.0..std::f64::consts::TAU);
        if !near_axis(candidate) {
            break candidate;
        }
    };

    ball.velocity = Vec2::from_angle(angle) * BALL_BASE_SPEED;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn state_with_ball(position: Vec2, velocity: Vec2) -> GameState {
        let mut state = GameState::new();
        state.ball = Ball { position, velocity };
        state
    }

    #[test]
    fn free_flight_is_linear() {
        let mut state = state_with_ball(Vec2::ZERO, Vec2::new(1.0, 0.5));
        let mut stats = GameStats::default();
        advance(&mut state, &mut stats, &mut rng(), 0.5);

        assert!((state.ball.position.x - 0.5).abs() < 1e-12);
        assert!((state.ball.position.y - 0.25).abs() < 1e-12);
        assert_eq!(stats.ball_collisions_count, 0);
    }

    #[test]
    fn wall_hit_reflects_x_velocity() {
        // Heading straight-ish at the right wall from close range
        let mut state = state_with_ball(Vec2::new(2.5, 0.0), Vec2::new(4.0, 0.4));
        let mut stats = GameStats::default();
        advance(&mut state, &mut stats, &mut rng(), 0.2);

        assert!(state.ball.velocity.x < 0.0);
        assert!(state.ball.position.x <= WALL_MAX_X - BALL_RADIUS + 1e-9);
        assert_eq!(stats.ball_collisions_count, 1);
        assert_eq!(stats.ball_exchanges_count, 0);
    }

    #[test]
    fn paddle_hit_counts_exchange_and_keeps_speed() {
        // Ball just below paddle 1, moving straight up into its face
        let mut state = GameState::new();
        state.ball = Ball {
            position: Vec2::new(0.0, PADDLE_HOME_Y - 1.0),
            velocity: Vec2::new(2.0, 4.0),
        };
        let mut stats = GameStats::default();
        let speed_before = state.ball.velocity.length();
        advance(&mut state, &mut stats, &mut rng(), 0.3);

        assert_eq!(stats.ball_exchanges_count, 1);
        assert!(state.ball.velocity.y < 0.0);
        // First exchange: deflected but not accelerated
        assert!((state.ball.velocity.length() - speed_before).abs() < 1e-9);
    }

    #[test]
    fn every_third_exchange_speeds_up_within_bounds() {
        let mut rng = rng();
        let mut state = GameState::new();
        let mut stats = GameStats::default();
        stats.ball_exchanges_count = 2;
        state.ball = Ball {
            position: Vec2::new(0.0, PADDLE_HOME_Y - 1.0),
            velocity: Vec2::new(2.0, 4.0),
        };
        let speed_before = state.ball.velocity.length();
        advance(&mut state, &mut stats, &mut rng, 0.3);

        assert_eq!(stats.ball_exchanges_count, 3);
        let speed_after = state.ball.velocity.length();
        assert!(speed_after > speed_before);
        assert!(speed_after <= BALL_MAX_SPEED + 1e-9);
        assert!((speed_after - speed_before * BALL_SPEED_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn speed_up_clamps_at_max() {
        let mut rng = rng();
        let mut state = GameState::new();
        let mut stats = GameStats::default();
        stats.ball_exchanges_count = 2;
        state.ball = Ball {
            position: Vec2::new(0.0, PADDLE_HOME_Y - 1.0),
            velocity: Vec2::new(8.0, 13.0),
        };
        advance(&mut state, &mut stats, &mut rng, 0.3);

        assert!(state.ball.velocity.length() <= BALL_MAX_SPEED + 1e-9);
    }

    #[test]
    fn overrun_past_positive_goal_scores_for_p2_and_reserves() {
        // No paddle in the way: ball at the far right edge of paddle 1's row
        let mut state = state_with_ball(Vec2::new(2.4, 4.0), Vec2::new(0.0, 8.0));
        state.paddle1_position = Vec2::new(-2.0, PADDLE_HOME_Y);
        let mut stats = GameStats::default();
        advance(&mut state, &mut stats, &mut rng(), 0.5);

        assert_eq!(state.p2_score, 1);
        assert_eq!(state.p1_score, 0);
        assert_eq!(state.ball.position, Vec2::ZERO);
        assert!((state.ball.velocity.length() - BALL_BASE_SPEED).abs() < 1e-9);
    }

    #[test]
    fn ball_outside_paddle_margin_misses_and_scores() {
        // Aimed at a y that passes the paddle's x-extent just outside the
        // collision margin: must sail through and overrun the goal line.
        let mut state = GameState::new();
        state.paddle2_position = Vec2::new(0.0, -PADDLE_HOME_Y);
        let miss_x = PADDLE_HALF_WIDTH + BALL_RADIUS + 0.01;
        state.ball = Ball {
            position: Vec2::new(miss_x, 0.0),
            velocity: Vec2::new(0.0, -6.0),
        };
        let mut stats = GameStats::default();
        advance(&mut state, &mut stats, &mut rng(), 1.0);

        assert_eq!(stats.ball_exchanges_count, 0);
        assert_eq!(state.p1_score, 1);
    }

    #[test]
    fn scores_never_decrease_over_many_ticks() {
        let mut rng = rng();
        let mut state = GameState::new();
        reset_ball(&mut state.ball, &mut rng);
        let mut stats = GameStats::default();
        let mut last = (0, 0);

        for _ in 0..2000 {
            advance(&mut state, &mut stats, &mut rng, 1.0 / 60.0);
            assert!(state.p1_score >= last.0 && state.p2_score >= last.1);
            last = (state.p1_score, state.p2_score);
            // Speed stays inside the hard bounds at all times
            let speed = state.ball.velocity.length();
            assert!(speed >= BALL_BASE_SPEED - 1e-9 && speed <= BALL_MAX_SPEED + 1e-9);
        }
        assert!(stats.ball_collisions_count >= stats.ball_exchanges_count);
    }

    #[test]
    fn reset_ball_avoids_axis_aligned_serves() {
        let mut rng = rng();
        let mut ball = Ball::default();
        for _ in 0..200 {
            reset_ball(&mut ball, &mut rng);
            assert!(!near_axis(ball.velocity.angle()));
        }
    }

    #[test]
    fn near_axis_handles_negative_angles() {
        // Straight down, expressed as a negative atan2 result
        assert!(near_axis(-std::f64::consts::FRAC_PI_2));
        assert!(near_axis(0.1_f64.to_radians()));
        assert!(!near_axis(45.0_f64.to_radians()));
    }
}
