//! 2D vector math used by the simulation

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Sub};

/// Double-precision 2D vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing in `angle` radians
    pub fn from_angle(angle: f64) -> Self {
        Self {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Direction angle in radians, normalized to [0, 2π)
    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x).rem_euclid(std::f64::consts::TAU)
    }

    pub fn distance(&self, other: Vec2) -> f64 {
        (*self - other).length()
    }

    /// Rescale to the given magnitude, keeping direction.
    /// A zero vector is left untouched.
    pub fn with_length(&self, magnitude: f64) -> Vec2 {
        let len = self.length();
        if len == 0.0 {
            return *self;
        }
        *self * (magnitude / len)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, scalar: f64) -> Vec2 {
        Vec2::new(self.x * scalar, self.y * scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_and_distance() {
        let v = Vec2::new(3.0, 4.0);
        assert_eq!(v.length(), 5.0);
        assert_eq!(v.distance(Vec2::ZERO), 5.0);
        assert_eq!(Vec2::new(1.0, 1.0).distance(Vec2::new(1.0, -2.0)), 3.0);
    }

    #[test]
    fn with_length_preserves_direction() {
        let v = Vec2::new(1.0, 1.0).with_length(10.0);
        assert!((v.length() - 10.0).abs() < 1e-12);
        assert!((v.x - v.y).abs() < 1e-12);
    }

    #[test]
    fn with_length_on_zero_vector_is_noop() {
        assert_eq!(Vec2::ZERO.with_length(5.0), Vec2::ZERO);
    }

    #[test]
    fn angle_is_normalized() {
        let down = Vec2::new(0.0, -1.0);
        assert!((down.angle() - 3.0 * std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }
}
