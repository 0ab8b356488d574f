//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics.

use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// 2D vector in playfield units. The origin is the center of the ground,
/// y grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2f {
    pub x: f32,
    pub y: f32,
}

impl Vec2f {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing at `angle` radians, scaled by `len`.
    pub fn from_angle(angle: f32, len: f32) -> Self {
        Self::new(angle.cos() * len, angle.sin() * len)
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Angle of the vector in radians, in $(-\pi, \pi]$.
    pub fn angle(self) -> f32 {
        self.y.atan2(self.x)
    }
}

impl Add for Vec2f {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2f {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2f {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2f {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f32> for Vec2f {
    type Output = Self;

    fn mul(self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k)
    }
}

impl Div<f32> for Vec2f {
    type Output = Self;

    fn div(self, k: f32) -> Self {
        Self::new(self.x / k, self.y / k)
    }
}

impl Neg for Vec2f {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_arithmetic() {
        let a = Vec2f::new(1.0, 2.0);
        let b = Vec2f::new(3.0, -4.0);
        assert_eq!(a + b, Vec2f::new(4.0, -2.0));
        assert_eq!(a - b, Vec2f::new(-2.0, 6.0));
        assert_eq!(a * 2.0, Vec2f::new(2.0, 4.0));
        assert_eq!(b / 2.0, Vec2f::new(1.5, -2.0));
        assert_eq!(-a, Vec2f::new(-1.0, -2.0));

        let mut c = a;
        c += b;
        c -= a;
        assert_eq!(c, b);
    }

    #[test]
    fn vec2_from_angle() {
        let v = Vec2f::from_angle(std::f32::consts::PI, 100.0);
        assert!((v.x + 100.0).abs() < 1e-3);
        assert!(v.y.abs() < 1e-3);
        assert!((v.length() - 100.0).abs() < 1e-3);
    }
}
