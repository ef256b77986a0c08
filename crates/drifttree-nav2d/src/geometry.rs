use std::f64::consts::TAU;
use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// A point in the plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Point2D { x, y }
    }
}

impl fmt::Display for Point2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A displacement in the plane. Directions are measured in turns: one full
/// revolution is 1.0, a quarter turn is 0.25.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2D {
    pub x: f64,
    pub y: f64,
}

impl Vector2D {
    pub fn new(x: f64, y: f64) -> Self {
        Vector2D { x, y }
    }

    pub fn from_polar(magnitude: f64, direction_turns: f64) -> Self {
        let angle = direction_turns * TAU;
        Vector2D {
            x: magnitude * angle.cos(),
            y: magnitude * angle.sin(),
        }
    }

    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

impl Add<Vector2D> for Point2D {
    type Output = Point2D;

    fn add(self, rhs: Vector2D) -> Point2D {
        Point2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub<Point2D> for Point2D {
    type Output = Vector2D;

    fn sub(self, rhs: Point2D) -> Vector2D {
        Vector2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<Vector2D> for f64 {
    type Output = Vector2D;

    fn mul(self, rhs: Vector2D) -> Vector2D {
        Vector2D::new(self * rhs.x, self * rhs.y)
    }
}

/// An axis-aligned rectangle, closed on all sides.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rectangle2D {
    pub lower_left: Point2D,
    pub upper_right: Point2D,
}

impl Rectangle2D {
    pub fn new(lower_left: Point2D, upper_right: Point2D) -> Self {
        Rectangle2D {
            lower_left,
            upper_right,
        }
    }

    pub fn contains(&self, point: Point2D) -> bool {
        point.x >= self.lower_left.x
            && point.x <= self.upper_right.x
            && point.y >= self.lower_left.y
            && point.y <= self.upper_right.y
    }

    pub fn area(&self) -> f64 {
        (self.upper_right.x - self.lower_left.x) * (self.upper_right.y - self.lower_left.y)
    }

    /// Distance from a point to the rectangle; zero inside.
    pub fn distance_to(&self, point: Point2D) -> f64 {
        let dx = (self.lower_left.x - point.x).max(point.x - self.upper_right.x).max(0.0);
        let dy = (self.lower_left.y - point.y).max(point.y - self.upper_right.y).max(0.0);
        dx.hypot(dy)
    }

    pub fn sample_uniform(&self, rng: &mut ChaCha8Rng) -> Point2D {
        let x = if self.upper_right.x > self.lower_left.x {
            rng.gen_range(self.lower_left.x..self.upper_right.x)
        } else {
            self.lower_left.x
        };
        let y = if self.upper_right.y > self.lower_left.y {
            rng.gen_range(self.lower_left.y..self.upper_right.y)
        } else {
            self.lower_left.y
        };
        Point2D::new(x, y)
    }
}

impl fmt::Display for Rectangle2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.lower_left.x, self.lower_left.y, self.upper_right.x, self.upper_right.y
        )
    }
}

impl FromStr for Rectangle2D {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut coords = raw.split_whitespace().map(str::parse::<f64>);
        let mut next = || -> Result<f64, String> {
            coords
                .next()
                .ok_or_else(|| format!("rectangle needs 4 coordinates: '{raw}'"))?
                .map_err(|e| format!("bad coordinate in '{raw}': {e}"))
        };
        let x0 = next()?;
        let y0 = next()?;
        let x1 = next()?;
        let y1 = next()?;
        Ok(Rectangle2D::new(Point2D::new(x0, y0), Point2D::new(x1, y1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polar_vectors_use_turns() {
        let up = Vector2D::from_polar(2.0, 0.25);
        assert!(up.x.abs() < 1e-12);
        assert!((up.y - 2.0).abs() < 1e-12);
    }

    #[test]
    fn rectangle_distance_is_zero_inside_and_euclidean_outside() {
        let rect: Rectangle2D = "0 0 2 2".parse().expect("rectangle parses");
        assert_eq!(rect.distance_to(Point2D::new(1.0, 1.0)), 0.0);
        assert!((rect.distance_to(Point2D::new(5.0, 2.0)) - 3.0).abs() < 1e-12);
        assert!((rect.distance_to(Point2D::new(5.0, 6.0)) - 5.0).abs() < 1e-12);
    }
}
