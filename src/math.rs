//! Vector and quaternion primitives for Alt tracker poses.
//!
//! Operators follow the device SDK conventions: quaternions are stored as
//! `[x, y, z, w]`, and `+`/`-` on quaternions are plain component sums with no
//! renormalization.

use std::ops::{Add, Div, Mul, Neg, Sub};

/// 3D vector, used for positions and axis directions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const RIGHT: Vector3 = Vector3::new(1.0, 0.0, 0.0);
    pub const UP: Vector3 = Vector3::new(0.0, 1.0, 0.0);
    pub const FORWARD: Vector3 = Vector3::new(0.0, 0.0, 1.0);
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);
    pub const ONE: Vector3 = Vector3::new(1.0, 1.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Negated vector.
    pub fn inverse(self) -> Self {
        -self
    }

    pub fn is_nan_any(&self) -> bool {
        self.x.is_nan() || self.y.is_nan() || self.z.is_nan()
    }

    pub fn dot(self, other: Vector3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vector3) -> Vector3 {
        Vector3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul for Vector3 {
    type Output = Vector3;

    fn mul(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }
}

impl Mul<f32> for Vector3 {
    type Output = Vector3;

    fn mul(self, rhs: f32) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div for Vector3 {
    type Output = Vector3;

    fn div(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x / rhs.x, self.y / rhs.y, self.z / rhs.z)
    }
}

impl Div<f32> for Vector3 {
    type Output = Vector3;

    fn div(self, rhs: f32) -> Vector3 {
        Vector3::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vector3 {
    type Output = Vector3;

    fn neg(self) -> Vector3 {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

/// Orientation quaternion `[x, y, z, w]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::IDENTITY
    }
}

/// Euler angles in degrees, in the host's channel naming.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Magnitude of all four components.
    pub fn size(&self) -> f32 {
        self.size_squared().sqrt()
    }

    pub fn size_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    /// Returns identity when the squared magnitude is below `threshold`,
    /// otherwise every component multiplied by the magnitude.
    ///
    /// The components are multiplied, not divided, so the result is only
    /// unit-length when the input already was. Downstream calibration depends
    /// on this exact output.
    pub fn normalize(&self, threshold: f32) -> Quaternion {
        let square_sum = self.size_squared();
        if square_sum >= threshold {
            let scale = square_sum.sqrt();
            Quaternion::new(
                self.x * scale,
                self.y * scale,
                self.z * scale,
                self.w * scale,
            )
        } else {
            Quaternion::IDENTITY
        }
    }

    pub fn is_normalized(&self) -> bool {
        (1.0 - self.size_squared()).abs() < 0.01
    }

    /// Conjugate: the vector part negated.
    pub fn inverse(&self) -> Quaternion {
        Quaternion::new(-self.x, -self.y, -self.z, self.w)
    }

    pub fn is_nan_any(&self) -> bool {
        self.x.is_nan() || self.y.is_nan() || self.z.is_nan() || self.w.is_nan()
    }

    /// Rotate `v` by this (unit) quaternion.
    pub fn rotate(&self, v: Vector3) -> Vector3 {
        let u = Vector3::new(self.x, self.y, self.z);
        let t = u.cross(v) * 2.0;
        v + t * self.w + u.cross(t)
    }

    /// Extract yaw/pitch/roll in degrees from a normalized quaternion.
    ///
    /// Yaw comes from the Y-related terms, roll from the `asin` term and pitch
    /// from the X/Z terms. Within 0.499 of either pole the extraction collapses
    /// onto yaw with roll pinned to ±90° and pitch zero.
    ///
    /// The pole test and the squares are taken in f32 and widened afterwards,
    /// so the branch picked near the threshold follows single precision.
    pub fn to_euler_angles(&self) -> EulerAngles {
        let test = (self.x * self.y + self.z * self.w) as f64;
        let (x, y, z, w) = (self.x as f64, self.y as f64, self.z as f64, self.w as f64);

        let (yaw, pitch, roll) = if test > 0.499 {
            // singularity at north pole
            (2.0 * x.atan2(w), 0.0, std::f64::consts::FRAC_PI_2)
        } else if test < -0.499 {
            // singularity at south pole
            (-2.0 * x.atan2(w), 0.0, -std::f64::consts::FRAC_PI_2)
        } else {
            let sqx = (self.x * self.x) as f64;
            let sqy = (self.y * self.y) as f64;
            let sqz = (self.z * self.z) as f64;
            let yaw = (2.0 * y * w - 2.0 * x * z).atan2(1.0 - 2.0 * sqy - 2.0 * sqz);
            let roll = (2.0 * test).asin();
            let pitch = (2.0 * x * w - 2.0 * y * z).atan2(1.0 - 2.0 * sqx - 2.0 * sqz);
            (yaw, pitch, roll)
        };

        EulerAngles {
            yaw: yaw.to_degrees(),
            pitch: pitch.to_degrees(),
            roll: roll.to_degrees(),
        }
    }
}

impl Add for Quaternion {
    type Output = Quaternion;

    fn add(self, rhs: Quaternion) -> Quaternion {
        Quaternion::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z, self.w + rhs.w)
    }
}

impl Sub for Quaternion {
    type Output = Quaternion;

    fn sub(self, rhs: Quaternion) -> Quaternion {
        Quaternion::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z, self.w - rhs.w)
    }
}

/// Hamilton product.
impl Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, q2: Quaternion) -> Quaternion {
        let q1 = self;
        Quaternion::new(
            q1.w * q2.x + q1.x * q2.w + q1.y * q2.z - q1.z * q2.y,
            q1.w * q2.y + q1.y * q2.w + q1.z * q2.x - q1.x * q2.z,
            q1.w * q2.z + q1.z * q2.w + q1.x * q2.y - q1.y * q2.x,
            q1.w * q2.w - q1.x * q2.x - q1.y * q2.y - q1.z * q2.z,
        )
    }
}
