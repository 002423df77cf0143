//! 4x4 matrix and 3-vector helpers.
//!
//! Matrices are row-major `[f64; 16]`: element `(row, col)` lives at
//! `row * 4 + col`, translation sits in the last column and points are
//! column vectors (`M · p`). Uploads to column-major shaders transpose.

use std::ops::Mul;

pub type Vec3 = [f64; 3];

/// Row-major 4x4 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4(pub [f64; 16]);

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        Mat4([
            1.0, 0.0, 0.0, x, //
            0.0, 1.0, 0.0, y, //
            0.0, 0.0, 1.0, z, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    pub fn scale(x: f64, y: f64, z: f64) -> Self {
        Mat4([
            x, 0.0, 0.0, 0.0, //
            0.0, y, 0.0, 0.0, //
            0.0, 0.0, z, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    /// Rotation about X by `angle` radians.
    pub fn rotation_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Mat4([
            1.0, 0.0, 0.0, 0.0, //
            0.0, c, -s, 0.0, //
            0.0, s, c, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    /// Rotation about Y by `angle` radians.
    pub fn rotation_y(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Mat4([
            c, 0.0, s, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            -s, 0.0, c, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    /// Rotation about Z by `angle` radians.
    pub fn rotation_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Mat4([
            c, -s, 0.0, 0.0, //
            s, c, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    /// Perspective projection with a vertical field of view in degrees.
    pub fn projection(fov_degrees: f64, aspect: f64, near: f64, far: f64) -> Self {
        let top = near * (fov_degrees.to_radians() / 2.0).tan();
        let right = top * aspect;
        Self::frustum(-right, right, -top, top, near, far)
    }

    fn frustum(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> Self {
        Mat4([
            2.0 * near / (right - left),
            0.0,
            (right + left) / (right - left),
            0.0,
            0.0,
            2.0 * near / (top - bottom),
            (top + bottom) / (top - bottom),
            0.0,
            0.0,
            0.0,
            -(far + near) / (far - near),
            -2.0 * far * near / (far - near),
            0.0,
            0.0,
            -1.0,
            0.0,
        ])
    }

    /// Orthographic projection of a box `2·half_width` by `2·half_height`.
    pub fn orthographic(half_width: f64, half_height: f64, near: f64, far: f64) -> Self {
        Mat4([
            1.0 / half_width,
            0.0,
            0.0,
            0.0,
            0.0,
            1.0 / half_height,
            0.0,
            0.0,
            0.0,
            0.0,
            -2.0 / (far - near),
            -(far + near) / (far - near),
            0.0,
            0.0,
            0.0,
            1.0,
        ])
    }

    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.0[row * 4 + col]
    }

    /// Matrix product `self · rhs`.
    pub fn dot(&self, rhs: &Mat4) -> Mat4 {
        let mut out = [0.0; 16];
        for row in 0..4 {
            for col in 0..4 {
                out[row * 4 + col] = (0..4).map(|k| self.at(row, k) * rhs.at(k, col)).sum();
            }
        }
        Mat4(out)
    }

    pub fn transpose(&self) -> Mat4 {
        let mut out = [0.0; 16];
        for row in 0..4 {
            for col in 0..4 {
                out[col * 4 + row] = self.at(row, col);
            }
        }
        Mat4(out)
    }

    /// Inverse by Gauss-Jordan elimination, `None` when singular.
    pub fn inverse(&self) -> Option<Mat4> {
        let mut a = self.0;
        let mut inv = Self::IDENTITY.0;

        for col in 0..4 {
            let pivot = (col..4).max_by(|&r1, &r2| {
                a[r1 * 4 + col]
                    .abs()
                    .total_cmp(&a[r2 * 4 + col].abs())
            })?;
            if a[pivot * 4 + col].abs() < 1e-12 {
                return None;
            }
            if pivot != col {
                for k in 0..4 {
                    a.swap(pivot * 4 + k, col * 4 + k);
                    inv.swap(pivot * 4 + k, col * 4 + k);
                }
            }

            let p = a[col * 4 + col];
            for k in 0..4 {
                a[col * 4 + k] /= p;
                inv[col * 4 + k] /= p;
            }

            for row in 0..4 {
                if row == col {
                    continue;
                }
                let factor = a[row * 4 + col];
                if factor == 0.0 {
                    continue;
                }
                for k in 0..4 {
                    a[row * 4 + k] -= factor * a[col * 4 + k];
                    inv[row * 4 + k] -= factor * inv[col * 4 + k];
                }
            }
        }
        Some(Mat4(inv))
    }

    pub fn get_translation(&self) -> Vec3 {
        [self.0[3], self.0[7], self.0[11]]
    }

    /// First basis column (camera right).
    pub fn column_i(&self) -> Vec3 {
        [self.0[0], self.0[4], self.0[8]]
    }

    /// Second basis column (camera up).
    pub fn column_j(&self) -> Vec3 {
        [self.0[1], self.0[5], self.0[9]]
    }

    /// Third basis column (camera backward).
    pub fn column_k(&self) -> Vec3 {
        [self.0[2], self.0[6], self.0[10]]
    }

    /// Narrow to `f32` in storage order.
    pub fn to_f32(&self) -> [f32; 16] {
        self.0.map(|v| v as f32)
    }

    /// Elementwise comparison within `epsilon`.
    pub fn approx_eq(&self, other: &Mat4, epsilon: f64) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }
}

impl Mul for Mat4 {
    type Output = Mat4;

    fn mul(self, rhs: Mat4) -> Mat4 {
        self.dot(&rhs)
    }
}

pub fn vec3_add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn vec3_scale(v: Vec3, s: f64) -> Vec3 {
    [v[0] * s, v[1] * s, v[2] * s]
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_identity_dot() {
        let m = Mat4::translation(1.0, 2.0, 3.0) * Mat4::rotation_y(0.3);
        assert!(m.dot(&Mat4::IDENTITY).approx_eq(&m, EPS));
        assert!(Mat4::IDENTITY.dot(&m).approx_eq(&m, EPS));
    }

    #[test]
    fn test_translation_inverse() {
        let t = Mat4::translation(0.0, 50.0, 200.0);
        let inv = t.inverse().unwrap();
        assert!(inv.approx_eq(&Mat4::translation(0.0, -50.0, -200.0), EPS));
    }

    #[test]
    fn test_rotation_inverse_is_transpose() {
        let r = Mat4::rotation_x(0.7) * Mat4::rotation_y(-1.2) * Mat4::rotation_z(0.4);
        assert!(r.inverse().unwrap().approx_eq(&r.transpose(), EPS));
    }

    #[test]
    fn test_singular_has_no_inverse() {
        assert!(Mat4::scale(1.0, 0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_inverse_needs_pivoting() {
        // Zero on the leading diagonal.
        let m = Mat4([
            0.0, 1.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 2.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        let inv = m.inverse().unwrap();
        assert!(m.dot(&inv).approx_eq(&Mat4::IDENTITY, EPS));
    }

    #[test]
    fn test_projection_terms() {
        let p = Mat4::projection(90.0, 2.0, 1.0, 3.0);
        // top = tan(45°) = 1, right = 2
        assert!((p.at(0, 0) - 0.5).abs() < EPS);
        assert!((p.at(1, 1) - 1.0).abs() < EPS);
        assert!((p.at(2, 2) + 2.0).abs() < EPS);
        assert!((p.at(2, 3) + 3.0).abs() < EPS);
        assert_eq!(p.at(3, 2), -1.0);
        assert_eq!(p.at(3, 3), 0.0);
    }

    #[test]
    fn test_orthographic_terms() {
        let o = Mat4::orthographic(4.0, 2.0, 1.0, 11.0);
        assert_eq!(o.at(0, 0), 0.25);
        assert_eq!(o.at(1, 1), 0.5);
        assert!((o.at(2, 2) + 0.2).abs() < EPS);
        assert!((o.at(2, 3) + 1.2).abs() < EPS);
    }

    #[test]
    fn test_columns() {
        let m = Mat4::translation(1.0, 2.0, 3.0) * Mat4::rotation_y(std::f64::consts::FRAC_PI_2);
        assert_eq!(m.get_translation(), [1.0, 2.0, 3.0]);
        let k = m.column_k();
        assert!((k[0] - 1.0).abs() < EPS);
        assert!(k[2].abs() < EPS);
        let i = m.column_i();
        assert!((i[2] + 1.0).abs() < EPS);
        assert_eq!(m.column_j(), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_vec3() {
        assert_eq!(vec3_add([1.0, 2.0, 3.0], [1.0, 1.0, 1.0]), [2.0, 3.0, 4.0]);
        assert_eq!(vec3_scale([1.0, -2.0, 0.5], 2.0), [2.0, -4.0, 1.0]);
    }
}
