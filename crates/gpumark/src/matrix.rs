use std::ops::Mul;

/// Column-major 4x4 matrix, laid out the way `glUniformMatrix4fv` expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4(pub [f32; 16]);

impl Default for Mat4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mat4 {
    pub fn identity() -> Self {
        let mut m = [0.0; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        Mat4(m)
    }

    /// Right-handed perspective projection, `fovy` in degrees.
    pub fn perspective(fovy: f32, aspect: f32, near: f32, far: f32) -> Self {
        let f = 1.0 / (fovy.to_radians() / 2.0).tan();
        let mut m = [0.0; 16];
        m[0] = f / aspect;
        m[5] = f;
        m[10] = (far + near) / (near - far);
        m[11] = -1.0;
        m[14] = (2.0 * far * near) / (near - far);
        Mat4(m)
    }

    pub fn translate(x: f32, y: f32, z: f32) -> Self {
        let mut m = Self::identity();
        m.0[12] = x;
        m.0[13] = y;
        m.0[14] = z;
        m
    }

    /// Rotation around the z axis, `degrees` counter-clockwise.
    pub fn rotate_z(degrees: f32) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        let mut m = Self::identity();
        m.0[0] = c;
        m.0[1] = s;
        m.0[4] = -s;
        m.0[5] = c;
        m
    }

    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.0[col * 4 + row]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl Mul for Mat4 {
    type Output = Mat4;

    fn mul(self, rhs: Mat4) -> Mat4 {
        let mut out = [0.0; 16];
        for col in 0..4 {
            for row in 0..4 {
                out[col * 4 + row] = (0..4).map(|k| self.at(row, k) * rhs.at(k, col)).sum();
            }
        }
        Mat4(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_identity_is_neutral() {
        let t = Mat4::translate(1.0, 2.0, 3.0);
        assert_eq!(t * Mat4::identity(), t);
        assert_eq!(Mat4::identity() * t, t);
    }

    #[test]
    fn test_perspective() {
        let p = Mat4::perspective(60.0, 2.0, 1.0, 1024.0);
        let f = 1.0 / (30.0f32).to_radians().tan();
        assert!(approx(p.at(0, 0), f / 2.0));
        assert!(approx(p.at(1, 1), f));
        assert!(approx(p.at(3, 2), -1.0));
        assert!(approx(p.at(2, 2), -1025.0 / 1023.0));
    }

    #[test]
    fn test_rotate_z_quarter_turn() {
        let r = Mat4::rotate_z(90.0);
        assert!(approx(r.at(0, 0), 0.0));
        assert!(approx(r.at(1, 0), 1.0));
        assert!(approx(r.at(0, 1), -1.0));
    }
}
