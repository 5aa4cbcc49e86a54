//! 4x4 matrix operations (row-major, column vectors)
//!
//! Euler angles are radians, applied in Z * Y * X order.

use super::vec::Vec3;

/// 4x4 transformation matrix type
pub type Mat4 = [[f32; 4]; 4];

/// Identity matrix
pub fn mat4_identity() -> Mat4 {
    [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Create translation matrix
pub fn mat4_translation(t: Vec3) -> Mat4 {
    [
        [1.0, 0.0, 0.0, t.x],
        [0.0, 1.0, 0.0, t.y],
        [0.0, 0.0, 1.0, t.z],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Create a (possibly non-uniform) scale matrix
pub fn mat4_scale(s: Vec3) -> Mat4 {
    [
        [s.x, 0.0, 0.0, 0.0],
        [0.0, s.y, 0.0, 0.0],
        [0.0, 0.0, s.z, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Build a rotation matrix from euler angles (radians).
pub fn mat4_rotation(rot: Vec3) -> Mat4 {
    let (sx, cx) = rot.x.sin_cos();
    let (sy, cy) = rot.y.sin_cos();
    let (sz, cz) = rot.z.sin_cos();

    [
        [cy * cz, sx * sy * cz - cx * sz, cx * sy * cz + sx * sz, 0.0],
        [cy * sz, sx * sy * sz + cx * cz, cx * sy * sz - sx * cz, 0.0],
        [-sy, sx * cy, cx * cy, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Multiply two 4x4 matrices
pub fn mat4_mul(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut result = [[0.0; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            for k in 0..4 {
                result[i][j] += a[i][k] * b[k][j];
            }
        }
    }
    result
}

/// Transform a point by a 4x4 matrix
pub fn mat4_transform_point(m: &Mat4, p: Vec3) -> Vec3 {
    Vec3::new(
        m[0][0] * p.x + m[0][1] * p.y + m[0][2] * p.z + m[0][3],
        m[1][0] * p.x + m[1][1] * p.y + m[1][2] * p.z + m[1][3],
        m[2][0] * p.x + m[2][1] * p.y + m[2][2] * p.z + m[2][3],
    )
}

/// Transform a direction (ignores translation)
pub fn mat4_transform_vector(m: &Mat4, v: Vec3) -> Vec3 {
    Vec3::new(
        m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
        m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
        m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
    )
}

/// Translation * Rotation * Scale
pub fn mat4_trs(position: Vec3, rotation: Vec3, scale: Vec3) -> Mat4 {
    let tr = mat4_mul(&mat4_translation(position), &mat4_rotation(rotation));
    mat4_mul(&tr, &mat4_scale(scale))
}

/// Convert a unit quaternion `[x, y, z, w]` to euler angles matching `mat4_rotation`.
pub fn quat_to_euler(q: [f32; 4]) -> Vec3 {
    let [x, y, z, w] = q;

    let sinr_cosp = 2.0 * (w * x + y * z);
    let cosr_cosp = 1.0 - 2.0 * (x * x + y * y);
    let roll = sinr_cosp.atan2(cosr_cosp);

    let sinp = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0);
    let pitch = sinp.asin();

    let siny_cosp = 2.0 * (w * z + x * y);
    let cosy_cosp = 1.0 - 2.0 * (y * y + z * z);
    let yaw = siny_cosp.atan2(cosy_cosp);

    Vec3::new(roll, pitch, yaw)
}

/// Rotation of `angle` radians about `axis`
pub fn mat4_axis_angle(axis: Vec3, angle: f32) -> Mat4 {
    let a = axis.normalize();
    let (s, c) = angle.sin_cos();
    let t = 1.0 - c;
    [
        [t * a.x * a.x + c, t * a.x * a.y - s * a.z, t * a.x * a.z + s * a.y, 0.0],
        [t * a.x * a.y + s * a.z, t * a.y * a.y + c, t * a.y * a.z - s * a.x, 0.0],
        [t * a.x * a.z - s * a.y, t * a.y * a.z + s * a.x, t * a.z * a.z + c, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Split an affine matrix into (position, euler rotation, scale). Shear is lost.
pub fn mat4_decompose(m: &Mat4) -> (Vec3, Vec3, Vec3) {
    let position = Vec3::new(m[0][3], m[1][3], m[2][3]);
    let column = |j: usize| Vec3::new(m[0][j], m[1][j], m[2][j]);
    let (cx, cy, cz) = (column(0), column(1), column(2));
    let mut scale = Vec3::new(cx.len(), cy.len(), cz.len());
    if cx.cross(cy).dot(cz) < 0.0 {
        scale.x = -scale.x;
    }
    if scale.x == 0.0 || scale.y == 0.0 || scale.z == 0.0 {
        return (position, Vec3::ZERO, scale);
    }

    // Normalized rotation columns: r[row][col]
    let r = |row: usize, col: usize| m[row][col] / [scale.x, scale.y, scale.z][col];
    let pitch = (-r(2, 0)).clamp(-1.0, 1.0).asin();
    let (roll, yaw) = if r(2, 0).abs() < 0.9999 {
        (r(2, 1).atan2(r(2, 2)), r(1, 0).atan2(r(0, 0)))
    } else {
        // Gimbal lock: fold yaw into roll
        ((-r(1, 2)).atan2(r(1, 1)), 0.0)
    };
    (position, Vec3::new(roll, pitch, yaw), scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).len() < 1e-4
    }

    #[test]
    fn test_translation_moves_point() {
        let m = mat4_translation(Vec3::new(10.0, 20.0, 30.0));
        let p = mat4_transform_point(&m, Vec3::new(1.0, 1.0, 1.0));
        assert!(approx(p, Vec3::new(11.0, 21.0, 31.0)));
    }

    #[test]
    fn test_rotation_about_y() {
        let m = mat4_rotation(Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0));
        let p = mat4_transform_point(&m, Vec3::new(1.0, 0.0, 0.0));
        assert!(approx(p, Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn test_trs_scales_before_translating() {
        let m = mat4_trs(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, Vec3::splat(2.0));
        let p = mat4_transform_point(&m, Vec3::new(1.0, 1.0, 1.0));
        assert!(approx(p, Vec3::new(3.0, 2.0, 2.0)));
    }

    #[test]
    fn test_quat_to_euler_matches_rotation() {
        // 90 degrees about Z
        let half = std::f32::consts::FRAC_PI_4;
        let q = [0.0, 0.0, half.sin(), half.cos()];
        let euler = quat_to_euler(q);
        let m = mat4_rotation(euler);
        let p = mat4_transform_point(&m, Vec3::new(1.0, 0.0, 0.0));
        assert!(approx(p, Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn test_decompose_recovers_trs() {
        let pos = Vec3::new(1.0, -2.0, 3.0);
        let rot = Vec3::new(0.3, -0.7, 1.2);
        let scale = Vec3::new(2.0, 0.5, 1.5);
        let (p, r, s) = mat4_decompose(&mat4_trs(pos, rot, scale));
        assert!(approx(p, pos));
        assert!(approx(r, rot));
        assert!(approx(s, scale));
    }

    #[test]
    fn test_axis_angle_matches_euler() {
        let angle = 0.8;
        let a = mat4_axis_angle(Vec3::new(0.0, 1.0, 0.0), angle);
        let b = mat4_rotation(Vec3::new(0.0, angle, 0.0));
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert!(approx(mat4_transform_point(&a, p), mat4_transform_point(&b, p)));
    }
}
