use super::vec3::{vector_cross, vector_sub, vector_unit, Vec3};

/// Row-major 4x4 matrix, `m[row][col]`.
pub type Mat4 = [[f32; 4]; 4];

/// Flat column-major matrix, element `(row, col)` at `col * 4 + row`.
pub type ColumnMajor = [f32; 16];

pub const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Standard `a * b` product of two row-major matrices.
pub fn matrix_mult(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [[0.0f32; 4]; 4];
    for (row, out_row) in out.iter_mut().enumerate() {
        for (col, cell) in out_row.iter_mut().enumerate() {
            *cell = (0..4).map(|k| a[row][k] * b[k][col]).sum();
        }
    }
    out
}

/// Transposes a row-major matrix into the flat column-major upload layout.
pub fn column_major(m: &Mat4) -> ColumnMajor {
    let mut out = [0.0f32; 16];
    for (row, cells) in m.iter().enumerate() {
        for (col, value) in cells.iter().enumerate() {
            out[col * 4 + row] = *value;
        }
    }
    out
}

/// View matrix looking from `eye` towards `center`.
///
/// Basis: `z = unit(eye - center)`, `x = unit(up × z)`, `y = z × x`; the rotation
/// is composed with the translation by `-eye`.
pub fn look_at(eye: Vec3, center: Vec3, up: Vec3) -> ColumnMajor {
    let z = vector_unit(vector_sub(eye, center));
    let x = vector_unit(vector_cross(up, z));
    let y = vector_cross(z, x);

    let rotation: Mat4 = [
        [x[0], x[1], x[2], 0.0],
        [y[0], y[1], y[2], 0.0],
        [z[0], z[1], z[2], 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    let translation: Mat4 = [
        [1.0, 0.0, 0.0, -eye[0]],
        [0.0, 1.0, 0.0, -eye[1]],
        [0.0, 0.0, 1.0, -eye[2]],
        [0.0, 0.0, 0.0, 1.0],
    ];

    column_major(&matrix_mult(&rotation, &translation))
}

/// Orthographic projection onto the GL clip cube (`z` in `[-1, 1]`).
pub fn ortho(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> ColumnMajor {
    let rl = right - left;
    let tb = top - bottom;
    let fnr = far - near;

    column_major(&[
        [2.0 / rl, 0.0, 0.0, -(right + left) / rl],
        [0.0, 2.0 / tb, 0.0, -(top + bottom) / tb],
        [0.0, 0.0, -2.0 / fnr, -(far + near) / fnr],
        [0.0, 0.0, 0.0, 1.0],
    ])
}

/// Applies a column-major matrix to the point `(p, 1)`.
pub fn transform_point(m: &ColumnMajor, p: Vec3) -> [f32; 4] {
    let mut out = [0.0f32; 4];
    for (row, cell) in out.iter_mut().enumerate() {
        *cell = m[row] * p[0] + m[4 + row] * p[1] + m[8 + row] * p[2] + m[12 + row];
    }
    out
}
