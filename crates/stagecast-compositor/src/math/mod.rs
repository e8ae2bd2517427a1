//! Transform math for the quad pipeline.
//!
//! Matrices are composed row-major (`[[f32; 4]; 4]`, `m[row][col]`) and converted
//! with [`column_major`] right before upload. [`look_at`] and [`ortho`] already
//! return upload-ready column-major arrays, matching what WGSL `mat4x4` expects.

mod mat4;
mod vec3;

pub use mat4::{column_major, look_at, matrix_mult, ortho, transform_point, ColumnMajor, Mat4, IDENTITY};
pub use vec3::{vector_cross, vector_dot, vector_sub, vector_unit, Vec3};
