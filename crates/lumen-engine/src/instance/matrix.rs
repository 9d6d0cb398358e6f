use bytemuck::{Pod, Zeroable};

/// Column-major 4x4 float matrix, laid out like WGSL `mat4x4<f32>`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Mat4 {
    pub cols: [[f32; 4]; 4],
}

impl Mat4 {
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub const fn from_translation(x: f32, y: f32, z: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.cols[3] = [x, y, z, 1.0];
        m
    }

    #[inline]
    pub const fn translation(&self) -> [f32; 3] {
        [self.cols[3][0], self.cols[3][1], self.cols[3][2]]
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}
