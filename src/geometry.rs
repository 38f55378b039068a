use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Number of floats per interleaved vertex: position, normal, uv.
pub const VERTEX_STRIDE: usize = 8;

/// Indexed triangle geometry ready for upload.
///
/// Vertices are laid out as `position.xyz`, `normal.xyz`, `uv.xy`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl Geometry {
    /// Interleaves separate attribute streams. Missing normals are computed from
    /// the faces, missing uvs default to zero and missing indices are generated.
    pub fn from_attributes(
        positions: &[[f32; 3]],
        normals: Option<&[[f32; 3]]>,
        uvs: Option<&[[f32; 2]]>,
        indices: Option<Vec<u32>>,
    ) -> Self {
        let mut vertices = Vec::with_capacity(positions.len() * VERTEX_STRIDE);
        for (i, position) in positions.iter().enumerate() {
            vertices.extend_from_slice(position);
            let normal = normals.and_then(|n| n.get(i)).copied().unwrap_or([0.0; 3]);
            vertices.extend_from_slice(&normal);
            let uv = uvs.and_then(|t| t.get(i)).copied().unwrap_or([0.0; 2]);
            vertices.extend_from_slice(&uv);
        }
        let indices = indices.unwrap_or_else(|| (0..positions.len() as u32).collect());
        let mut geometry = Self { vertices, indices };
        if normals.is_none() || geometry.needs_normals() {
            geometry.compute_normals();
        }
        geometry
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }

    pub fn position(&self, index: usize) -> Vec3 {
        let base = index * VERTEX_STRIDE;
        Vec3::from_slice(&self.vertices[base..base + 3])
    }

    pub fn normal(&self, index: usize) -> Vec3 {
        let base = index * VERTEX_STRIDE + 3;
        Vec3::from_slice(&self.vertices[base..base + 3])
    }

    fn needs_normals(&self) -> bool {
        self.vertices
            .chunks_exact(VERTEX_STRIDE)
            .any(|chunk| chunk[3] == 0.0 && chunk[4] == 0.0 && chunk[5] == 0.0)
    }

    fn compute_normals(&mut self) {
        let vertex_count = self.vertex_count();
        let mut accum = vec![Vec3::ZERO; vertex_count];

        for triangle in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [
                triangle[0] as usize,
                triangle[1] as usize,
                triangle[2] as usize,
            ];
            if i0.max(i1).max(i2) >= vertex_count {
                continue;
            }
            let p0 = self.position(i0);
            let normal = (self.position(i1) - p0).cross(self.position(i2) - p0);
            if normal.length_squared() > f32::EPSILON {
                let normal = normal.normalize();
                accum[i0] += normal;
                accum[i1] += normal;
                accum[i2] += normal;
            }
        }

        for (i, normal) in accum.into_iter().enumerate() {
            let normal = normal.normalize_or_zero();
            let base = i * VERTEX_STRIDE + 3;
            self.vertices[base..base + 3].copy_from_slice(&normal.to_array());
        }
    }
}
