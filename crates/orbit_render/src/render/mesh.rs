//! CPU-side mesh data
//!
//! Flat vertex and `u32` index arrays as produced by asset loaders. Uploading
//! them is the job of [`crate::render::backends::vulkan::Model`].

use bytemuck::{Pod, Zeroable};

/// Vertex with position, normal and texture coordinate
///
/// `#[repr(C)]` keeps the layout in sync with the pipeline's vertex input
/// attributes (locations 0, 1 and 2).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],

    /// Normal vector
    pub normal: [f32; 3],

    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a new vertex
    pub const fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }
}

/// Vertices plus triangle-list indices for one mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Vertex data
    pub vertices: Vec<Vertex>,

    /// Index data for triangles
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Create a new mesh
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Unit quad in the XY plane facing +Z: 4 vertices, 6 indices
    pub fn quad() -> Self {
        let normal = [0.0, 0.0, 1.0];
        let vertices = vec![
            Vertex::new([-0.5, -0.5, 0.0], normal, [0.0, 1.0]),
            Vertex::new([0.5, -0.5, 0.0], normal, [1.0, 1.0]),
            Vertex::new([0.5, 0.5, 0.0], normal, [1.0, 0.0]),
            Vertex::new([-0.5, 0.5, 0.0], normal, [0.0, 0.0]),
        ];
        // Counter-clockwise seen from +Z
        let indices = vec![0, 1, 2, 2, 3, 0];
        Self { vertices, indices }
    }

    /// Cube of edge length 1 centred on the origin with per-face normals
    pub fn cube() -> Self {
        // (normal, tangent u, tangent v) per face, u x v == normal
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];
        let corners = [(-0.5, -0.5, [0.0, 1.0]), (0.5, -0.5, [1.0, 1.0]), (0.5, 0.5, [1.0, 0.0]), (-0.5, 0.5, [0.0, 0.0])];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (n, u, v) in faces {
            let base = vertices.len() as u32;
            for (su, sv, tex_coord) in corners {
                let position = [
                    0.5 * n[0] + su * u[0] + sv * v[0],
                    0.5 * n[1] + su * u[1] + sv * v[1],
                    0.5 * n[2] + su * u[2] + sv * v[2],
                ];
                vertices.push(Vertex::new(position, n, tex_coord));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        Self { vertices, indices }
    }

    /// Whether the mesh has something to draw
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    /// Check that every index refers to an existing vertex
    pub fn validate(&self) -> Result<(), String> {
        if self.indices.len() % 3 != 0 {
            return Err(format!("Index count {} is not a multiple of 3", self.indices.len()));
        }
        match self.indices.iter().find(|&&i| i as usize >= self.vertices.len()) {
            Some(index) => Err(format!(
                "Index {index} out of range for {} vertices",
                self.vertices.len()
            )),
            None => Ok(()),
        }
    }

    /// Vertex bytes as uploaded to the GPU
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index bytes as uploaded to the GPU
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 12);
        assert_eq!(std::mem::offset_of!(Vertex, tex_coord), 24);
    }

    #[test]
    fn test_quad_counts() {
        let quad = MeshData::quad();
        assert_eq!(quad.vertices.len(), 4);
        assert_eq!(quad.indices.len(), 6);
        assert!(quad.validate().is_ok());
        assert_eq!(quad.vertex_bytes().len(), 4 * 32);
        assert_eq!(quad.index_bytes().len(), 6 * 4);
    }

    #[test]
    fn test_cube_winding_faces_outward() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.validate().is_ok());

        for triangle in cube.indices.chunks(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| Vec3::from(cube.vertices[i as usize].position));
            let face_normal = (b - a).cross(&(c - a)).normalize();
            let declared = Vec3::from(cube.vertices[triangle[0] as usize].normal);
            assert_relative_eq!(face_normal, declared, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_validate_rejects_bad_indices() {
        let mut mesh = MeshData::quad();
        mesh.indices.push(7);
        assert!(mesh.validate().is_err());

        mesh.indices.extend_from_slice(&[0, 1]);
        assert!(mesh.validate().unwrap_err().contains("out of range"));
    }

    #[test]
    fn test_empty_mesh() {
        assert!(MeshData::default().is_empty());
        assert!(!MeshData::quad().is_empty());
    }
}
