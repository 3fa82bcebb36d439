//! Asset loading for the viewer: OBJ meshes and PNG textures

use std::path::Path;

use orbit_render::prelude::{MeshData, Vertex};
use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// The OBJ file could not be parsed
    #[cfg(feature = "obj")]
    #[error("Failed to load OBJ {path}: {source}")]
    Obj {
        /// File that failed
        path: String,
        /// Parser error
        source: tobj::LoadError,
    },

    /// The image could not be decoded
    #[error("Failed to load image {path}: {source}")]
    Image {
        /// File that failed
        path: String,
        /// Decoder error
        source: image::ImageError,
    },

    /// The file decoded but holds nothing drawable
    #[error("{0} contains no geometry")]
    Empty(String),

    /// OBJ support was compiled out
    #[error("OBJ loading is disabled; rebuild with the `obj` feature")]
    ObjDisabled,
}

/// Decoded RGBA8 image
pub struct RgbaImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Tightly packed RGBA8 texels
    pub pixels: Vec<u8>,
}

/// Load every mesh of an OBJ file, triangulated with a single index stream
#[cfg(feature = "obj")]
pub fn load_obj(path: &Path) -> Result<Vec<MeshData>, AssetError> {
    let display = path.display().to_string();
    let options = tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ..Default::default()
    };
    let (models, _materials) = tobj::load_obj(path, &options).map_err(|source| AssetError::Obj {
        path: display.clone(),
        source,
    })?;

    let meshes: Vec<MeshData> = models
        .iter()
        .map(|model| convert_mesh(&model.mesh))
        .filter(|mesh| !mesh.is_empty())
        .collect();
    if meshes.is_empty() {
        return Err(AssetError::Empty(display));
    }

    log::info!("Loaded {} mesh(es) from {}", meshes.len(), display);
    Ok(meshes)
}

/// OBJ loading stub when the `obj` feature is off
#[cfg(not(feature = "obj"))]
pub fn load_obj(_path: &Path) -> Result<Vec<MeshData>, AssetError> {
    Err(AssetError::ObjDisabled)
}

#[cfg(feature = "obj")]
fn convert_mesh(mesh: &tobj::Mesh) -> MeshData {
    let vertex_count = mesh.positions.len() / 3;
    let vertices = (0..vertex_count)
        .map(|i| Vertex {
            position: [mesh.positions[3 * i], mesh.positions[3 * i + 1], mesh.positions[3 * i + 2]],
            normal: if mesh.normals.len() >= 3 * (i + 1) {
                [mesh.normals[3 * i], mesh.normals[3 * i + 1], mesh.normals[3 * i + 2]]
            } else {
                [0.0, 1.0, 0.0]
            },
            // OBJ texture space has V pointing up
            tex_coord: if mesh.texcoords.len() >= 2 * (i + 1) {
                [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]]
            } else {
                [0.0, 0.0]
            },
        })
        .collect();

    MeshData::new(vertices, mesh.indices.clone())
}

/// Decode an image file into RGBA8
pub fn load_rgba(path: &Path) -> Result<RgbaImage, AssetError> {
    let image = image::open(path)
        .map_err(|source| AssetError::Image {
            path: path.display().to_string(),
            source,
        })?
        .to_rgba8();
    let (width, height) = image.dimensions();

    log::info!("Loaded {}x{} texture from {}", width, height, path.display());
    Ok(RgbaImage {
        width,
        height,
        pixels: image.into_raw(),
    })
}

/// Scale factor that fits `meshes` into a cube of side `target_extent`
///
/// Returns 1.0 for degenerate input.
pub fn fit_scale(meshes: &[MeshData], target_extent: f32) -> f32 {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for vertex in meshes.iter().flat_map(|mesh| &mesh.vertices) {
        for axis in 0..3 {
            min[axis] = min[axis].min(vertex.position[axis]);
            max[axis] = max[axis].max(vertex.position[axis]);
        }
    }

    let extent = (0..3).map(|axis| max[axis] - min[axis]).fold(0.0_f32, f32::max);
    if extent.is_finite() && extent > f32::EPSILON {
        target_extent / extent
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_scale() {
        let cube = MeshData::cube();
        let extent = cube.vertices.iter().map(|v| v.position[0]).fold(f32::MIN, f32::max)
            - cube.vertices.iter().map(|v| v.position[0]).fold(f32::MAX, f32::min);

        assert_relative_eq!(fit_scale(&[cube], 2.0 * extent), 2.0);
    }

    #[test]
    fn test_fit_scale_degenerate() {
        assert_relative_eq!(fit_scale(&[], 4.0), 1.0);
    }

    #[cfg(feature = "obj")]
    #[test]
    fn test_convert_flips_v_and_fills_normals() {
        let mesh = tobj::Mesh {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            texcoords: vec![0.0, 0.25, 1.0, 0.0, 0.0, 1.0],
            indices: vec![0, 1, 2],
            ..Default::default()
        };

        let data = convert_mesh(&mesh);
        assert_eq!(data.vertices.len(), 3);
        assert_eq!(data.indices, vec![0, 1, 2]);
        assert_relative_eq!(data.vertices[0].tex_coord[1], 0.75);
        assert_eq!(data.vertices[2].normal, [0.0, 1.0, 0.0]);
        assert!(data.validate().is_ok());
    }
}
