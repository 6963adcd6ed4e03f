//! OBJ model loading
//!
//! Loads an OBJ file with tobj, flattens its meshes into the engine's
//! vertex layout, and reports each material's diffuse texture name so the
//! caller can upload textures and resolve them to registry indices.
//! Meshes without a material, or whose material has no diffuse texture,
//! fall back to texture index 0.

use std::path::Path;

use crate::render::mesh::MeshData;
use crate::render::vulkan::vertex_layout::Vertex;

use super::AssetError;

/// One mesh from a model file, not yet bound to a texture index.
pub struct MeshSource {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material_id: Option<usize>,
}

/// A loaded model: mesh geometry plus per-material diffuse texture names.
pub struct ObjModel {
    pub meshes: Vec<MeshSource>,
    /// Diffuse texture file name per material, `None` when the material
    /// declares none
    pub diffuse_textures: Vec<Option<String>>,
}

/// Load an OBJ file and its materials.
pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<ObjModel, AssetError> {
    let path = path.as_ref();
    let (models, materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )?;
    let materials = materials?;

    let diffuse_textures = materials
        .iter()
        .map(|material| {
            material
                .diffuse_texture
                .as_ref()
                .filter(|name| !name.is_empty())
                .cloned()
        })
        .collect();

    let meshes = models
        .iter()
        .map(|model| {
            mesh_source_from_raw(
                &model.mesh.positions,
                &model.mesh.normals,
                &model.mesh.texcoords,
                &model.mesh.indices,
                model.mesh.material_id,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    log::info!(
        "Loaded model {}: {} meshes, {} materials",
        path.display(),
        meshes.len(),
        materials.len()
    );

    Ok(ObjModel {
        meshes,
        diffuse_textures,
    })
}

/// Assemble interleaved vertices from tobj's parallel attribute arrays.
///
/// Missing normals or texcoords are zero-filled rather than rejected, as
/// OBJ files commonly omit them.
pub fn mesh_source_from_raw(
    positions: &[f32],
    normals: &[f32],
    texcoords: &[f32],
    indices: &[u32],
    material_id: Option<usize>,
) -> Result<MeshSource, AssetError> {
    if positions.len() % 3 != 0 {
        return Err(AssetError::Malformed(format!(
            "position array length {} is not a multiple of 3",
            positions.len()
        )));
    }
    let vertex_count = positions.len() / 3;

    let vertices = (0..vertex_count)
        .map(|i| {
            let normal = if normals.len() >= (i + 1) * 3 {
                [normals[i * 3], normals[i * 3 + 1], normals[i * 3 + 2]]
            } else {
                [0.0; 3]
            };
            let uv = if texcoords.len() >= (i + 1) * 2 {
                // OBJ V coordinate is bottom-up; Vulkan samples top-down
                [texcoords[i * 2], 1.0 - texcoords[i * 2 + 1]]
            } else {
                [0.0; 2]
            };
            Vertex {
                position: [positions[i * 3], positions[i * 3 + 1], positions[i * 3 + 2]],
                colour: [1.0, 1.0, 1.0],
                normal,
                uv,
            }
        })
        .collect();

    Ok(MeshSource {
        vertices,
        indices: indices.to_vec(),
        material_id,
    })
}

/// Bind mesh sources to texture registry indices.
///
/// `material_textures[m]` is the registry index for material `m`; meshes
/// with no material or an unmapped one use the default texture at 0.
pub fn resolve_texture_ids(
    meshes: Vec<MeshSource>,
    material_textures: &[usize],
) -> Vec<MeshData> {
    meshes
        .into_iter()
        .map(|source| {
            let texture_id = source
                .material_id
                .and_then(|m| material_textures.get(m).copied())
                .unwrap_or(0);
            MeshData {
                vertices: source.vertices,
                indices: source.indices,
                texture_id,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaves_attributes() {
        let positions = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let normals = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let texcoords = [0.25, 0.25, 0.5, 1.0];
        let indices = [0, 1, 0];

        let mesh =
            mesh_source_from_raw(&positions, &normals, &texcoords, &indices, Some(1)).unwrap();

        assert_eq!(mesh.vertices.len(), 2);
        assert_eq!(mesh.vertices[0].position, [0.0, 1.0, 2.0]);
        assert_eq!(mesh.vertices[1].normal, [0.0, 0.0, 1.0]);
        // V is flipped
        assert_eq!(mesh.vertices[0].uv, [0.25, 0.75]);
        assert_eq!(mesh.vertices[1].uv, [0.5, 0.0]);
        assert_eq!(mesh.indices, vec![0, 1, 0]);
        assert_eq!(mesh.material_id, Some(1));
    }

    #[test]
    fn missing_normals_and_uvs_are_zero_filled() {
        let positions = [0.0, 0.0, 0.0];
        let mesh = mesh_source_from_raw(&positions, &[], &[], &[0], None).unwrap();
        assert_eq!(mesh.vertices[0].normal, [0.0; 3]);
        assert_eq!(mesh.vertices[0].uv, [0.0; 2]);
    }

    #[test]
    fn ragged_positions_are_rejected() {
        let result = mesh_source_from_raw(&[0.0, 1.0], &[], &[], &[], None);
        assert!(matches!(result, Err(AssetError::Malformed(_))));
    }

    #[test]
    fn unmaterialed_meshes_fall_back_to_default_texture() {
        let meshes = vec![
            MeshSource {
                vertices: vec![],
                indices: vec![],
                material_id: None,
            },
            MeshSource {
                vertices: vec![],
                indices: vec![],
                material_id: Some(0),
            },
            MeshSource {
                vertices: vec![],
                indices: vec![],
                material_id: Some(7),
            },
        ];

        let resolved = resolve_texture_ids(meshes, &[3]);
        assert_eq!(resolved[0].texture_id, 0);
        assert_eq!(resolved[1].texture_id, 3);
        // Out-of-range material also falls back
        assert_eq!(resolved[2].texture_id, 0);
    }
}
