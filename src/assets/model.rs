use std::collections::HashMap;
use std::sync::Arc;

use glam::{Quat, Vec3, Vec4};
use gltf::{buffer, image as gltf_image, mesh::Mode, Document, Gltf};
use log::{debug, info, warn};

use super::{join_uri, AssetSource, LoadError};
use crate::geometry::Geometry;
use crate::materials::{Material, StandardMaterial, TextureImage};
use crate::scene::{Mesh, NodeKind, NodeTree, Transform};

/// Scene subtree decoded from a glTF file, ready to attach.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub name: String,
    pub tree: NodeTree,
    pub texture_count: usize,
}

impl LoadedModel {
    pub fn mesh_count(&self) -> usize {
        self.tree.mesh_count()
    }
}

/// Loads a `.gltf` (with external or embedded buffers) or `.glb` file.
///
/// External buffers and images are resolved relative to `path` through the
/// same source. The returned tree is rooted at a group named after the file.
pub async fn load_model<S>(source: &S, path: &str) -> Result<LoadedModel, LoadError>
where
    S: AssetSource + ?Sized,
{
    let bytes = source.read(path).await?;
    let Gltf { document, blob } = Gltf::from_slice(&bytes).map_err(|source| LoadError::Gltf {
        path: path.to_string(),
        source,
    })?;

    let mut buffers = Vec::new();
    for gltf_buffer in document.buffers() {
        let data = match gltf_buffer.source() {
            buffer::Source::Bin => blob
                .clone()
                .ok_or_else(|| LoadError::MissingData(format!("{path}: missing GLB binary chunk")))?,
            buffer::Source::Uri(uri) => read_uri(source, path, uri).await?,
        };
        if data.len() < gltf_buffer.length() {
            return Err(LoadError::MissingData(format!(
                "{path}: buffer {} holds {} bytes, expected {}",
                gltf_buffer.index(),
                data.len(),
                gltf_buffer.length()
            )));
        }
        buffers.push(data);
    }

    let mut images = Vec::new();
    for image in document.images() {
        let data = match image.source() {
            gltf_image::Source::View { view, .. } => {
                let start = view.offset();
                let end = start + view.length();
                buffers
                    .get(view.buffer().index())
                    .and_then(|data| data.get(start..end))
                    .ok_or_else(|| {
                        LoadError::MissingData(format!(
                            "{path}: image {} points outside its buffer",
                            image.index()
                        ))
                    })?
                    .to_vec()
            }
            gltf_image::Source::Uri { uri, .. } => read_uri(source, path, uri).await?,
        };
        images.push(data);
    }

    let model = ModelBuilder::new(&buffers, &images).build(path, &document)?;
    info!(
        "loaded model {} ({} meshes, {} textures)",
        model.name,
        model.mesh_count(),
        model.texture_count
    );
    Ok(model)
}

async fn read_uri<S>(source: &S, base: &str, uri: &str) -> Result<Vec<u8>, LoadError>
where
    S: AssetSource + ?Sized,
{
    if uri.starts_with("data:") {
        return Err(LoadError::Unsupported(format!(
            "{base}: embedded data URIs are not supported"
        )));
    }
    source.read(&join_uri(base, uri)).await
}

/// File stem of the model path, e.g. `FlightHelmet` for
/// `models/FlightHelmet/glTF/FlightHelmet.gltf`.
fn model_name(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    if stem.is_empty() {
        "model".to_string()
    } else {
        stem.to_string()
    }
}

struct ModelBuilder<'a> {
    buffers: &'a [Vec<u8>],
    images: &'a [Vec<u8>],
    textures: HashMap<(usize, bool), Arc<TextureImage>>,
    geometries: HashMap<(usize, usize), Arc<Geometry>>,
}

impl<'a> ModelBuilder<'a> {
    fn new(buffers: &'a [Vec<u8>], images: &'a [Vec<u8>]) -> Self {
        Self {
            buffers,
            images,
            textures: HashMap::new(),
            geometries: HashMap::new(),
        }
    }

    fn build(mut self, path: &str, document: &Document) -> Result<LoadedModel, LoadError> {
        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| LoadError::MissingData(format!("{path}: no scenes")))?;

        let mut root = NodeTree::group(model_name(path));
        for node in scene.nodes() {
            root.children.push(self.node(&node)?);
        }
        Ok(LoadedModel {
            name: root.name.clone(),
            tree: root,
            texture_count: self.textures.len(),
        })
    }

    fn node(&mut self, node: &gltf::Node<'_>) -> Result<NodeTree, LoadError> {
        let (translation, rotation, scale) = node.transform().decomposed();
        let name = node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node{}", node.index()));
        let mut tree = NodeTree::group(name);
        tree.transform = Transform::from_trs(
            Vec3::from(translation),
            Quat::from_array(rotation),
            Vec3::from(scale),
        );

        if let Some(mesh) = node.mesh() {
            let mesh_name = mesh
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("mesh{}", mesh.index()));
            for primitive in mesh.primitives() {
                if primitive.mode() != Mode::Triangles {
                    warn!(
                        "skipping {mesh_name} primitive {}: {:?} is not supported",
                        primitive.index(),
                        primitive.mode()
                    );
                    continue;
                }
                let geometry = self.geometry(mesh.index(), &primitive)?;
                let material = self.material(&primitive.material())?;
                tree.children.push(NodeTree {
                    name: mesh_name.clone(),
                    transform: Transform::default(),
                    kind: NodeKind::Mesh(Mesh::new(geometry, material)),
                    children: Vec::new(),
                });
            }
        }

        for child in node.children() {
            tree.children.push(self.node(&child)?);
        }
        Ok(tree)
    }

    fn geometry(
        &mut self,
        mesh_index: usize,
        primitive: &gltf::Primitive<'_>,
    ) -> Result<Arc<Geometry>, LoadError> {
        let key = (mesh_index, primitive.index());
        if let Some(geometry) = self.geometries.get(&key) {
            return Ok(Arc::clone(geometry));
        }

        let buffers = self.buffers;
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .ok_or_else(|| {
                LoadError::MissingData(format!(
                    "mesh {mesh_index} primitive {} has no positions",
                    primitive.index()
                ))
            })?
            .collect();
        let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
        let uvs: Option<Vec<[f32; 2]>> = reader
            .read_tex_coords(0)
            .map(|coords| coords.into_f32().collect());
        let indices: Option<Vec<u32>> = reader.read_indices().map(|i| i.into_u32().collect());

        if let Some(indices) = &indices {
            if indices.iter().any(|&i| i as usize >= positions.len()) {
                return Err(LoadError::MissingData(format!(
                    "mesh {mesh_index} primitive {} indexes past its vertices",
                    primitive.index()
                )));
            }
        }

        let geometry = Arc::new(Geometry::from_attributes(
            &positions,
            normals.as_deref(),
            uvs.as_deref(),
            indices,
        ));
        debug!(
            "mesh {mesh_index} primitive {}: {} vertices, {} indices",
            primitive.index(),
            geometry.vertex_count(),
            geometry.indices.len()
        );
        self.geometries.insert(key, Arc::clone(&geometry));
        Ok(geometry)
    }

    fn material(&mut self, material: &gltf::Material<'_>) -> Result<Material, LoadError> {
        let pbr = material.pbr_metallic_roughness();
        let base_color_texture = match pbr.base_color_texture() {
            Some(info) => Some(self.texture(&info.texture(), true)?),
            None => None,
        };
        let metallic_roughness_texture = match pbr.metallic_roughness_texture() {
            Some(info) => Some(self.texture(&info.texture(), false)?),
            None => None,
        };
        Ok(Material::Standard(StandardMaterial {
            base_color: Vec4::from(pbr.base_color_factor()),
            base_color_texture,
            metallic: pbr.metallic_factor(),
            roughness: pbr.roughness_factor(),
            metallic_roughness_texture,
            ..StandardMaterial::default()
        }))
    }

    fn texture(
        &mut self,
        texture: &gltf::Texture<'_>,
        srgb: bool,
    ) -> Result<Arc<TextureImage>, LoadError> {
        let index = texture.source().index();
        if let Some(image) = self.textures.get(&(index, srgb)) {
            return Ok(Arc::clone(image));
        }
        let bytes = self
            .images
            .get(index)
            .ok_or_else(|| LoadError::MissingData(format!("image {index} was not loaded")))?;
        let decoded = image::load_from_memory(bytes)
            .map_err(|source| LoadError::Decode {
                path: format!("image {index}"),
                source,
            })?
            .to_rgba8();
        let image = Arc::new(TextureImage {
            width: decoded.width(),
            height: decoded.height(),
            rgba: decoded.into_raw(),
            srgb,
        });
        self.textures.insert((index, srgb), Arc::clone(&image));
        Ok(image)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Minimal assets shared by the loader and application tests.

    use std::io::Cursor;

    use image::{ImageFormat, Rgba, RgbaImage};

    /// Solid-colour square PNG.
    pub fn png_bytes(size: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(size, size, Rgba(color));
        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, ImageFormat::Png)
            .expect("encode png");
        bytes.into_inner()
    }

    /// One triangle with positions and indices in a separate `.bin`.
    pub fn triangle_gltf(bin_uri: &str, with_texture: Option<&str>) -> String {
        let (materials, images) = match with_texture {
            Some(uri) => (
                r#""materials": [{"pbrMetallicRoughness": {"baseColorFactor": [1, 0.5, 0.25, 1], "baseColorTexture": {"index": 0}, "metallicFactor": 0.75, "roughnessFactor": 0.2}}],
                   "textures": [{"source": 0}],"#
                    .to_string(),
                format!(r#""images": [{{"uri": "{uri}"}}],"#),
            ),
            None => (String::new(), String::new()),
        };
        let material_ref = if with_texture.is_some() {
            r#", "material": 0"#
        } else {
            ""
        };
        format!(
            r#"{{
  "asset": {{"version": "2.0"}},
  "scene": 0,
  "scenes": [{{"nodes": [0]}}],
  "nodes": [{{"name": "Visor", "mesh": 0, "translation": [0, 1, 0], "children": [1]}}, {{"name": "Strap", "mesh": 0}}],
  "meshes": [{{"name": "VisorMesh", "primitives": [{{"attributes": {{"POSITION": 0}}, "indices": 1{material_ref}}}]}}],
  {materials}
  {images}
  "buffers": [{{"uri": "{bin_uri}", "byteLength": 44}}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 36, "byteLength": 6}}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0]}},
    {{"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}}
  ]
}}"#
        )
    }

    /// Positions `(0,0,0) (1,0,0) (0,1,0)` followed by u16 indices `0 1 2`,
    /// padded to 44 bytes.
    pub fn triangle_bin() -> Vec<u8> {
        let mut bytes = Vec::with_capacity(44);
        for value in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        for index in [0u16, 1, 2] {
            bytes.extend_from_slice(&index.to_le_bytes());
        }
        bytes.extend_from_slice(&[0, 0]);
        bytes
    }
}
