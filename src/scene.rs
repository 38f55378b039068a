use std::sync::Arc;

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::camera::PerspectiveCamera;
use crate::environment::EnvironmentMap;
use crate::geometry::Geometry;
use crate::materials::Material;

/// Index of a node inside a [`SceneGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: Self = Self(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Local transform. Rotation is Euler XYZ in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
        Self {
            position: translation,
            rotation: Vec3::new(x, y, z),
            scale,
        }
    }

    pub fn quaternion(&self) -> Quat {
        Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        )
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.quaternion(), self.position)
    }
}

/// Renderable geometry with its material and shadow flags.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub geometry: Arc<Geometry>,
    pub material: Material,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl Mesh {
    pub fn new(geometry: Arc<Geometry>, material: Material) -> Self {
        Self {
            geometry,
            material,
            cast_shadow: false,
            receive_shadow: false,
        }
    }
}

/// Ground-projected skybox helper. The environment is projected onto a dome
/// of `radius` whose floor sits `height` below the projection center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Skybox {
    pub radius: f32,
    pub height: f32,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    Mesh(Mesh),
    Skybox(Skybox),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn mesh_mut(&mut self) -> Option<&mut Mesh> {
        match &mut self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }
}

/// Detached subtree produced by the loaders and attached in one go.
#[derive(Debug, Clone)]
pub struct NodeTree {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    pub children: Vec<NodeTree>,
}

impl NodeTree {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            kind: NodeKind::Group,
            children: Vec::new(),
        }
    }

    /// Total number of nodes including `self`.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(NodeTree::len).sum::<usize>()
    }

    pub fn mesh_count(&self) -> usize {
        let own = usize::from(matches!(self.kind, NodeKind::Mesh(_)));
        own + self.children.iter().map(NodeTree::mesh_count).sum::<usize>()
    }
}

/// Mesh reference resolved to world space, as consumed by the renderer.
pub struct MeshInstance<'a> {
    pub id: NodeId,
    pub mesh: &'a Mesh,
    pub world: Mat4,
}

/// Arena-backed scene tree plus the scene-wide environment slots and camera.
///
/// Nodes are never removed, so every arena entry is reachable from the root.
#[derive(Debug)]
pub struct SceneGraph {
    nodes: Vec<Node>,
    pub camera: PerspectiveCamera,
    pub environment: Option<Arc<EnvironmentMap>>,
    pub background: Option<Arc<EnvironmentMap>>,
    pub background_blurriness: f32,
    pub background_intensity: f32,
}

impl SceneGraph {
    pub fn new(camera: PerspectiveCamera) -> Self {
        let root = Node {
            name: "scene".to_string(),
            transform: Transform::default(),
            kind: NodeKind::Group,
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            camera,
            environment: None,
            background: None,
            background_blurriness: 0.0,
            background_intensity: 1.0,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// Appends a node under `parent`. Unknown parents fall back to the root.
    pub fn add(&mut self, parent: NodeId, name: impl Into<String>, kind: NodeKind) -> NodeId {
        self.add_with_transform(parent, name.into(), Transform::default(), kind)
    }

    /// Attaches a loaded subtree under `parent` and returns the id of its root.
    pub fn attach(&mut self, parent: NodeId, tree: NodeTree) -> NodeId {
        let NodeTree {
            name,
            transform,
            kind,
            children,
        } = tree;
        let id = self.add_with_transform(parent, name, transform, kind);
        for child in children {
            self.attach(id, child);
        }
        id
    }

    fn add_with_transform(
        &mut self,
        parent: NodeId,
        name: String,
        transform: Transform,
        kind: NodeKind,
    ) -> NodeId {
        let parent = if parent.0 < self.nodes.len() {
            parent
        } else {
            NodeId::ROOT
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name,
            transform,
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.name == name)
            .map(NodeId)
    }

    /// Depth-first, pre-order ids starting at the root.
    pub fn traversal_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    pub fn traverse<F>(&self, mut visit: F)
    where
        F: FnMut(NodeId, &Node),
    {
        for id in self.traversal_order() {
            visit(id, &self.nodes[id.0]);
        }
    }

    pub fn traverse_mut<F>(&mut self, mut visit: F)
    where
        F: FnMut(NodeId, &mut Node),
    {
        for id in self.traversal_order() {
            visit(id, &mut self.nodes[id.0]);
        }
    }

    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut cursor = self.node(id);
        while let Some(node) = cursor {
            matrix = node.transform.matrix() * matrix;
            cursor = node.parent.and_then(|parent| self.node(parent));
        }
        matrix
    }

    /// Every mesh with its world matrix, in traversal order.
    pub fn mesh_instances(&self) -> Vec<MeshInstance<'_>> {
        let mut instances = Vec::new();
        let mut stack = vec![(NodeId::ROOT, Mat4::IDENTITY)];
        while let Some((id, parent_world)) = stack.pop() {
            let node = &self.nodes[id.0];
            let world = parent_world * node.transform.matrix();
            if let NodeKind::Mesh(mesh) = &node.kind {
                instances.push(MeshInstance { id, mesh, world });
            }
            stack.extend(node.children.iter().rev().map(|child| (*child, world)));
        }
        instances
    }

    pub fn skybox(&self) -> Option<&Skybox> {
        self.nodes.iter().find_map(|node| match &node.kind {
            NodeKind::Skybox(skybox) => Some(skybox),
            _ => None,
        })
    }

    pub fn skybox_mut(&mut self, id: NodeId) -> Option<&mut Skybox> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Skybox(skybox) => Some(skybox),
            _ => None,
        }
    }

    /// Clears the dirty flag on every material once the renderer has seen it.
    pub fn acknowledge_material_updates(&mut self) {
        for node in &mut self.nodes {
            if let Some(mesh) = node.mesh_mut() {
                mesh.material.acknowledge_update();
            }
        }
    }
}
