//! Loading of background meshes and cutter surfaces from Gmsh MSH files.
use crate::connectivity::{Connectivity, Hex8Connectivity, Tri3d3Connectivity};
use crate::mesh::{HexMesh, Mesh, TriangleMesh3d};
use eyre::{eyre, Context};
use nalgebra::Point3;
use std::path::Path;
use xfluid_geometry::surface::TriangulatedSurface;

/// Loads a [`Mesh`] from a Gmsh MSH file at the given path.
pub fn load_msh_from_file<C, P: AsRef<Path>>(file_path: P) -> eyre::Result<Mesh<C>>
where
    C: MshConnectivity,
{
    let file_path = file_path.as_ref();
    let msh_bytes =
        std::fs::read(file_path).wrap_err_with(|| format!("failed to read file {}", file_path.display()))?;
    load_msh_from_bytes(&msh_bytes).wrap_err("failed to load mesh from msh file")
}

/// Loads a [`Mesh`] by parsing the given bytes as a Gmsh MSH file.
pub fn load_msh_from_bytes<C>(bytes: &[u8]) -> eyre::Result<Mesh<C>>
where
    C: MshConnectivity,
{
    let mut msh_file = mshio::parse_msh_bytes(bytes).map_err(|e| eyre!("failed to parse msh file: {}", e))?;

    let msh_nodes = msh_file
        .data
        .nodes
        .take()
        .ok_or(eyre!("MSH file does not contain nodes"))?;
    let msh_elements = msh_file
        .data
        .elements
        .take()
        .ok_or(eyre!("MSH file does not contain elements"))?;

    if !msh_elements
        .element_blocks
        .iter()
        .any(|block| element_block_matches_connectivity::<C, _>(block))
    {
        return Err(eyre!(
            "MSH file does not contain an element block of the requested type ({:?} of dim {})",
            C::msh_element_type(),
            C::reference_dim()
        ));
    }

    let mut vertices = Vec::new();
    for node_block in &msh_nodes.node_blocks {
        vertices.extend(vertices_from_node_block(node_block)?);
    }

    let mut connectivity = Vec::new();
    for element_block in &msh_elements.element_blocks {
        connectivity.extend(connectivity_from_element_block::<C, _>(element_block)?);
    }

    if let Some(&max_index) = connectivity.iter().flat_map(|c| c.vertex_indices()).max() {
        if max_index >= vertices.len() {
            return Err(eyre!(
                "element refers to node {} but the file contains {} nodes",
                max_index + 1,
                vertices.len()
            ));
        }
    }

    Ok(Mesh::from_vertices_and_connectivity(vertices, connectivity))
}

/// Loads a background mesh of trilinear hexahedra.
pub fn load_hex_mesh_from_file(file_path: impl AsRef<Path>) -> eyre::Result<HexMesh> {
    load_msh_from_file::<Hex8Connectivity, _>(file_path)
}

/// Loads a triangulated cutter surface.
pub fn load_cutter_surface_from_file(file_path: impl AsRef<Path>) -> eyre::Result<TriangulatedSurface> {
    let mesh: TriangleMesh3d = load_msh_from_file(file_path)?;
    Ok(mesh.to_surface())
}

fn vertices_from_node_block<F, I>(node_block: &mshio::NodeBlock<u64, I, F>) -> eyre::Result<Vec<Point3<f64>>>
where
    F: mshio::MshFloatT,
    I: mshio::MshIntT,
{
    if node_block.node_tags.is_some() {
        return Err(eyre!("node block tags are not consecutive in msh file"));
    }

    let coordinate = |value: F| {
        value
            .to_f64()
            .ok_or_else(|| eyre!("failed to convert node coordinate to f64"))
    };
    node_block
        .nodes
        .iter()
        .map(|node| Ok(Point3::new(coordinate(node.x)?, coordinate(node.y)?, coordinate(node.z)?)))
        .collect()
}

fn connectivity_from_element_block<C, I>(element_block: &mshio::ElementBlock<u64, I>) -> eyre::Result<Vec<C>>
where
    C: MshConnectivity,
    I: mshio::MshIntT,
{
    if element_block.element_tags.is_some() {
        return Err(eyre!("element block tags are not consecutive in msh file"));
    }

    // Blocks of other element types (e.g. boundary facets) are skipped
    if !element_block_matches_connectivity::<C, _>(element_block) {
        return Ok(Vec::new());
    }

    let requested_nodes = C::msh_element_type()
        .nodes()
        .map_err(|_| eyre!("unimplemented element type requested"))?;
    element_block
        .elements
        .iter()
        .map(|element| {
            if element.nodes.len() < requested_nodes {
                Err(eyre!("not enough nodes to initialize connectivity"))
            } else {
                C::try_connectivity_from_msh_element(element)
            }
        })
        .collect()
}

fn element_block_matches_connectivity<C, I>(element_block: &mshio::ElementBlock<u64, I>) -> bool
where
    C: MshConnectivity,
    I: mshio::MshIntT,
{
    element_block.element_type == C::msh_element_type()
        && element_block.entity_dim.to_usize() == Some(C::reference_dim())
}

/// Converts MSH node tags (one-based) to zero-based vertex indices.
fn node_indices<const N: usize>(element: &mshio::Element<u64>) -> eyre::Result<[usize; N]> {
    let mut indices = [0; N];
    for (index, &tag) in indices.iter_mut().zip(&element.nodes) {
        *index = usize::try_from(tag)
            .ok()
            .and_then(|tag| tag.checked_sub(1))
            .ok_or_else(|| eyre!("invalid node tag {tag} in element {}", element.element_tag))?;
    }
    Ok(indices)
}

/// Connectivity types that can be read from MSH element blocks.
pub trait MshConnectivity
where
    Self: Sized + Connectivity,
{
    fn msh_element_type() -> mshio::ElementType;
    /// Entity dimension of the element blocks holding this connectivity.
    fn reference_dim() -> usize;
    fn try_connectivity_from_msh_element(element: &mshio::Element<u64>) -> eyre::Result<Self>;
}

impl MshConnectivity for Hex8Connectivity {
    fn msh_element_type() -> mshio::ElementType {
        mshio::ElementType::Hex8
    }

    fn reference_dim() -> usize {
        3
    }

    fn try_connectivity_from_msh_element(element: &mshio::Element<u64>) -> eyre::Result<Self> {
        Ok(Self(node_indices(element)?))
    }
}

impl MshConnectivity for Tri3d3Connectivity {
    fn msh_element_type() -> mshio::ElementType {
        mshio::ElementType::Tri3
    }

    fn reference_dim() -> usize {
        2
    }

    fn try_connectivity_from_msh_element(element: &mshio::Element<u64>) -> eyre::Result<Self> {
        Ok(Self(node_indices(element)?))
    }
}
