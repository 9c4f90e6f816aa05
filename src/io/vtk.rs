//! Legacy VTK output of the background mesh and of the interface boundary cells.
use crate::cut::CutWizard;
use crate::dofset::GlobalDofMap;
use crate::mesh::HexMesh;
use crate::nalgebra::{DVector, Vector3};
use eyre::{eyre, WrapErr};
use std::path::Path;
use vtkio::model::{
    Attribute, Attributes, ByteOrder, CellType, Cells, DataArray, DataSet, ElementType, IOBuffer, Piece,
    UnstructuredGridPiece, Version, VertexNumbers, Vtk,
};

fn scalars(name: &str, data: Vec<f64>) -> Attribute {
    Attribute::DataArray(DataArray {
        name: name.to_string(),
        elem: ElementType::Scalars {
            num_comp: 1,
            lookup_table: None,
        },
        data: IOBuffer::from(data),
    })
}

fn vectors(name: &str, data: Vec<f64>) -> Attribute {
    Attribute::DataArray(DataArray {
        name: name.to_string(),
        elem: ElementType::Vectors,
        data: IOBuffer::from(data),
    })
}

fn to_u32(index: usize) -> eyre::Result<u32> {
    u32::try_from(index).map_err(|_| eyre!("vertex index {index} does not fit into the VTK index type"))
}

/// Builds an unstructured grid and exports it as legacy VTK.
struct UnstructuredGridBuilder {
    points: Vec<f64>,
    vertices: Vec<u32>,
    types: Vec<CellType>,
    data: Attributes,
}

impl UnstructuredGridBuilder {
    fn new() -> Self {
        Self {
            points: Vec::new(),
            vertices: Vec::new(),
            types: Vec::new(),
            data: Attributes::new(),
        }
    }

    fn push_point(&mut self, x: &[f64]) {
        self.points.extend_from_slice(&x[..3]);
    }

    fn push_cell(&mut self, cell_type: CellType, indices: &[usize]) -> eyre::Result<()> {
        self.vertices.push(to_u32(indices.len())?);
        for &index in indices {
            self.vertices.push(to_u32(index)?);
        }
        self.types.push(cell_type);
        Ok(())
    }

    fn export(self, title: &str, path: &Path) -> eyre::Result<()> {
        if let Some(directory) = path.parent() {
            std::fs::create_dir_all(directory)
                .wrap_err_with(|| format!("failed to create output directory {}", directory.display()))?;
        }
        let num_cells = self.types.len();
        let piece = UnstructuredGridPiece {
            points: self.points.into(),
            cells: Cells {
                cell_verts: VertexNumbers::Legacy {
                    num_cells: u32::try_from(num_cells).map_err(|_| eyre!("too many cells for legacy VTK"))?,
                    vertices: self.vertices,
                },
                types: self.types,
            },
            data: self.data,
        };
        Vtk {
            version: Version { major: 4, minor: 1 },
            title: title.to_string(),
            byte_order: ByteOrder::BigEndian,
            data: DataSet::UnstructuredGrid {
                meta: None,
                pieces: vec![Piece::Inline(Box::new(piece))],
            },
            file_path: None,
        }
        .export(path)
        .map_err(|err| eyre!("failed to export VTK file {}: {}", path.display(), err))
    }
}

/// Writes the (displaced) background mesh with the velocity and pressure of the standard
/// dof-set of every node. Nodes without a standard dof-set get zero values.
pub fn write_background_vtk(
    path: impl AsRef<Path>,
    mesh: &HexMesh,
    displacement: Option<&[Vector3<f64>]>,
    dofmap: &GlobalDofMap,
    solution: &DVector<f64>,
) -> eyre::Result<()> {
    let mut builder = UnstructuredGridBuilder::new();
    for (node, vertex) in mesh.vertices().iter().enumerate() {
        let x = match displacement {
            Some(displacement) => vertex + displacement[node],
            None => *vertex,
        };
        builder.push_point(x.coords.as_slice());
    }
    for cell in mesh.connectivity() {
        builder.push_cell(CellType::Hexahedron, &cell.0)?;
    }

    let mut velocity = Vec::with_capacity(3 * mesh.num_vertices());
    let mut pressure = Vec::with_capacity(mesh.num_vertices());
    let mut num_dofsets = Vec::with_capacity(mesh.num_vertices());
    for node in 0..mesh.num_vertices() {
        match dofmap.standard_slot(node) {
            Some(slot) => {
                velocity.extend((0..3).map(|c| solution[GlobalDofMap::dof(slot, c)]));
                pressure.push(solution[GlobalDofMap::dof(slot, 3)]);
            }
            None => {
                velocity.extend([0.0; 3]);
                pressure.push(0.0);
            }
        }
        num_dofsets.push(dofmap.num_dofsets(node) as f64);
    }
    builder.data.point.push(vectors("velocity", velocity));
    builder.data.point.push(scalars("pressure", pressure));
    builder.data.point.push(scalars("num_dofsets", num_dofsets));

    let path = path.as_ref();
    builder.export("xfluid background mesh", path)
}

/// Writes the boundary cells of a cut as triangles with their normals and coupling ids.
pub fn write_boundary_cells_vtk(path: impl AsRef<Path>, wizard: &CutWizard) -> eyre::Result<()> {
    let mut builder = UnstructuredGridBuilder::new();
    let mut normals = Vec::new();
    let mut couplings = Vec::new();
    for cell in wizard.boundary_cells() {
        let first = builder.points.len() / 3;
        for vertex in &cell.vertices {
            builder.push_point(vertex.coords.as_slice());
        }
        let indices: Vec<usize> = (first..first + cell.vertices.len()).collect();
        builder.push_cell(CellType::Triangle, &indices)?;
        normals.extend_from_slice(cell.normal.as_slice());
        couplings.push(cell.coupling as f64);
    }
    builder.data.cell.push(vectors("normal", normals));
    builder.data.cell.push(scalars("coupling", couplings));

    let path = path.as_ref();
    builder.export("xfluid boundary cells", path)
}
