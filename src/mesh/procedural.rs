//! Procedural generation of structured background meshes.
use crate::connectivity::Hex8Connectivity;
use crate::mesh::HexMesh;
use nalgebra::Point3;

/// Generates a uniform hexahedral mesh of the box `[min, max]` with `cells[d]` cells along
/// dimension `d`.
///
/// Vertex `(i, j, k)` of the structured grid has index `(nvx * nvy) * k + nvx * j + i`, where
/// `nvx` and `nvy` are the number of vertices along the first two dimensions.
pub fn create_box_hex_mesh(min: Point3<f64>, max: Point3<f64>, cells: [usize; 3]) -> HexMesh {
    if cells.iter().any(|&n| n == 0) {
        return HexMesh::from_vertices_and_connectivity(Vec::new(), Vec::new());
    }

    let [num_cells_x, num_cells_y, num_cells_z] = cells;
    let num_vertices_x = num_cells_x + 1;
    let num_vertices_y = num_cells_y + 1;
    let num_vertices_z = num_cells_z + 1;
    let extents = max - min;
    let cell_size = [
        extents.x / num_cells_x as f64,
        extents.y / num_cells_y as f64,
        extents.z / num_cells_z as f64,
    ];

    let to_global_vertex_index =
        |i: usize, j: usize, k: usize| (num_vertices_x * num_vertices_y) * k + num_vertices_x * j + i;

    let mut vertices = Vec::with_capacity(num_vertices_x * num_vertices_y * num_vertices_z);
    for k in 0..num_vertices_z {
        for j in 0..num_vertices_y {
            for i in 0..num_vertices_x {
                // Snap the last layer exactly onto the box boundary
                let coord = |idx: usize, n: usize, d: usize| {
                    if idx == n {
                        max[d]
                    } else {
                        min[d] + idx as f64 * cell_size[d]
                    }
                };
                vertices.push(Point3::new(
                    coord(i, num_cells_x, 0),
                    coord(j, num_cells_y, 1),
                    coord(k, num_cells_z, 2),
                ));
            }
        }
    }

    let mut cells = Vec::with_capacity(num_cells_x * num_cells_y * num_cells_z);
    for k in 0..num_cells_z {
        for j in 0..num_cells_y {
            for i in 0..num_cells_x {
                let idx = &to_global_vertex_index;
                cells.push(Hex8Connectivity([
                    idx(i, j, k),
                    idx(i + 1, j, k),
                    idx(i + 1, j + 1, k),
                    idx(i, j + 1, k),
                    idx(i, j, k + 1),
                    idx(i + 1, j, k + 1),
                    idx(i + 1, j + 1, k + 1),
                    idx(i, j + 1, k + 1),
                ]));
            }
        }
    }

    HexMesh::from_vertices_and_connectivity(vertices, cells)
}

pub fn create_unit_box_uniform_hex_mesh(cells_per_dim: usize) -> HexMesh {
    create_box_hex_mesh(
        Point3::origin(),
        Point3::new(1.0, 1.0, 1.0),
        [cells_per_dim; 3],
    )
}
