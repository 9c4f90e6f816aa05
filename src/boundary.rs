//! Dirichlet and Neumann conditions on the outer boundary of the background mesh.
//!
//! Boundary parts are selected by the faces of the axis-aligned bounding box of the mesh.
//! Dirichlet conditions act on the standard dof-sets of the nodes on the selected faces;
//! later conditions override earlier ones on shared nodes.
use crate::cut::CutWizard;
use crate::dofset::GlobalDofMap;
use crate::element::{FiniteElement, Hex8Element};
use crate::error::XFluidError;
use crate::function::VectorField;
use crate::kernel::{BasisPoint, KernelContext, LocalSystem};
use crate::mesh::{HexMesh, MeshFaces};
use crate::nalgebra::{DVector, Vector3};
use crate::quadrature::{quadrilateral_gauss, Quadrature};
use serde::{Deserialize, Serialize};
use xfluid_geometry::BoundedGeometry;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoxFace {
    XMin,
    XMax,
    YMin,
    YMax,
    ZMin,
    ZMax,
}

impl BoxFace {
    pub const ALL: [BoxFace; 6] = [
        BoxFace::XMin,
        BoxFace::XMax,
        BoxFace::YMin,
        BoxFace::YMax,
        BoxFace::ZMin,
        BoxFace::ZMax,
    ];

    pub fn axis(&self) -> usize {
        match self {
            Self::XMin | Self::XMax => 0,
            Self::YMin | Self::YMax => 1,
            Self::ZMin | Self::ZMax => 2,
        }
    }

    pub fn is_max(&self) -> bool {
        matches!(self, Self::XMax | Self::YMax | Self::ZMax)
    }
}

#[derive(Debug, Clone)]
pub struct DirichletCondition {
    pub faces: Vec<BoxFace>,
    /// Constrained velocity components.
    pub components: [bool; 3],
    pub value: VectorField,
}

impl DirichletCondition {
    pub fn new(faces: impl Into<Vec<BoxFace>>, value: impl Into<VectorField>) -> Self {
        Self {
            faces: faces.into(),
            components: [true; 3],
            value: value.into(),
        }
    }

    pub fn no_slip(faces: impl Into<Vec<BoxFace>>) -> Self {
        Self::new(faces, VectorField::zero())
    }

    pub fn with_components(mut self, components: [bool; 3]) -> Self {
        self.components = components;
        self
    }
}

#[derive(Debug, Clone)]
pub struct NeumannCondition {
    pub faces: Vec<BoxFace>,
    pub traction: VectorField,
}

#[derive(Debug, Clone, Default)]
pub struct BoundaryConditions {
    pub dirichlet: Vec<DirichletCondition>,
    pub neumann: Vec<NeumannCondition>,
}

/// Nodes of the mesh lying on a face of its bounding box.
fn box_face_nodes(mesh: &HexMesh, face: BoxFace) -> Vec<usize> {
    let bounds = mesh.bounding_box();
    let tolerance = 1e-10 * bounds.max_extent().max(f64::MIN_POSITIVE);
    let axis = face.axis();
    let target = if face.is_max() { bounds.max()[axis] } else { bounds.min()[axis] };
    mesh.vertices()
        .iter()
        .enumerate()
        .filter(|(_, x)| (x[axis] - target).abs() <= tolerance)
        .map(|(i, _)| i)
        .collect()
}

impl BoundaryConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dirichlet(mut self, condition: DirichletCondition) -> Self {
        self.dirichlet.push(condition);
        self
    }

    pub fn with_neumann(mut self, faces: impl Into<Vec<BoxFace>>, traction: impl Into<VectorField>) -> Self {
        self.neumann.push(NeumannCondition {
            faces: faces.into(),
            traction: traction.into(),
        });
        self
    }

    /// Constrained dofs with their condition, in order of application.
    fn constrained_dofs<'a>(
        &'a self,
        mesh: &'a HexMesh,
        dofmap: &'a GlobalDofMap,
    ) -> impl 'a + Iterator<Item = (usize, usize, usize, &'a DirichletCondition)> {
        self.dirichlet.iter().flat_map(move |condition| {
            condition
                .faces
                .iter()
                .flat_map(move |&face| box_face_nodes(mesh, face))
                .filter_map(move |node| dofmap.standard_slot(node).map(|slot| (node, slot)))
                .flat_map(move |(node, slot)| {
                    (0..3)
                        .filter(move |&c| condition.components[c])
                        .map(move |c| (node, GlobalDofMap::dof(slot, c), c, condition))
                })
        })
    }

    /// Mask of all dofs with a Dirichlet condition.
    pub fn dirichlet_mask(&self, mesh: &HexMesh, dofmap: &GlobalDofMap) -> Vec<bool> {
        let mut mask = vec![false; dofmap.num_dofs()];
        for (_, dof, _, _) in self.constrained_dofs(mesh, dofmap) {
            mask[dof] = true;
        }
        mask
    }

    /// Writes the Dirichlet values at time `t` into `velocity`.
    pub fn apply_dirichlet_values(&self, mesh: &HexMesh, dofmap: &GlobalDofMap, t: f64, velocity: &mut DVector<f64>) {
        for (node, dof, component, condition) in self.constrained_dofs(mesh, dofmap) {
            velocity[dof] = condition.value.eval(&mesh.vertices()[node], t)[component];
        }
    }

    /// Right-hand side contributions of the tractions on the selected boundary faces.
    ///
    /// On cut elements only the parts of a face in physical volume cells contribute; each
    /// face point is assigned to the cell set of the volume cell it lies in.
    #[allow(non_snake_case)]
    pub fn neumann_systems(
        &self,
        mesh: &HexMesh,
        faces: &MeshFaces,
        displacement: Option<&[Vector3<f64>]>,
        wizard: &CutWizard,
        dofmap: &GlobalDofMap,
        context: &KernelContext,
    ) -> Result<Vec<LocalSystem>, XFluidError> {
        let mut systems = Vec::new();
        if self.neumann.is_empty() {
            return Ok(systems);
        }
        let quadrature = quadrilateral_gauss(2);
        let s = context.scaling();
        let time = context.time.evaluation_time();
        let bounds = mesh.bounding_box();
        let tolerance = 1e-10 * bounds.max_extent().max(f64::MIN_POSITIVE);

        for condition in &self.neumann {
            for face in faces.boundary() {
                let on_selected_face = condition.faces.iter().any(|box_face| {
                    let axis = box_face.axis();
                    let target = if box_face.is_max() { bounds.max()[axis] } else { bounds.min()[axis] };
                    face.nodes
                        .0
                        .iter()
                        .all(|&v| (mesh.vertices()[v][axis] - target).abs() <= tolerance)
                });
                if !on_selected_face {
                    continue;
                }
                let e = face.element;
                let element = element_of(mesh, e, displacement)?;
                let sets = dofmap.cell_sets(e);
                let mut local: Vec<Option<LocalSystem>> = vec![None; sets.len()];
                let quad = element.face(face.local_face);

                for (&w, st) in quadrature.weights().iter().zip(quadrature.points()) {
                    let xi = Hex8Element::face_to_reference(face.local_face, st);
                    let set_index = if wizard.is_cut(e) {
                        wizard
                            .volume_cell_at(e, &xi)
                            .and_then(|vc| sets.iter().position(|set| set.volume_cells.contains(&vc)))
                    } else {
                        (!sets.is_empty()).then_some(0)
                    };
                    let Some(k) = set_index else {
                        continue;
                    };
                    let system = local[k]
                        .get_or_insert_with(|| LocalSystem::zeros(dofmap.location_vector(e, &sets[k].nds)));
                    let basis = BasisPoint::evaluate(e, &element, &xi)?;
                    let x = element.map_reference_coords(&xi);
                    let traction = condition.traction.eval(&x, time);
                    let dA = w * quad.area_normal(st).norm();
                    for A in 0..8 {
                        for i in 0..3 {
                            system.rhs[4 * A + i] += s * dA * basis.N[A] * traction[i];
                        }
                    }
                }
                systems.extend(local.into_iter().flatten());
            }
        }
        Ok(systems)
    }
}

pub(crate) fn element_of(
    mesh: &HexMesh,
    element: usize,
    displacement: Option<&[Vector3<f64>]>,
) -> Result<Hex8Element<f64>, XFluidError> {
    mesh.displaced_element(element, displacement)
        .ok_or_else(|| XFluidError::ElementEvaluateFailure {
            element,
            reason: "connectivity refers to a missing vertex".to_string(),
        })
}
