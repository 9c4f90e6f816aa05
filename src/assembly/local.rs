//! Local systems of one background element.
//!
//! An uncut element yields one local system. A cut element yields one per cell set, each
//! integrated on the quadrature of its volume cells, plus one two-phase system per pair of
//! outside and inside cell sets that share boundary cells of a two-phase coupling. Couplings
//! with side dofs additionally produce [`SideContribution`]s.
use crate::boundary::element_of;
use crate::config::{CouplingMethod, XFluidParameters};
use crate::coupling::ConditionManager;
use crate::cut::{BoundaryCellIdx, CutWizard, ElementCut, Position};
use crate::define_thread_local_workspace;
use crate::dofset::{CellSet, GlobalDofMap};
use crate::element::Hex8Element;
use crate::error::XFluidError;
use crate::kernel::hybrid::{hybrid_one_sided, HybridStress};
use crate::kernel::interface::{nitsche_one_sided, nitsche_two_phase, InterfacePoint, Phase, SideSystem};
use crate::kernel::{fluid, ElementFields, KernelContext, LocalSystem, ShapeTag, ELEMENT_DOFS};
use crate::material::NewtonianFluid;
use crate::mesh::HexMesh;
use crate::nalgebra::{DVector, Vector3};
use crate::quadrature::{hexahedron_rule, Quadrature, QuadraturePair3d};
use crate::workspace::with_thread_local_workspace;
use std::collections::BTreeMap;

/// Coupling blocks of one element with the side dofs of one coupling.
#[derive(Debug, Clone)]
pub struct SideContribution {
    pub coupling: usize,
    /// Global background dofs, the rows of `C_xs`.
    pub x_dofs: Vec<usize>,
    /// Coupling-local side dofs, the rows of `C_sx`.
    pub s_dofs: Vec<usize>,
    pub system: SideSystem,
}

#[derive(Debug, Clone, Default)]
pub struct ElementContribution {
    pub systems: Vec<LocalSystem>,
    pub sides: Vec<SideContribution>,
}

/// Discrete state at which the residual is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationState<'a> {
    /// Velocity at the evaluation point of the scheme (`velaf` or `velnp`).
    pub velocity: &'a DVector<f64>,
    /// Holds the pressure at `t_{n+1}` in its pressure components.
    pub pressure: &'a DVector<f64>,
    /// Acceleration at the evaluation point of the scheme.
    pub acceleration: &'a DVector<f64>,
}

/// Everything an assembly pass reads.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyData<'a> {
    pub mesh: &'a HexMesh,
    /// Nodal ALE displacement.
    pub displacement: Option<&'a [Vector3<f64>]>,
    /// Nodal ALE grid velocity.
    pub grid_velocity: Option<&'a [Vector3<f64>]>,
    pub wizard: &'a CutWizard,
    pub dofmap: &'a GlobalDofMap,
    pub conditions: &'a ConditionManager,
    pub params: &'a XFluidParameters,
    pub context: KernelContext<'a>,
    pub state: EvaluationState<'a>,
}

impl<'a> AssemblyData<'a> {
    pub fn element(&self, element: usize) -> Result<Hex8Element<f64>, XFluidError> {
        element_of(self.mesh, element, self.displacement)
    }

    pub fn element_grid_velocity(&self, element: usize) -> [Vector3<f64>; 8] {
        let nodes = self.dofmap.element_nodes(element);
        match self.grid_velocity {
            Some(grid_velocity) => nodes.map(|n| grid_velocity[n]),
            None => [Vector3::zeros(); 8],
        }
    }

    /// Gathers the nodal fields of a cell set.
    pub fn gather(&self, element: usize, lm: &[usize]) -> ElementFields {
        let state = &self.state;
        ElementFields::gather(lm, state.velocity, state.pressure, Some(state.acceleration))
            .with_grid_velocity(self.element_grid_velocity(element))
    }
}

/// Volume quadrature of a cell set in element reference coordinates.
///
/// Uncut elements and cut elements without an XFEM rule use the standard Hex8 rule; cell
/// sets whose cells carry no quadrature points get an empty rule.
pub fn cell_set_quadrature(wizard: &CutWizard, element: usize, set: &CellSet) -> QuadraturePair3d {
    let standard = || hexahedron_rule(ShapeTag::Hex8.standard_quadrature_order());
    match wizard.element(element) {
        ElementCut::Uncut(_) => standard(),
        ElementCut::Cut(handle) => {
            let cells = set.volume_cells.iter().map(|&vc| wizard.volume_cell(vc));
            if handle.has_xfem_integration_rule {
                let mut quadrature: QuadraturePair3d = (Vec::new(), Vec::new());
                for cell in cells {
                    quadrature.0.extend_from_slice(&cell.quadrature.0);
                    quadrature.1.extend_from_slice(&cell.quadrature.1);
                }
                quadrature
            } else if cells.into_iter().any(|cell| !cell.quadrature.is_empty()) {
                standard()
            } else {
                (Vec::new(), Vec::new())
            }
        }
    }
}

/// Boundary cells owned by the cell set, bucketed by coupling. Cells of a coupling with
/// clones are replicated into the bucket of every clone.
pub fn coupling_buckets(
    wizard: &CutWizard,
    conditions: &ConditionManager,
    set: &CellSet,
) -> BTreeMap<usize, Vec<BoundaryCellIdx>> {
    let mut buckets: BTreeMap<usize, Vec<BoundaryCellIdx>> = BTreeMap::new();
    for &vc in &set.volume_cells {
        for &bc in &wizard.volume_cell(vc).boundary_cells {
            let coupling = wizard.boundary_cell(bc).coupling;
            buckets.entry(coupling).or_default().push(bc);
            for clone in conditions.clones_of(coupling) {
                buckets.entry(clone).or_default().push(bc);
            }
        }
    }
    buckets
}

#[derive(Debug, Default)]
struct InterfaceWorkspace {
    points: Vec<InterfacePoint>,
    /// Coupling-local side nodes touched by the boundary cells of a bucket.
    side_nodes: Vec<usize>,
}

define_thread_local_workspace!(WORKSPACE);

/// Quadrature points of the boundary cells of one coupling bucket.
///
/// For couplings with side dofs, the side nodes of all cells are numbered consecutively in
/// `side_nodes` and the side basis of every point refers to that numbering.
fn populate_interface_points(
    data: &AssemblyData,
    element: usize,
    coupling: usize,
    cells: &[BoundaryCellIdx],
    ws: &mut InterfaceWorkspace,
) -> Result<(), XFluidError> {
    ws.points.clear();
    ws.side_nodes.clear();
    let conditions = data.conditions;
    let interface = conditions.coupling(coupling);
    let with_side_dofs = interface.kind().has_side_dofs();

    for &idx in cells {
        let bc = data.wizard.boundary_cell(idx);
        let (_, local_side) = conditions
            .local_side(bc.side)
            .ok_or_else(|| XFluidError::ElementEvaluateFailure {
                element,
                reason: format!("boundary cell refers to unknown side {}", bc.side),
            })?;

        let mut local_nodes = [0; 3];
        if with_side_dofs {
            let location = interface.side_location_vector(local_side);
            for (corner, dofs) in location.chunks(3).take(3).enumerate() {
                let node = dofs[0] / 3;
                local_nodes[corner] = match ws.side_nodes.iter().position(|&n| n == node) {
                    Some(local) => local,
                    None => {
                        ws.side_nodes.push(node);
                        ws.side_nodes.len() - 1
                    }
                };
            }
        }

        for ((&w, x), xi) in bc.weights.iter().zip(&bc.points).zip(&bc.reference_points) {
            let side_basis = if with_side_dofs {
                let phi = interface.side_basis(local_side, x);
                Some(std::array::from_fn(|corner| (local_nodes[corner], phi[corner])))
            } else {
                None
            };
            ws.points.push(InterfacePoint {
                x: *x,
                xi: *xi,
                normal: bc.normal,
                weight: w,
                velocity: interface.interface_velocity(x, local_side),
                side_basis,
            });
        }
    }
    Ok(())
}

/// Local systems of one background element.
pub fn evaluate_element(data: &AssemblyData, element_index: usize) -> Result<ElementContribution, XFluidError> {
    let element = data.element(element_index)?;
    let h = element.volume_equivalent_length();
    let sets = data.dofmap.cell_sets(element_index);
    let mut contribution = ElementContribution::default();

    for (k, set) in sets.iter().enumerate() {
        let lm = data.dofmap.location_vector(element_index, &set.nds);
        let fluid = data.conditions.material_at(element_index, set.position)?;
        let fields = data.gather(element_index, &lm);
        let quadrature = cell_set_quadrature(data.wizard, element_index, set);

        let mut system = LocalSystem::zeros(lm.clone());
        if !quadrature.is_empty() {
            fluid::evaluate(
                element_index,
                &element,
                &quadrature,
                &fields,
                &fluid,
                &data.context,
                &mut system.matrix,
                &mut system.rhs,
            )?;
        }

        for (coupling, cells) in coupling_buckets(data.wizard, data.conditions, set) {
            if data.conditions.coupling(coupling).kind().is_two_phase() {
                let two_phase = evaluate_two_phase(data, element_index, &element, k, &fields, &fluid, &cells, h)?;
                contribution.systems.extend(two_phase);
                continue;
            }
            let side = evaluate_one_sided(
                data,
                element_index,
                &element,
                &quadrature,
                coupling,
                &cells,
                &fields,
                &fluid,
                h,
                &mut system,
            )?;
            contribution.sides.extend(side);
        }
        contribution.systems.push(system);
    }
    Ok(contribution)
}

#[allow(clippy::too_many_arguments)]
fn evaluate_one_sided(
    data: &AssemblyData,
    element_index: usize,
    element: &Hex8Element<f64>,
    quadrature: &QuadraturePair3d,
    coupling: usize,
    cells: &[BoundaryCellIdx],
    fields: &ElementFields,
    fluid: &NewtonianFluid,
    h: f64,
    system: &mut LocalSystem,
) -> Result<Option<SideContribution>, XFluidError> {
    let params = data.params;
    let with_side_dofs = data.conditions.coupling(coupling).kind().has_side_dofs();

    with_thread_local_workspace(&WORKSPACE, |ws: &mut InterfaceWorkspace| {
        populate_interface_points(data, element_index, coupling, cells, ws)?;
        let mut side = with_side_dofs.then(|| SideSystem::zeros(ELEMENT_DOFS, 3 * ws.side_nodes.len()));
        let hybrid_variant = match params.coupling_method {
            CouplingMethod::HybridLmCauchyStress => Some(HybridStress::Cauchy),
            CouplingMethod::HybridLmViscousStress => Some(HybridStress::Viscous),
            CouplingMethod::Nitsche => None,
        };
        match hybrid_variant {
            Some(variant) => hybrid_one_sided(
                element_index,
                coupling,
                element,
                quadrature,
                &ws.points,
                fields,
                fluid,
                h,
                params.nitsche.penalty,
                variant,
                &data.context,
                &mut system.matrix,
                &mut system.rhs,
                side.as_mut(),
            )?,
            None => nitsche_one_sided(
                element_index,
                coupling,
                element,
                &ws.points,
                fields,
                fluid,
                h,
                &params.nitsche,
                &data.context,
                &mut system.matrix,
                &mut system.rhs,
                side.as_mut(),
            )?,
        }

        Ok(side.map(|side| SideContribution {
            coupling,
            x_dofs: system.dofs.clone(),
            s_dofs: ws
                .side_nodes
                .iter()
                .flat_map(|&node| (0..3).map(move |c| 3 * node + c))
                .collect(),
            system: side,
        }))
    })
}

/// Two-phase systems of the boundary cells owned by the outside cell set `k`, one per inside
/// cell set on the other side of the cells.
#[allow(clippy::too_many_arguments)]
fn evaluate_two_phase(
    data: &AssemblyData,
    element_index: usize,
    element: &Hex8Element<f64>,
    k: usize,
    fields: &ElementFields,
    fluid: &NewtonianFluid,
    cells: &[BoundaryCellIdx],
    h: f64,
) -> Result<Vec<LocalSystem>, XFluidError> {
    let sets = data.dofmap.cell_sets(element_index);
    let outside = &sets[k];
    if outside.position == Position::Inside {
        return Err(XFluidError::ElementEvaluateFailure {
            element: element_index,
            reason: "two-phase coupling evaluated from the inside cell set".to_string(),
        });
    }

    // Boundary cells grouped by the cell set of their inside volume cell
    let mut by_inside_set: BTreeMap<usize, Vec<BoundaryCellIdx>> = BTreeMap::new();
    for &bc in cells {
        let inside = data.wizard.boundary_cell(bc).inside;
        let set = sets
            .iter()
            .position(|set| set.volume_cells.contains(&inside))
            .ok_or_else(|| XFluidError::ElementEvaluateFailure {
                element: element_index,
                reason: "inside volume cell of a two-phase boundary cell has no dof-sets".to_string(),
            })?;
        by_inside_set.entry(set).or_default().push(bc);
    }

    let mut systems = Vec::with_capacity(by_inside_set.len());
    for (inside_index, cells) in by_inside_set {
        let inside = &sets[inside_index];
        let lm_inside = data.dofmap.location_vector(element_index, &inside.nds);
        let fields_inside = data.gather(element_index, &lm_inside);
        let fluid_inside = data.conditions.material_at(element_index, inside.position)?;

        let mut dofs = data.dofmap.location_vector(element_index, &outside.nds);
        dofs.extend_from_slice(&lm_inside);
        let mut system = LocalSystem::zeros(dofs);

        let points: Vec<InterfacePoint> = cells
            .iter()
            .flat_map(|&idx| {
                let bc = data.wizard.boundary_cell(idx);
                bc.weights
                    .iter()
                    .zip(&bc.points)
                    .zip(&bc.reference_points)
                    .map(move |((&w, x), xi)| InterfacePoint {
                        x: *x,
                        xi: *xi,
                        normal: bc.normal,
                        weight: w,
                        velocity: Vector3::zeros(),
                        side_basis: None,
                    })
            })
            .collect();

        nitsche_two_phase(
            element_index,
            Phase {
                element,
                fields,
                fluid,
            },
            Phase {
                element,
                fields: &fields_inside,
                fluid: &fluid_inside,
            },
            &points,
            h,
            &data.params.nitsche,
            &data.context,
            &mut system.matrix,
            &mut system.rhs,
        )?;
        systems.push(system);
    }
    Ok(systems)
}
