//! Enriched nodal dof-sets.
//!
//! Every node carries one nodal dof-set per phase patch in its support. The dof-set of the
//! patch containing the node itself is the standard set, all others are ghost sets which
//! extend a patch across the interface. Each nodal dof-set occupies one *slot* with four
//! dofs: three velocity components and the pressure.
use crate::config::NodalDofSetStrategy;
use crate::cut::{CutWizard, ElementCut, Position, VolumeCellIdx};
use crate::error::XFluidError;
use crate::material::FluidMaterial;
use crate::mesh::HexMesh;
use crate::util::UnionFind;
use itertools::Itertools;
use log::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Number of dofs per nodal dof-set.
pub const DOFS_PER_SET: usize = 4;

/// Local index of the pressure within a nodal dof-set.
pub const PRESSURE: usize = 3;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodalDofSet {
    pub node: usize,
    pub position: Position,
    /// Connected phase patch the set belongs to.
    pub patch: usize,
    pub standard: bool,
}

/// Physical cells of an element sharing the same nodal dof-sets.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSet {
    pub position: Position,
    /// Volume cells of the set. Empty for uncut elements.
    pub volume_cells: Vec<VolumeCellIdx>,
    /// Per element node, the index of the nodal dof-set among the sets of that node.
    pub nds: [usize; 8],
    pub patch: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDofMap {
    node_offsets: Vec<usize>,
    slots: Vec<NodalDofSet>,
    cell_sets: Vec<Vec<CellSet>>,
    element_nodes: Vec<[usize; 8]>,
}

/// A physical region of one element: a whole uncut element or a volume cell.
struct PhaseCell {
    element: usize,
    position: Position,
    volume_cell: Option<VolumeCellIdx>,
    /// Global ids of the nodes lying in the cell.
    nodes: Vec<usize>,
}

impl GlobalDofMap {
    /// Builds the nodal dof-sets for the given cut.
    pub fn build(
        mesh: &HexMesh,
        wizard: &CutWizard,
        material: &FluidMaterial,
        strategy: NodalDofSetStrategy,
        max_dofsets_per_node: usize,
    ) -> Result<Self, XFluidError> {
        let element_nodes: Vec<[usize; 8]> = mesh.connectivity().iter().map(|c| c.0).collect();
        let is_physical = |position: Position| material.at(position).is_some();

        let mut cells = Vec::new();
        for (e, nodes) in element_nodes.iter().enumerate() {
            match wizard.element(e) {
                ElementCut::Uncut(position) => {
                    if is_physical(*position) {
                        cells.push(PhaseCell {
                            element: e,
                            position: *position,
                            volume_cell: None,
                            nodes: nodes.to_vec(),
                        });
                    }
                }
                ElementCut::Cut(handle) => {
                    for &vc in &handle.volume_cells {
                        let cell = wizard.volume_cell(vc);
                        if is_physical(cell.position) {
                            cells.push(PhaseCell {
                                element: e,
                                position: cell.position,
                                volume_cell: Some(vc),
                                nodes: cell.nodes.iter().map(|&i| nodes[i]).collect(),
                            });
                        }
                    }
                }
            }
        }

        // Cells of the same position containing a common node form a patch
        let mut patches = UnionFind::new(cells.len());
        let mut cell_of_node: FxHashMap<(usize, Position), usize> = FxHashMap::default();
        for (c, cell) in cells.iter().enumerate() {
            for &node in &cell.nodes {
                match cell_of_node.get(&(node, cell.position)) {
                    Some(&other) => patches.union(c, other),
                    None => {
                        cell_of_node.insert((node, cell.position), c);
                    }
                }
            }
        }
        let (patch_of_cell, num_patches) = patches.labels();

        let key_of = |c: usize| -> (Position, usize) {
            match strategy {
                NodalDofSetStrategy::OneDofsetPerNodeAndPosition => (cells[c].position, 0),
                NodalDofSetStrategy::ConnectedComponentBased => (cells[c].position, patch_of_cell[c]),
            }
        };

        // Keys of all cells in the support of each node
        let num_nodes = mesh.num_vertices();
        let mut support_keys: Vec<Vec<(Position, usize)>> = vec![Vec::new(); num_nodes];
        for (c, cell) in cells.iter().enumerate() {
            for &node in &element_nodes[cell.element] {
                support_keys[node].push(key_of(c));
            }
        }

        let mut node_offsets = Vec::with_capacity(num_nodes + 1);
        let mut slots = Vec::new();
        let mut node_keys: Vec<Vec<(Position, usize)>> = Vec::with_capacity(num_nodes);
        node_offsets.push(0);
        for (node, keys) in support_keys.into_iter().enumerate() {
            // Own phase first, then the ghost sets ordered by position and patch
            let own = wizard.node_position(node);
            let standard = cell_of_node.get(&(node, own)).map(|&c| key_of(c));
            let mut ordered: Vec<(Position, usize)> = standard.into_iter().collect();
            ordered.extend(
                keys.into_iter()
                    .sorted()
                    .dedup()
                    .filter(|key| Some(*key) != standard),
            );
            if ordered.len() > max_dofsets_per_node {
                return Err(XFluidError::TooManyDofSets {
                    node,
                    required: ordered.len(),
                    max: max_dofsets_per_node,
                });
            }
            for (i, &(position, patch)) in ordered.iter().enumerate() {
                let patch = match strategy {
                    NodalDofSetStrategy::ConnectedComponentBased => patch,
                    NodalDofSetStrategy::OneDofsetPerNodeAndPosition => position_patch(position),
                };
                slots.push(NodalDofSet {
                    node,
                    position,
                    patch,
                    standard: i == 0 && standard.is_some(),
                });
            }
            node_offsets.push(slots.len());
            node_keys.push(ordered);
        }

        // Group the cells of every element by their nodal dof-sets
        let mut cell_sets: Vec<Vec<CellSet>> = vec![Vec::new(); element_nodes.len()];
        for (c, cell) in cells.iter().enumerate() {
            let key = key_of(c);
            let nodes = &element_nodes[cell.element];
            let mut nds = [0; 8];
            for (i, &node) in nodes.iter().enumerate() {
                nds[i] = node_keys[node]
                    .iter()
                    .position(|k| *k == key)
                    .expect("every node carries the sets of all cells in its support");
            }
            let sets = &mut cell_sets[cell.element];
            match sets.iter_mut().find(|set| set.position == cell.position && set.nds == nds) {
                Some(set) => set.volume_cells.extend(cell.volume_cell),
                None => sets.push(CellSet {
                    position: cell.position,
                    volume_cells: cell.volume_cell.into_iter().collect(),
                    nds,
                    patch: match strategy {
                        NodalDofSetStrategy::ConnectedComponentBased => patch_of_cell[c],
                        NodalDofSetStrategy::OneDofsetPerNodeAndPosition => position_patch(cell.position),
                    },
                }),
            }
        }

        debug!(
            "Built {} nodal dof-sets on {} nodes from {} phase cells in {} patches",
            slots.len(),
            num_nodes,
            cells.len(),
            num_patches
        );

        Ok(Self {
            node_offsets,
            slots,
            cell_sets,
            element_nodes,
        })
    }

    /// Dof map of an uncut mesh with a single phase.
    pub fn uncut(mesh: &HexMesh, material: &FluidMaterial) -> Result<Self, XFluidError> {
        let wizard = CutWizard::uncut(mesh, None);
        Self::build(mesh, &wizard, material, NodalDofSetStrategy::OneDofsetPerNodeAndPosition, 1)
    }

    pub fn num_nodes(&self) -> usize {
        self.node_offsets.len() - 1
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn num_dofs(&self) -> usize {
        DOFS_PER_SET * self.slots.len()
    }

    pub fn num_elements(&self) -> usize {
        self.cell_sets.len()
    }

    pub fn slot(&self, slot: usize) -> &NodalDofSet {
        &self.slots[slot]
    }

    pub fn slots(&self) -> &[NodalDofSet] {
        &self.slots
    }

    pub fn node_slots(&self, node: usize) -> Range<usize> {
        self.node_offsets[node]..self.node_offsets[node + 1]
    }

    pub fn num_dofsets(&self, node: usize) -> usize {
        self.node_offsets[node + 1] - self.node_offsets[node]
    }

    /// The slot of the standard dof-set of the node, if its own phase is physical.
    pub fn standard_slot(&self, node: usize) -> Option<usize> {
        self.node_slots(node).find(|&s| self.slots[s].standard)
    }

    /// Slot of the `nds`-th dof-set of the node.
    pub fn slot_of(&self, node: usize, nds: usize) -> usize {
        self.node_offsets[node] + nds
    }

    pub fn dof(slot: usize, component: usize) -> usize {
        DOFS_PER_SET * slot + component
    }

    pub fn element_nodes(&self, element: usize) -> &[usize; 8] {
        &self.element_nodes[element]
    }

    pub fn cell_sets(&self, element: usize) -> &[CellSet] {
        &self.cell_sets[element]
    }

    /// Slots of the element nodes for the given dof-set indices.
    pub fn element_slots(&self, element: usize, nds: &[usize; 8]) -> [usize; 8] {
        let nodes = &self.element_nodes[element];
        std::array::from_fn(|i| self.slot_of(nodes[i], nds[i]))
    }

    /// Global dofs of an element, ordered `4 * local_node + component`.
    pub fn location_vector(&self, element: usize, nds: &[usize; 8]) -> Vec<usize> {
        self.element_slots(element, nds)
            .iter()
            .flat_map(|&slot| (0..DOFS_PER_SET).map(move |c| Self::dof(slot, c)))
            .collect()
    }

    /// Whether the dof is a pressure dof.
    pub fn is_pressure_dof(dof: usize) -> bool {
        dof % DOFS_PER_SET == PRESSURE
    }

    /// Number of nodal dof-sets per node.
    pub fn dofsets_per_node(&self) -> Vec<usize> {
        (0..self.num_nodes()).map(|n| self.num_dofsets(n)).collect()
    }

    /// Compares only the number of nodal dof-sets per node.
    pub fn same_layout(&self, other: &GlobalDofMap) -> bool {
        self.node_offsets == other.node_offsets
    }
}

/// Patch label used when all patches of a position share one dof-set.
fn position_patch(position: Position) -> usize {
    match position {
        Position::Outside => 0,
        Position::Inside => 1,
        Position::OnCutSurface => 2,
    }
}

/// Holds the current dof map and, until released, the map of the previous cut.
#[derive(Debug, Clone)]
pub struct DofSetManager {
    current: GlobalDofMap,
    previous: Option<GlobalDofMap>,
}

impl DofSetManager {
    pub fn new(initial: GlobalDofMap) -> Self {
        Self {
            current: initial,
            previous: None,
        }
    }

    /// Installs a new dof map, keeping the current one as previous map.
    pub fn update(&mut self, map: GlobalDofMap) {
        let old = std::mem::replace(&mut self.current, map);
        self.previous = Some(old);
    }

    pub fn current(&self) -> &GlobalDofMap {
        &self.current
    }

    pub fn previous(&self) -> Option<&GlobalDofMap> {
        self.previous.as_ref()
    }

    pub fn release_previous(&mut self) {
        self.previous = None;
    }

    /// Whether the number of dof-sets changed at any node since the previous map.
    pub fn dofsets_changed(&self) -> bool {
        self.previous
            .as_ref()
            .map(|previous| !previous.same_layout(&self.current))
            .unwrap_or(false)
    }
}
