//! Gmsh post-processing views (`.pos`) of state vectors and interface cells.
//!
//! Every nodal dof-set is written as a point at its node, ghost dof-sets included, so that
//! the values on both sides of an interface can be inspected.
use crate::cut::{CutWizard, Position};
use crate::dofset::GlobalDofMap;
use crate::nalgebra::DVector;
use eyre::WrapErr;
use std::fmt::{self, Write as _};
use std::path::Path;

fn position_tag(position: Position) -> &'static str {
    match position {
        Position::Inside => "inside",
        Position::Outside => "outside",
        Position::OnCutSurface => "on-surface",
    }
}

/// Formats the dump of `vector` for the given step and Newton iteration.
pub fn format_state_dump(
    name: &str,
    step: usize,
    iteration: usize,
    wizard: &CutWizard,
    dofmap: &GlobalDofMap,
    vector: &DVector<f64>,
) -> String {
    let mut out = String::new();
    write_views(&mut out, name, step, iteration, wizard, dofmap, vector).expect("writing to a String does not fail");
    out
}

fn write_views(
    out: &mut String,
    name: &str,
    step: usize,
    iteration: usize,
    wizard: &CutWizard,
    dofmap: &GlobalDofMap,
    vector: &DVector<f64>,
) -> fmt::Result {
    let coordinates = wizard.node_coordinates();
    writeln!(out, "View \"{name} velocity (step {step}, iteration {iteration})\" {{")?;
    for (slot, set) in dofmap.slots().iter().enumerate() {
        let x = &coordinates[set.node];
        writeln!(
            out,
            "// slot {slot} node {} {} {}",
            set.node,
            position_tag(set.position),
            if set.standard { "standard" } else { "ghost" }
        )?;
        writeln!(
            out,
            "VP({:.6},{:.6},{:.6}){{{:.6e},{:.6e},{:.6e}}};",
            x.x,
            x.y,
            x.z,
            vector[GlobalDofMap::dof(slot, 0)],
            vector[GlobalDofMap::dof(slot, 1)],
            vector[GlobalDofMap::dof(slot, 2)]
        )?;
    }
    writeln!(out, "}};")?;

    writeln!(out, "View \"{name} pressure (step {step}, iteration {iteration})\" {{")?;
    for (slot, set) in dofmap.slots().iter().enumerate() {
        let x = &coordinates[set.node];
        writeln!(
            out,
            "SP({:.6},{:.6},{:.6}){{{:.6e}}};",
            x.x,
            x.y,
            x.z,
            vector[GlobalDofMap::dof(slot, 3)]
        )?;
    }
    writeln!(out, "}};")?;

    if !wizard.boundary_cells().is_empty() {
        writeln!(out, "View \"interface (step {step}, iteration {iteration})\" {{")?;
        for cell in wizard.boundary_cells() {
            let [a, b, c] = &cell.vertices;
            let coupling = cell.coupling;
            writeln!(
                out,
                "ST({:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}){{{coupling},{coupling},{coupling}}};",
                a.x, a.y, a.z, b.x, b.y, b.z, c.x, c.y, c.z
            )?;
        }
        writeln!(out, "}};")?;
    }
    Ok(())
}

pub fn write_state_dump(
    path: impl AsRef<Path>,
    name: &str,
    step: usize,
    iteration: usize,
    wizard: &CutWizard,
    dofmap: &GlobalDofMap,
    vector: &DVector<f64>,
) -> eyre::Result<()> {
    let path = path.as_ref();
    if let Some(directory) = path.parent() {
        std::fs::create_dir_all(directory)
            .wrap_err_with(|| format!("failed to create output directory {}", directory.display()))?;
    }
    let dump = format_state_dump(name, step, iteration, wizard, dofmap, vector);
    std::fs::write(path, dump).wrap_err_with(|| format!("failed to write gmsh dump {}", path.display()))
}
