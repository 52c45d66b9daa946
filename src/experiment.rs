use crate::diagnostics::{EnergyDiagnostics, EnergyReport};
use crate::error::NbodyResult;
use crate::evolve::{Integrator, RunSummary};
use crate::forces::ForceState;
use crate::mass::ParticleSystem;
use crate::scale::energy_to_external;
use crate::snapshot::{Snapshot, SnapshotReader};
use chrono::Utc;
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::Path;

#[derive(Serialize)]
struct RunRecord {
    date: String,
    bodies: usize,
    accuracy: f64,
    duration: f64,
    steps: u64,
    final_time: f64,
    relative_energy_error: Option<f64>,
    execution_duration: f64,
    energy_thresholds: String,
    notes: String,
}

/// Appends one row describing a finished run to the CSV file at `path`,
/// writing the header only when the file is new.
pub fn export_run<const D: usize>(
    path: &Path,
    integrator: &Integrator<D>,
    summary: &RunSummary,
    diagnostics: &EnergyDiagnostics,
    final_report: Option<&EnergyReport>,
    notes: &str,
) -> NbodyResult<()> {
    let energy_thresholds = serde_json::to_string(&diagnostics.threshold_crossings())?;
    let record = RunRecord {
        date: Utc::now().to_rfc3339(),
        bodies: integrator.system().len(),
        accuracy: integrator.config().accuracy,
        duration: integrator.config().duration,
        steps: summary.steps,
        final_time: summary.final_time,
        relative_energy_error: final_report.map(|r| r.relative_error),
        execution_duration: summary.wall_seconds,
        energy_thresholds,
        notes: notes.to_string(),
    };

    let file_exists = path.exists();
    let file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    wtr.serialize(record)?;
    wtr.flush()?;
    Ok(())
}

/// Energy budget and closest approach of one stored snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub time: f64,
    pub bodies: usize,
    pub kinetic: f64,
    pub potential: f64,
    pub total: f64,
    pub min_distance: Option<f64>,
}

/// Summarizes a snapshot as stored, without moving it to the
/// center-of-mass frame. Distances are recomputed, not taken from the file.
pub fn summarize<const D: usize>(snapshot: &Snapshot<D>) -> SnapshotSummary {
    let system = ParticleSystem::from_masses(&snapshot.bodies);
    let forces = ForceState::evaluate(&system);
    let kinetic = energy_to_external(system.kinetic_energy());
    let potential = energy_to_external(forces.potential());
    SnapshotSummary {
        time: snapshot.time,
        bodies: system.len(),
        kinetic,
        potential,
        total: kinetic + potential,
        min_distance: forces
            .distances()
            .iter()
            .copied()
            .map(OrderedFloat)
            .min()
            .map(OrderedFloat::into_inner),
    }
}

/// Writes one CSV row per snapshot in `reader`; returns the number of rows.
pub fn export_summaries<R: BufRead, W: Write, const D: usize>(
    reader: R,
    out: W,
) -> NbodyResult<usize> {
    let mut wtr = csv::Writer::from_writer(out);
    let mut rows = 0;
    for snapshot in SnapshotReader::<R, D>::new(reader) {
        wtr.serialize(summarize(&snapshot?))?;
        rows += 1;
    }
    wtr.flush()?;
    Ok(rows)
}
