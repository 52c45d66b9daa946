//! Energy-conservation diagnostics.
//!
//! The kinetic energy is computed here; the potential energy comes from the
//! force sweep. All reported energies are in external units.

use crate::forces::ForceState;
use crate::mass::{ParticleSystem, Vector};
use crate::scale::{energy_to_external, mass_to_external};
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Relative energy errors whose first crossing time is tracked.
pub const ENERGY_THRESHOLDS: [f64; 14] = [
    0.01, 0.05, 0.1, 0.2, 0.3, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0, 10.0,
];

/// One diagnostics record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyReport {
    pub time: f64,
    pub steps: u64,
    pub kinetic: f64,
    pub potential: f64,
    pub total: f64,
    /// `total - initial`
    pub absolute_error: f64,
    /// `(total - initial) / initial`; non-finite when the initial energy is zero.
    pub relative_error: f64,
}

/// Diagnostics collaborator. The first call to [`EnergyDiagnostics::record`]
/// fixes the reference energy for all later drift figures.
#[derive(Debug, Clone)]
pub struct EnergyDiagnostics {
    initial_energy: Option<f64>,
    crossings: BTreeMap<OrderedFloat<f64>, Option<f64>>,
}

impl Default for EnergyDiagnostics {
    fn default() -> Self {
        Self::with_thresholds(&ENERGY_THRESHOLDS)
    }
}

impl EnergyDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: &[f64]) -> Self {
        Self {
            initial_energy: None,
            crossings: thresholds.iter().map(|&t| (OrderedFloat(t), None)).collect(),
        }
    }

    pub fn initial_energy(&self) -> Option<f64> {
        self.initial_energy
    }

    /// Computes the energy budget of the current state and updates the
    /// threshold bookkeeping.
    pub fn record<const D: usize>(
        &mut self,
        system: &ParticleSystem<D>,
        forces: &ForceState<D>,
        time: f64,
        steps: u64,
    ) -> EnergyReport {
        let kinetic = energy_to_external(system.kinetic_energy());
        let potential = energy_to_external(forces.potential());
        let total = kinetic + potential;
        let initial = *self.initial_energy.get_or_insert(total);

        let report = EnergyReport {
            time,
            steps,
            kinetic,
            potential,
            total,
            absolute_error: total - initial,
            relative_error: (total - initial) / initial,
        };

        for (threshold, crossed) in self.crossings.iter_mut() {
            if crossed.is_none() && report.relative_error.abs() > threshold.into_inner() {
                *crossed = Some(time);
            }
        }
        report
    }

    /// `(threshold, first time exceeded)` in ascending threshold order.
    pub fn threshold_crossings(&self) -> Vec<(f64, Option<f64>)> {
        self.crossings
            .iter()
            .map(|(k, v)| (k.into_inner(), *v))
            .collect()
    }
}

/// Writes a report in the plain-text layout of the diagnostics channel.
pub fn write_report<W: Write>(out: &mut W, report: &EnergyReport) -> io::Result<()> {
    writeln!(
        out,
        "at time t = {} , after {} steps :\n  E_kin = {} , E_pot = {} , E_tot = {}",
        report.time, report.steps, report.kinetic, report.potential, report.total
    )?;
    writeln!(
        out,
        "                absolute energy error: E_tot - E_init = {}",
        report.absolute_error
    )?;
    writeln!(
        out,
        "                relative energy error: (E_tot - E_init) / E_init = {}",
        report.relative_error
    )
}

/// Verbose dump of every particle's internal data.
pub fn write_particle_dump<W: Write, const D: usize>(
    out: &mut W,
    system: &ParticleSystem<D>,
    forces: &ForceState<D>,
) -> io::Result<()> {
    writeln!(out, "  Internal data:")?;
    for i in 0..system.len() {
        writeln!(out, "    Data for particle {} :", i + 1)?;
        writeln!(out, "      Mass: {}", mass_to_external(system.masses()[i]))?;
        write_row(out, "Pos: ", &system.positions()[i])?;
        write_row(out, "Vel: ", &system.velocities()[i])?;
        write_row(out, "Acc: ", &forces.acc()[i])?;
        write_row(out, "Jerk:", &forces.jerk()[i])?;
    }
    Ok(())
}

fn write_row<W: Write, const D: usize>(out: &mut W, label: &str, v: &Vector<D>) -> io::Result<()> {
    write!(out, "      {label}")?;
    for x in v.iter() {
        write!(out, " {x}")?;
    }
    writeln!(out)
}
