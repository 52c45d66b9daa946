//! Stream-backed observer: snapshots to the primary channel, diagnostics to
//! the log channel, and optionally every diagnostics record to a CSV file.

use crate::diagnostics::{write_particle_dump, write_report, EnergyDiagnostics, EnergyReport};
use crate::error::NbodyResult;
use crate::evolve::{Integrator, RunObserver};
use crate::snapshot::write_snapshot;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub struct StreamObserver<W: Write, E: Write> {
    snapshots: W,
    log: E,
    diagnostics: EnergyDiagnostics,
    energy_log: Option<csv::Writer<File>>,
    last_report: Option<EnergyReport>,
}

impl<W: Write, E: Write> StreamObserver<W, E> {
    pub fn new(snapshots: W, log: E) -> Self {
        Self {
            snapshots,
            log,
            diagnostics: EnergyDiagnostics::new(),
            energy_log: None,
            last_report: None,
        }
    }

    /// Also writes every diagnostics record as a CSV row to `path`.
    pub fn with_energy_log(mut self, path: &Path) -> NbodyResult<Self> {
        self.energy_log = Some(csv::Writer::from_path(path)?);
        Ok(self)
    }

    pub fn energy_diagnostics(&self) -> &EnergyDiagnostics {
        &self.diagnostics
    }

    pub fn last_report(&self) -> Option<&EnergyReport> {
        self.last_report.as_ref()
    }

    pub fn into_inner(self) -> (W, E) {
        (self.snapshots, self.log)
    }
}

impl<W: Write, E: Write, const D: usize> RunObserver<D> for StreamObserver<W, E> {
    fn snapshot(&mut self, it: &Integrator<D>) -> NbodyResult<()> {
        write_snapshot(&mut self.snapshots, it.system(), it.forces().distances(), it.time())?;
        self.snapshots.flush()?;
        Ok(())
    }

    fn diagnostics(&mut self, it: &Integrator<D>) -> NbodyResult<()> {
        let report = self
            .diagnostics
            .record(it.system(), it.forces(), it.time(), it.steps());
        write_report(&mut self.log, &report)?;
        if it.config().verbose {
            write_particle_dump(&mut self.log, it.system(), it.forces())?;
        }
        if let Some(wtr) = self.energy_log.as_mut() {
            wtr.serialize(&report)?;
        }
        self.last_report = Some(report);
        Ok(())
    }

    fn finalize(&mut self, _it: &Integrator<D>) -> NbodyResult<()> {
        self.snapshots.flush()?;
        self.log.flush()?;
        if let Some(wtr) = self.energy_log.as_mut() {
            wtr.flush()?;
        }
        Ok(())
    }
}
