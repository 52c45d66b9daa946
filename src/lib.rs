//! N-body integration with a fourth-order Hermite predictor-corrector and a
//! shared, adaptive time step.
//!
//! ref.: Hut, P., Makino, J. & McMillan, S., 1995, ApJ 443, L93-L96.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod evolve;
pub mod experiment;
pub mod forces;
pub mod mass;
pub mod orbit_generator;
pub mod output;
pub mod scale;
pub mod snapshot;
pub mod solvers;

pub use config::RunConfig;
pub use diagnostics::{EnergyDiagnostics, EnergyReport};
pub use error::{NbodyError, NbodyResult};
pub use evolve::{Integrator, Phase, RunObserver, RunSummary};
pub use forces::{ForceEvaluator, ForceState};
pub use mass::{Mass, ParticleSystem, Vector};
pub use output::StreamObserver;
pub use scale::G;
pub use snapshot::{read_initial_state, write_snapshot, Snapshot, SnapshotReader};
pub use solvers::{correct, hermite_step, predict, StepSnapshot};
