//! Adaptive shared-time-step driver.
//!
//! The step size is global but variable: before every step it is set to the
//! accuracy parameter times the current collision-time estimate. Snapshots
//! and diagnostics are handed to a [`RunObserver`] between steps, never from
//! inside one.

use crate::config::RunConfig;
use crate::error::{NbodyError, NbodyResult};
use crate::forces::{ForceEvaluator, ForceState};
use crate::mass::ParticleSystem;
use crate::solvers::{hermite_step, StepSnapshot};
use indicatif::ProgressBar;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Steps between progress-bar refreshes.
const PROGRESS_STRIDE: u64 = 1000;
/// Resolution of the progress bar over the simulated interval.
pub const PROGRESS_TICKS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Running,
    Done,
}

/// Receives snapshots and diagnostics as the run reaches their boundaries.
pub trait RunObserver<const D: usize> {
    fn snapshot(&mut self, integrator: &Integrator<D>) -> NbodyResult<()>;

    fn diagnostics(&mut self, integrator: &Integrator<D>) -> NbodyResult<()>;

    /// Called once after the final diagnostics record.
    fn finalize(&mut self, _integrator: &Integrator<D>) -> NbodyResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub steps: u64,
    pub final_time: f64,
    pub wall_seconds: f64,
}

pub struct Integrator<const D: usize> {
    system: ParticleSystem<D>,
    forces: ForceState<D>,
    previous: StepSnapshot<D>,
    evaluator: ForceEvaluator,
    config: RunConfig,
    time: f64,
    start_time: f64,
    end_time: f64,
    steps: u64,
    next_diagnostics: f64,
    next_snapshot: f64,
    phase: Phase,
    progress: Option<ProgressBar>,
    warned_step: bool,
}

impl<const D: usize> Integrator<D> {
    /// Prepares a run of `config.duration` starting from `system` at `time`.
    pub fn new(system: ParticleSystem<D>, time: f64, config: &RunConfig) -> NbodyResult<Self> {
        config.validate()?;
        let n = system.len();
        Ok(Self {
            system,
            forces: ForceState::new(n),
            previous: StepSnapshot::new(n),
            evaluator: ForceEvaluator::default(),
            config: config.clone(),
            time,
            start_time: time,
            end_time: time + config.duration,
            steps: 0,
            next_diagnostics: time + config.diagnostics_interval,
            next_snapshot: time + config.snapshot_interval,
            phase: Phase::Init,
            progress: None,
            warned_step: false,
        })
    }

    pub fn with_evaluator(mut self, evaluator: ForceEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn system(&self) -> &ParticleSystem<D> {
        &self.system
    }

    pub fn forces(&self) -> &ForceState<D> {
        &self.forces
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Evaluates the initial forces and emits the initial diagnostics record
    /// and snapshot.
    pub fn start<O: RunObserver<D>>(&mut self, observer: &mut O) -> NbodyResult<()> {
        self.evaluator.evaluate(&self.system, &mut self.forces);
        info!(
            bodies = self.system.len(),
            start = self.time,
            end = self.end_time,
            accuracy = self.config.accuracy,
            diagnostics_interval = self.config.diagnostics_interval,
            snapshot_interval = self.config.snapshot_interval,
            "starting Hermite integration"
        );
        self.phase = Phase::Running;
        observer.diagnostics(self)?;
        observer.snapshot(self)?;
        Ok(())
    }

    /// Step size for the next step.
    ///
    /// Without any pair the collision time is infinite; the step then goes
    /// straight to the end time.
    pub fn next_step_size(&self) -> f64 {
        let collision_time = self.forces.collision_time();
        if collision_time == f64::INFINITY {
            self.end_time - self.time
        } else {
            self.config.accuracy * collision_time
        }
    }

    /// Takes one Hermite step and returns its size.
    ///
    /// Only valid between [`Integrator::start`] and the end of the run;
    /// before `start` there are no forces to step with.
    pub fn step(&mut self) -> NbodyResult<f64> {
        if self.phase != Phase::Running {
            return Err(NbodyError::InvalidPhase(self.phase));
        }
        let dt = self.next_step_size();
        if !(dt > 0.0 && dt.is_finite()) && !self.warned_step {
            warn!(time = self.time, dt, "degenerate step size; close encounter or coincident bodies");
            self.warned_step = true;
        }
        hermite_step(
            self.evaluator,
            &mut self.system,
            &mut self.forces,
            &mut self.previous,
            dt,
        );
        self.time += dt;
        self.steps += 1;
        Ok(dt)
    }

    /// Runs from the current state to the end time.
    pub fn run<O: RunObserver<D>>(&mut self, observer: &mut O) -> NbodyResult<RunSummary> {
        let wall = Instant::now();
        if self.phase == Phase::Init {
            self.start(observer)?;
        }

        let dia_interval = self.config.diagnostics_interval;
        let out_interval = self.config.snapshot_interval;
        while self.time < self.end_time {
            self.step()?;

            if dia_interval > 0.0 && self.time >= self.next_diagnostics {
                debug!(time = self.time, steps = self.steps, "diagnostics");
                observer.diagnostics(self)?;
                self.next_diagnostics = advance_boundary(self.next_diagnostics, dia_interval, self.time);
            }
            if self.time >= self.next_snapshot {
                debug!(time = self.time, steps = self.steps, "snapshot");
                observer.snapshot(self)?;
                self.next_snapshot = advance_boundary(self.next_snapshot, out_interval, self.time);
            }
            if self.steps % PROGRESS_STRIDE == 0 {
                self.update_progress();
            }
        }

        // skip only if the last record fell exactly on the final time
        if dia_interval == 0.0 || self.time > self.next_diagnostics - dia_interval {
            observer.diagnostics(self)?;
        }
        self.phase = Phase::Done;
        observer.finalize(self)?;

        if let Some(pb) = &self.progress {
            pb.finish_with_message("Simulation complete");
        }
        let summary = RunSummary {
            steps: self.steps,
            final_time: self.time,
            wall_seconds: wall.elapsed().as_secs_f64(),
        };
        info!(
            steps = summary.steps,
            time = summary.final_time,
            wall_seconds = summary.wall_seconds,
            "integration finished"
        );
        Ok(summary)
    }

    fn update_progress(&self) {
        if let Some(pb) = &self.progress {
            let fraction = (self.time - self.start_time) / (self.end_time - self.start_time);
            pb.set_position((fraction.clamp(0.0, 1.0) * PROGRESS_TICKS as f64) as u64);
        }
    }
}

/// Moves an output boundary forward by whole intervals until it is no
/// longer behind `time`; a single long step may skip several boundaries.
///
/// Once `interval` drops below the float spacing of `next`, the boundary
/// is pinned to `time`.
fn advance_boundary(next: f64, interval: f64, time: f64) -> f64 {
    let skipped = ((time - next) / interval).ceil().max(1.0);
    let mut advanced = next + skipped * interval;
    if advanced < time {
        advanced += interval;
    }
    advanced.max(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mass::Mass;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    #[derive(Default)]
    struct Recorder {
        snapshots: Vec<(f64, u64)>,
        diagnostics: Vec<(f64, u64)>,
        finalized: bool,
    }

    impl<const D: usize> RunObserver<D> for Recorder {
        fn snapshot(&mut self, it: &Integrator<D>) -> NbodyResult<()> {
            self.snapshots.push((it.time(), it.steps()));
            Ok(())
        }

        fn diagnostics(&mut self, it: &Integrator<D>) -> NbodyResult<()> {
            self.diagnostics.push((it.time(), it.steps()));
            Ok(())
        }

        fn finalize(&mut self, it: &Integrator<D>) -> NbodyResult<()> {
            assert_eq!(it.phase(), Phase::Done);
            self.finalized = true;
            Ok(())
        }
    }

    fn binary() -> ParticleSystem<2> {
        ParticleSystem::from_internal(
            vec![1.0, 1.0],
            vec![Vector2::new(1.0, 0.0), Vector2::new(-1.0, 0.0)],
            vec![Vector2::new(0.0, 0.5), Vector2::new(0.0, -0.5)],
        )
    }

    fn config(diagnostics_interval: f64, snapshot_interval: f64, duration: f64) -> RunConfig {
        RunConfig {
            accuracy: 10.0,
            diagnostics_interval,
            snapshot_interval,
            duration,
            verbose: false,
        }
    }

    #[test]
    fn boundaries_skip_whole_intervals() {
        assert_eq!(advance_boundary(1.0, 1.0, 3.5), 4.0);
        assert_eq!(advance_boundary(1.0, 1.0, 1.2), 2.0);
        assert_eq!(advance_boundary(1.0, 1.0, 2.0), 2.0);
        assert_eq!(advance_boundary(1.0, 1.0, 1.0), 2.0);
        assert!(advance_boundary(0.0, 0.1, 0.3) >= 0.3);
    }

    #[test]
    fn boundary_below_float_spacing_still_moves_past_time() {
        // at 1e20 neighbouring doubles are 16384 apart, far more than 60
        let next = 1.0e20;
        let time = next + 1.0e5;
        let advanced = advance_boundary(next, 60.0, time);
        assert!(advanced >= time);
        assert_eq!(advance_boundary(next, 60.0, next), next);
    }

    #[test]
    fn stepping_requires_a_started_run() {
        let mut it = Integrator::new(binary(), 0.0, &config(0.0, 1.0, 100.0)).unwrap();
        assert!(matches!(it.step(), Err(NbodyError::InvalidPhase(Phase::Init))));
        assert_eq!(it.time(), 0.0);
        assert_eq!(it.steps(), 0);

        it.start(&mut Recorder::default()).unwrap();
        assert!(it.step().unwrap() < 1.0);
    }

    #[test]
    fn final_record_is_not_repeated_on_an_exact_boundary() {
        let system = ParticleSystem::from_masses(&[Mass::new(
            1.0,
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
        )]);
        // a lone body steps straight to the end, which is also a diagnostics boundary
        let mut it = Integrator::new(system, 0.0, &config(4.0, 10.0, 4.0)).unwrap();
        let mut rec = Recorder::default();
        it.run(&mut rec).unwrap();
        assert_eq!(rec.diagnostics, vec![(0.0, 0), (4.0, 1)]);
        assert!(rec.finalized);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let cfg = RunConfig { accuracy: -1.0, ..RunConfig::default() };
        assert!(Integrator::new(binary(), 0.0, &cfg).is_err());
    }

    #[test]
    fn step_size_follows_collision_time() {
        let mut it = Integrator::new(binary(), 0.0, &config(0.0, 1.0, 1.0)).unwrap();
        it.start(&mut Recorder::default()).unwrap();
        let expected = 10.0 * it.forces().collision_time();
        assert_relative_eq!(it.next_step_size(), expected);
        let dt = it.step().unwrap();
        assert_relative_eq!(dt, expected);
        assert_relative_eq!(it.time(), expected);
        assert_eq!(it.steps(), 1);
    }

    #[test]
    fn emissions_follow_intervals() {
        let mut it = Integrator::new(binary(), 2.0, &config(0.5, 1.0, 3.0)).unwrap();
        let mut rec = Recorder::default();
        let summary = it.run(&mut rec).unwrap();

        assert!(summary.final_time >= 5.0);
        assert_eq!(summary.steps, it.steps());
        assert!(rec.finalized);
        assert_eq!(it.phase(), Phase::Done);

        // initial record at the start time, then one per crossed boundary
        assert_eq!(rec.snapshots[0], (2.0, 0));
        assert_eq!(rec.diagnostics[0], (2.0, 0));
        assert_eq!(rec.snapshots.len(), 4);
        assert!(rec.diagnostics.len() >= 7);
        for (k, &(t, _)) in rec.snapshots.iter().enumerate().skip(1) {
            assert!(t >= 2.0 + k as f64, "snapshot {k} at {t}");
        }
        assert_eq!(rec.diagnostics.last().unwrap().0, it.time());
    }

    #[test]
    fn without_interval_diagnostics_only_at_ends() {
        let mut it = Integrator::new(binary(), 0.0, &config(0.0, 100.0, 1.0)).unwrap();
        let mut rec = Recorder::default();
        it.run(&mut rec).unwrap();
        assert_eq!(rec.diagnostics.len(), 2);
        assert_eq!(rec.diagnostics[0], (0.0, 0));
        assert_eq!(rec.diagnostics[1].1, it.steps());
        assert_eq!(rec.snapshots.len(), 1);
    }

    #[test]
    fn zero_duration_runs_no_steps() {
        let mut it = Integrator::new(binary(), 0.0, &config(0.0, 1.0, 0.0)).unwrap();
        let mut rec = Recorder::default();
        let summary = it.run(&mut rec).unwrap();
        assert_eq!(summary.steps, 0);
        assert_eq!(rec.diagnostics, vec![(0.0, 0), (0.0, 0)]);
        assert_eq!(rec.snapshots, vec![(0.0, 0)]);
    }

    #[test]
    fn lone_body_coasts_to_end_in_one_step() {
        let system = ParticleSystem::from_masses(&[Mass::new(
            1.0,
            Vector2::new(1.0, 2.0),
            Vector2::new(0.5, 0.0),
        )]);
        let mut it = Integrator::new(system, 0.0, &config(0.0, 10.0, 4.0)).unwrap();
        it.run(&mut Recorder::default()).unwrap();
        assert_eq!(it.steps(), 1);
        assert_eq!(it.time(), 4.0);
        assert_relative_eq!(it.system().positions()[0], Vector2::new(3.0, 2.0));
    }
}
