use crate::forces::{ForceEvaluator, ForceState};
use crate::mass::{ParticleSystem, Vector};
use itertools::izip;

/// Phase-space state and forces captured immediately before a step.
///
/// Owned separately from the live system so that the corrector always
/// reads the pre-step values, never the predicted ones.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSnapshot<const D: usize> {
    pos: Vec<Vector<D>>,
    vel: Vec<Vector<D>>,
    acc: Vec<Vector<D>>,
    jerk: Vec<Vector<D>>,
}

impl<const D: usize> StepSnapshot<D> {
    pub fn new(n: usize) -> Self {
        Self {
            pos: vec![Vector::zeros(); n],
            vel: vec![Vector::zeros(); n],
            acc: vec![Vector::zeros(); n],
            jerk: vec![Vector::zeros(); n],
        }
    }

    /// Overwrites the snapshot with the current state.
    pub fn capture(&mut self, system: &ParticleSystem<D>, forces: &ForceState<D>) {
        self.pos.copy_from_slice(system.positions());
        self.vel.copy_from_slice(system.velocities());
        self.acc.copy_from_slice(forces.acc());
        self.jerk.copy_from_slice(forces.jerk());
    }
}

/// Taylor expansion of position and velocity through the jerk term.
pub fn predict<const D: usize>(
    pos: &mut [Vector<D>],
    vel: &mut [Vector<D>],
    acc: &[Vector<D>],
    jerk: &[Vector<D>],
    dt: f64,
) {
    let dt2_half = dt * dt / 2.0;
    let dt3_sixth = dt * dt * dt / 6.0;
    for (p, v, a, j) in izip!(pos, vel, acc, jerk) {
        *p += *v * dt + a * dt2_half + j * dt3_sixth;
        *v += a * dt + j * dt2_half;
    }
}

/// Single Hermite correction from the old and the predicted forces.
///
/// Velocity is corrected first; the position update uses the corrected
/// velocity.
pub fn correct<const D: usize>(
    pos: &mut [Vector<D>],
    vel: &mut [Vector<D>],
    acc: &[Vector<D>],
    jerk: &[Vector<D>],
    old: &StepSnapshot<D>,
    dt: f64,
) {
    let dt_half = dt / 2.0;
    let dt2_twelfth = dt * dt / 12.0;
    for (p, v, a, j, p0, v0, a0, j0) in izip!(pos, vel, acc, jerk, &old.pos, &old.vel, &old.acc, &old.jerk)
    {
        *v = v0 + (a0 + a) * dt_half + (j0 - j) * dt2_twelfth;
        *p = p0 + (v0 + *v) * dt_half + (a0 - a) * dt2_twelfth;
    }
}

/// Advances `system` by one Hermite step of size `dt`.
///
/// On entry `forces` must hold the forces of the current state; on return it
/// holds the forces evaluated at the predicted state, which become the
/// starting forces of the next step.
pub fn hermite_step<const D: usize>(
    evaluator: ForceEvaluator,
    system: &mut ParticleSystem<D>,
    forces: &mut ForceState<D>,
    previous: &mut StepSnapshot<D>,
    dt: f64,
) {
    previous.capture(system, forces);

    let (pos, vel) = system.phase_space_mut();
    predict(pos, vel, forces.acc(), forces.jerk(), dt);

    evaluator.evaluate(system, forces);

    let (pos, vel) = system.phase_space_mut();
    correct(pos, vel, forces.acc(), forces.jerk(), previous, dt);
}
