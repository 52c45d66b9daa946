//! Pairwise gravity kernel for the Hermite scheme.
//!
//! One sweep over all unordered pairs `(i, j)`, `i < j`, yields everything the
//! integrator needs at a given instant: accelerations, jerks, the potential
//! energy, a collision-time estimate for step-size control, and the list of
//! pair distances that is written out with each snapshot.
//!
//! ```text
//!          G m_j                       G m_j  |           r_ji . v_ji        |
//!  a_ji = -------- r_ji ;    j_ji = --------  | v_ji - 3 ------------- r_ji   |
//!         |r_ji|^3                  |r_ji|^3  |            |r_ji|^2          |
//! ```
//!
//! Masses arrive pre-multiplied by `G`, so the loop itself never touches the
//! constant except in the free-fall collision estimate.

use crate::mass::{pair_count, ParticleSystem, Vector};
use crate::scale::G;
use rayon::prelude::*;

/// Everything evaluated at one instant of the run.
///
/// Buffers are allocated once for `n` particles and overwritten on every
/// evaluation. `distances` is indexed in canonical pair order:
/// `(0,1), (0,2), .., (0,n-1), (1,2), .., (n-2,n-1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForceState<const D: usize> {
    pub(crate) acc: Vec<Vector<D>>,
    pub(crate) jerk: Vec<Vector<D>>,
    pub(crate) potential: f64,
    pub(crate) collision_time: f64,
    pub(crate) distances: Vec<f64>,
}

impl<const D: usize> ForceState<D> {
    pub fn new(n: usize) -> Self {
        Self {
            acc: vec![Vector::zeros(); n],
            jerk: vec![Vector::zeros(); n],
            potential: 0.0,
            collision_time: f64::INFINITY,
            distances: vec![0.0; pair_count(n)],
        }
    }

    /// Serial evaluation into a freshly allocated state.
    pub fn evaluate(system: &ParticleSystem<D>) -> Self {
        let mut state = Self::new(system.len());
        ForceEvaluator::Serial.evaluate(system, &mut state);
        state
    }

    pub fn acc(&self) -> &[Vector<D>] {
        &self.acc
    }

    pub fn jerk(&self) -> &[Vector<D>] {
        &self.jerk
    }

    /// Potential energy in scaled-mass units (one surplus factor of `G`).
    pub fn potential(&self) -> f64 {
        self.potential
    }

    /// Time scale of the closest encounter; `+inf` with fewer than two bodies.
    pub fn collision_time(&self) -> f64 {
        self.collision_time
    }

    pub fn distances(&self) -> &[f64] {
        &self.distances
    }
}

/// How the pair sweep is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForceEvaluator {
    /// Single-threaded double loop.
    #[default]
    Serial,
    /// Rayon fold/reduce over the rows of the pair triangle. Sums may differ
    /// from `Serial` by rounding; distances are identical.
    Parallel,
}

impl ForceEvaluator {
    /// Overwrites `out` with the forces of `system`.
    ///
    /// Coincident particles give non-finite results; nothing guards
    /// against it.
    pub fn evaluate<const D: usize>(&self, system: &ParticleSystem<D>, out: &mut ForceState<D>) {
        debug_assert_eq!(out.acc.len(), system.len());
        debug_assert_eq!(out.distances.len(), system.pair_count());
        match self {
            ForceEvaluator::Serial => evaluate_serial(system, out),
            ForceEvaluator::Parallel => evaluate_parallel(system, out),
        }
    }
}

/// Contribution of one pair, per unit mass of the partner.
struct PairTerms<const D: usize> {
    r: f64,
    da: Vector<D>,
    dj: Vector<D>,
    /// Smaller of the two collision-time estimates, to the fourth power.
    collision_q: f64,
}

#[inline(always)]
fn pair_terms<const D: usize>(
    mi: f64,
    mj: f64,
    pi: &Vector<D>,
    pj: &Vector<D>,
    vi: &Vector<D>,
    vj: &Vector<D>,
) -> PairTerms<D> {
    let rji = pj - pi;
    let vji = vj - vi;

    let r2 = rji.norm_squared();
    let v2 = vji.norm_squared();
    let rv_r2 = rji.dot(&vji) / r2;

    let r = r2.sqrt();
    let r3 = r * r2;

    let da = rji / r3;
    let dj = (vji - rji * (3.0 * rv_r2)) / r3;
    let da2 = da.norm_squared();

    // unaccelerated approach
    let free_streaming = (r2 * r2) / (v2 * v2);
    // free fall; both masses already carry G, divide one back out
    let mij = mi + mj;
    let free_fall = G * r2 / (da2 * mij * mij);

    PairTerms {
        r,
        da,
        dj,
        collision_q: free_streaming.min(free_fall),
    }
}

#[inline(always)]
fn apply_pair<const D: usize>(
    acc: &mut [Vector<D>],
    jerk: &mut [Vector<D>],
    (i, j): (usize, usize),
    (mi, mj): (f64, f64),
    terms: &PairTerms<D>,
) {
    acc[i] += terms.da * mj;
    acc[j] -= terms.da * mi;
    jerk[i] += terms.dj * mj;
    jerk[j] -= terms.dj * mi;
}

fn evaluate_serial<const D: usize>(system: &ParticleSystem<D>, out: &mut ForceState<D>) {
    let n = system.len();
    let mass = system.masses();
    let pos = system.positions();
    let vel = system.velocities();

    out.acc.fill(Vector::zeros());
    out.jerk.fill(Vector::zeros());
    let mut potential = 0.0;
    let mut collision_q = f64::INFINITY;

    let mut p = 0;
    for i in 0..n {
        for j in (i + 1)..n {
            let terms = pair_terms(mass[i], mass[j], &pos[i], &pos[j], &vel[i], &vel[j]);
            out.distances[p] = terms.r;
            p += 1;

            apply_pair(&mut out.acc, &mut out.jerk, (i, j), (mass[i], mass[j]), &terms);
            potential -= mass[i] * mass[j] / terms.r;
            collision_q = collision_q.min(terms.collision_q);
        }
    }

    out.potential = potential;
    out.collision_time = collision_q.sqrt().sqrt();
}

/// Per-worker accumulator for the parallel sweep.
struct Partial<const D: usize> {
    acc: Vec<Vector<D>>,
    jerk: Vec<Vector<D>>,
    potential: f64,
    collision_q: f64,
}

impl<const D: usize> Partial<D> {
    fn zeros(n: usize) -> Self {
        Self {
            acc: vec![Vector::zeros(); n],
            jerk: vec![Vector::zeros(); n],
            potential: 0.0,
            collision_q: f64::INFINITY,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.acc.iter_mut().zip(&other.acc) {
            *a += b;
        }
        for (a, b) in self.jerk.iter_mut().zip(&other.jerk) {
            *a += b;
        }
        self.potential += other.potential;
        self.collision_q = self.collision_q.min(other.collision_q);
        self
    }
}

/// Splits the distance list into one slice per row `i`, holding pairs
/// `(i, i+1) .. (i, n-1)`.
fn split_rows(distances: &mut [f64], n: usize) -> Vec<&mut [f64]> {
    let mut rows = Vec::with_capacity(n);
    let mut rest = distances;
    for i in 0..n {
        let (row, tail) = std::mem::take(&mut rest).split_at_mut(n - i - 1);
        rows.push(row);
        rest = tail;
    }
    rows
}

fn evaluate_parallel<const D: usize>(system: &ParticleSystem<D>, out: &mut ForceState<D>) {
    let n = system.len();
    let mass = system.masses();
    let pos = system.positions();
    let vel = system.velocities();

    let total = split_rows(&mut out.distances, n)
        .into_par_iter()
        .enumerate()
        .fold(
            || Partial::zeros(n),
            |mut part, (i, row)| {
                for (slot, j) in row.iter_mut().zip((i + 1)..n) {
                    let terms = pair_terms(mass[i], mass[j], &pos[i], &pos[j], &vel[i], &vel[j]);
                    *slot = terms.r;
                    apply_pair(&mut part.acc, &mut part.jerk, (i, j), (mass[i], mass[j]), &terms);
                    part.potential -= mass[i] * mass[j] / terms.r;
                    part.collision_q = part.collision_q.min(terms.collision_q);
                }
                part
            },
        )
        .reduce(|| Partial::zeros(n), Partial::merge);

    out.acc.copy_from_slice(&total.acc);
    out.jerk.copy_from_slice(&total.jerk);
    out.potential = total.potential;
    out.collision_time = total.collision_q.sqrt().sqrt();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mass::Mass;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use itertools::Itertools;
    use nalgebra::Vector2;

    fn internal(masses: &[f64], pos: &[[f64; 2]], vel: &[[f64; 2]]) -> ParticleSystem<2> {
        ParticleSystem::from_internal(
            masses.to_vec(),
            pos.iter().map(|p| Vector2::new(p[0], p[1])).collect(),
            vel.iter().map(|v| Vector2::new(v[0], v[1])).collect(),
        )
    }

    fn scattered(n: usize) -> ParticleSystem<2> {
        let bodies: Vec<Mass<2>> = (0..n)
            .map(|i| {
                let phase = i as f64 * 1.7;
                Mass::new(
                    1.0e10 * (1.0 + i as f64),
                    Vector2::new(3.0 * phase.cos() + i as f64, 2.0 * phase.sin()),
                    Vector2::new(0.1 * phase.sin(), -0.2 * phase.cos()),
                )
            })
            .collect();
        ParticleSystem::from_masses(&bodies)
    }

    #[test]
    fn distances_follow_canonical_pair_order() {
        let sys = internal(
            &[1.0, 1.0, 1.0],
            &[[0.0, 0.0], [3.0, 0.0], [0.0, 4.0]],
            &[[0.0, 0.0]; 3],
        );
        let forces = ForceState::evaluate(&sys);
        assert_eq!(forces.distances().len(), 3);
        assert_relative_eq!(forces.distances()[0], 3.0);
        assert_relative_eq!(forces.distances()[1], 4.0);
        assert_relative_eq!(forces.distances()[2], 5.0);
    }

    #[test]
    fn distance_list_matches_pair_enumeration() {
        let sys = scattered(7);
        let forces = ForceState::evaluate(&sys);
        let expected: Vec<f64> = (0..sys.len())
            .tuple_combinations()
            .map(|(i, j)| (sys.positions()[j] - sys.positions()[i]).norm())
            .collect();
        assert_eq!(forces.distances().len(), 21);
        for (got, want) in forces.distances().iter().zip(&expected) {
            assert_relative_eq!(*got, *want, max_relative = 1e-15);
        }
    }

    #[test]
    fn fewer_than_two_bodies_have_no_interaction() {
        for n in 0..2 {
            let sys = scattered(n);
            let forces = ForceState::evaluate(&sys);
            assert_eq!(forces.potential(), 0.0);
            assert_eq!(forces.collision_time(), f64::INFINITY);
            assert!(forces.distances().is_empty());
            assert!(forces.acc().iter().all(|a| a.norm() == 0.0));
        }
    }

    #[test]
    fn two_body_acceleration_and_potential() {
        let sys = internal(&[2.0, 3.0], &[[0.0, 0.0], [2.0, 0.0]], &[[0.0, 0.0]; 2]);
        let forces = ForceState::evaluate(&sys);
        // |a_0| = m_1 / r^2, pointing at body 1
        assert_relative_eq!(forces.acc()[0].x, 3.0 / 4.0);
        assert_relative_eq!(forces.acc()[1].x, -2.0 / 4.0);
        assert_abs_diff_eq!(forces.acc()[0].y, 0.0);
        assert_relative_eq!(forces.potential(), -6.0 / 2.0);
        // particles at rest have no jerk
        assert!(forces.jerk().iter().all(|j| j.norm() == 0.0));
    }

    #[test]
    fn jerk_of_receding_pair() {
        // radial recession at speed 1: j = (v - 3 (r.v / r^2) r) / r^3 = -2 v / r^3
        let sys = internal(&[1.0, 1.0], &[[0.0, 0.0], [1.0, 0.0]], &[[0.0, 0.0], [1.0, 0.0]]);
        let forces = ForceState::evaluate(&sys);
        assert_relative_eq!(forces.jerk()[0].x, -2.0);
        assert_relative_eq!(forces.jerk()[1].x, 2.0);
    }

    #[test]
    fn pair_forces_conserve_momentum() {
        let sys = scattered(6);
        let forces = ForceState::evaluate(&sys);
        let net_force: Vector2<f64> = sys
            .masses()
            .iter()
            .zip(forces.acc())
            .map(|(&m, a)| a * m)
            .sum();
        let net_jerk: Vector2<f64> = sys
            .masses()
            .iter()
            .zip(forces.jerk())
            .map(|(&m, j)| j * m)
            .sum();
        let force_scale: f64 = sys
            .masses()
            .iter()
            .zip(forces.acc())
            .map(|(&m, a)| (a * m).norm())
            .sum();
        let jerk_scale: f64 = sys
            .masses()
            .iter()
            .zip(forces.jerk())
            .map(|(&m, j)| (j * m).norm())
            .sum();
        assert!(net_force.norm() <= 1e-14 * force_scale);
        assert!(net_jerk.norm() <= 1e-14 * jerk_scale);
    }

    #[test]
    fn collision_time_uses_smaller_estimate() {
        // approaching fast: free streaming wins
        let fast = internal(&[1.0, 1.0], &[[0.0, 0.0], [1.0, 0.0]], &[[0.0, 0.0], [-1.0e6, 0.0]]);
        let t_fast = ForceState::evaluate(&fast).collision_time();
        assert_relative_eq!(t_fast, 1.0e-6, max_relative = 1e-12);

        // at rest: only free fall is finite, (G r^2 / (da^2 (mi+mj)^2))^(1/4)
        let rest = internal(&[1.0, 1.0], &[[0.0, 0.0], [1.0, 0.0]], &[[0.0, 0.0]; 2]);
        let t_rest = ForceState::evaluate(&rest).collision_time();
        assert_relative_eq!(t_rest, (G / 4.0).sqrt().sqrt(), max_relative = 1e-12);
    }

    #[test]
    fn collision_time_shrinks_with_separation() {
        let mut previous = f64::INFINITY;
        for r in [4.0, 2.0, 1.0, 0.5, 0.25, 0.125] {
            let sys = internal(&[1.0e-3, 2.0e-3], &[[0.0, 0.0], [r, 0.0]], &[[0.0, 0.1], [0.0, -0.1]]);
            let t = ForceState::evaluate(&sys).collision_time();
            assert!(t.is_finite() && t > 0.0);
            assert!(t < previous, "t({r}) = {t} not below {previous}");
            previous = t;
        }
    }

    #[test]
    fn parallel_sweep_matches_serial() {
        let sys = scattered(23);
        let serial = ForceState::evaluate(&sys);
        let mut parallel = ForceState::new(sys.len());
        ForceEvaluator::Parallel.evaluate(&sys, &mut parallel);

        assert_eq!(serial.distances(), parallel.distances());
        assert_relative_eq!(serial.potential(), parallel.potential(), max_relative = 1e-12);
        assert_relative_eq!(serial.collision_time(), parallel.collision_time());
        let largest = |v: &[Vector2<f64>]| v.iter().map(|x| x.norm()).fold(0.0, f64::max);
        let (acc_scale, jerk_scale) = (largest(serial.acc()), largest(serial.jerk()));
        for (a, b) in serial.acc().iter().zip(parallel.acc()) {
            assert_abs_diff_eq!((a - b).norm(), 0.0, epsilon = 1e-12 * acc_scale);
        }
        for (a, b) in serial.jerk().iter().zip(parallel.jerk()) {
            assert_abs_diff_eq!((a - b).norm(), 0.0, epsilon = 1e-12 * jerk_scale);
        }
    }

    #[test]
    fn evaluation_overwrites_previous_results() {
        let sys = scattered(4);
        let mut state = ForceState::evaluate(&sys);
        let first = state.clone();
        ForceEvaluator::Serial.evaluate(&sys, &mut state);
        assert_eq!(first, state);
    }
}
