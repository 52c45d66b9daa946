// src/mass.rs

use crate::scale::{mass_to_external, mass_to_internal};
use nalgebra::SVector;
use std::fmt;

/// Position / velocity / acceleration vector of a `D`-dimensional run.
pub type Vector<const D: usize> = SVector<f64, D>;

/// A single body in external units, as it appears in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mass<const D: usize> {
    pub mass: f64,
    pub position: Vector<D>,
    pub velocity: Vector<D>,
}

impl<const D: usize> Mass<D> {
    pub fn new(mass: f64, position: Vector<D>, velocity: Vector<D>) -> Self {
        Mass {
            mass,
            position,
            velocity,
        }
    }
}

impl<const D: usize> fmt::Display for Mass<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mass(m={:.2e}, p=[", self.mass)?;
        write_components(f, &self.position)?;
        write!(f, "], v=[")?;
        write_components(f, &self.velocity)?;
        write!(f, "])")
    }
}

fn write_components<const D: usize>(f: &mut fmt::Formatter<'_>, v: &Vector<D>) -> fmt::Result {
    for (k, x) in v.iter().enumerate() {
        if k > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{:.2e}", x)?;
    }
    Ok(())
}

/// Struct-of-arrays state of an N-body run.
///
/// Masses are stored pre-multiplied by `G` for the whole lifetime of the
/// system. All three arrays have the same length `n`, fixed at construction;
/// callers only ever get slices, so nothing can resize them mid-run.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSystem<const D: usize> {
    masses: Vec<f64>,
    positions: Vec<Vector<D>>,
    velocities: Vec<Vector<D>>,
}

impl<const D: usize> ParticleSystem<D> {
    /// Builds a system from bodies in external units, scaling each mass by `G`.
    pub fn from_masses(bodies: &[Mass<D>]) -> Self {
        Self {
            masses: bodies.iter().map(|b| mass_to_internal(b.mass)).collect(),
            positions: bodies.iter().map(|b| b.position).collect(),
            velocities: bodies.iter().map(|b| b.velocity).collect(),
        }
    }

    /// Builds a system from already scaled masses.
    ///
    /// Panics if the arrays differ in length.
    pub fn from_internal(
        masses: Vec<f64>,
        positions: Vec<Vector<D>>,
        velocities: Vec<Vector<D>>,
    ) -> Self {
        assert_eq!(masses.len(), positions.len(), "one position per mass");
        assert_eq!(masses.len(), velocities.len(), "one velocity per mass");
        Self {
            masses,
            positions,
            velocities,
        }
    }

    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    /// Number of unordered particle pairs, `n(n-1)/2`.
    pub fn pair_count(&self) -> usize {
        pair_count(self.len())
    }

    /// Scaled masses (`G * m`).
    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn positions(&self) -> &[Vector<D>] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vector<D>] {
        &self.velocities
    }

    /// Mutable access to positions and velocities at once.
    pub fn phase_space_mut(&mut self) -> (&mut [Vector<D>], &mut [Vector<D>]) {
        (&mut self.positions, &mut self.velocities)
    }

    /// Bodies converted back to external units.
    pub fn to_masses(&self) -> Vec<Mass<D>> {
        self.masses
            .iter()
            .zip(&self.positions)
            .zip(&self.velocities)
            .map(|((&m, &p), &v)| Mass::new(mass_to_external(m), p, v))
            .collect()
    }

    fn total_mass(&self) -> f64 {
        self.masses.iter().sum()
    }

    pub fn center_of_mass(&self) -> Vector<D> {
        let weighted: Vector<D> = self
            .masses
            .iter()
            .zip(&self.positions)
            .map(|(&m, p)| p * m)
            .sum();
        weighted / self.total_mass()
    }

    /// Total momentum, in scaled-mass units.
    pub fn total_momentum(&self) -> Vector<D> {
        self.masses
            .iter()
            .zip(&self.velocities)
            .map(|(&m, v)| v * m)
            .sum()
    }

    /// Kinetic energy, in scaled-mass units.
    pub fn kinetic_energy(&self) -> f64 {
        self.masses
            .iter()
            .zip(&self.velocities)
            .map(|(&m, v)| 0.5 * m * v.norm_squared())
            .sum()
    }

    /// Moves the center of mass to the origin and removes net momentum.
    ///
    /// A system without mass has no center and is left untouched.
    pub fn normalize_to_center_of_mass(&mut self) {
        let total = self.total_mass();
        if total == 0.0 {
            return;
        }
        let offset = self.center_of_mass();
        let drift = self.total_momentum() / total;
        for p in &mut self.positions {
            *p -= offset;
        }
        for v in &mut self.velocities {
            *v -= drift;
        }
    }
}

/// Number of unordered pairs among `n` particles.
pub fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}
