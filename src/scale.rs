// src/scale.rs

/// Gravitational constant in SI units.
pub const G: f64 = 6.67384e-11;

/// Masses are carried internally as `G * m`, so the force loop never
/// multiplies by `G`. These helpers are the only place the factor is
/// applied or removed.
pub fn mass_to_internal(mass: f64) -> f64 {
    G * mass
}

pub fn mass_to_external(mass: f64) -> f64 {
    mass / G
}

/// Kinetic energy computed from scaled masses and potential energy computed
/// from two scaled masses both carry one surplus factor of `G`.
pub fn energy_to_external(energy: f64) -> f64 {
    energy / G
}
