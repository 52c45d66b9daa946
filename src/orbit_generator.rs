// src/orbit_generator.rs

use crate::mass::Mass;
use crate::scale::G;
use nalgebra::Vector2;
use rand::Rng;
use rand_distr::Uniform;

/// Two equal masses on a circular mutual orbit, centered on the origin.
pub fn circular_binary(mass: f64, separation: f64) -> Vec<Mass<2>> {
    let speed = (G * mass / (2.0 * separation)).sqrt();
    let half = separation / 2.0;
    vec![
        Mass::new(mass, Vector2::new(half, 0.0), Vector2::new(0.0, speed)),
        Mass::new(mass, Vector2::new(-half, 0.0), Vector2::new(0.0, -speed)),
    ]
}

/// A body on a counter-clockwise circular orbit around `central`, at
/// `distance` and polar `angle` (radians) relative to it.
pub fn circular_orbit(central: &Mass<2>, mass: f64, distance: f64, angle: f64) -> Mass<2> {
    let (sin, cos) = angle.sin_cos();
    let speed = (G * central.mass / distance).sqrt();
    Mass::new(
        mass,
        central.position + Vector2::new(cos, sin) * distance,
        central.velocity + Vector2::new(-sin, cos) * speed,
    )
}

/// Vis-viva speed of a bound orbit with periapsis at `relative_position`,
/// directed along the counter-clockwise tangent.
fn generate_orbital_velocity<R: Rng + ?Sized>(
    rng: &mut R,
    relative_position: Vector2<f64>,
    central_mass: f64,
) -> Vector2<f64> {
    let r = relative_position.norm();
    // any semi-major axis from r outward
    let semi_major = r / (1.0 - rng.random::<f64>());
    let speed = (G * central_mass * (2.0 / r - 1.0 / semi_major)).sqrt();
    Vector2::new(-relative_position.y, relative_position.x) * (speed / r)
}

/// Uniform position in the square `[-bounds, bounds]^2`, at least
/// `min_distance` from every body placed so far.
fn generate_unique_position<R: Rng + ?Sized>(
    rng: &mut R,
    existing: &[Mass<2>],
    bounds: f64,
    min_distance: f64,
) -> Option<Vector2<f64>> {
    let range = Uniform::new_inclusive(-bounds, bounds).ok()?;
    (0..200)
        .map(|_| Vector2::new(rng.sample(&range), rng.sample(&range)))
        .find(|p| existing.iter().all(|body| (p - body.position).norm() >= min_distance))
}

/// Generates a system of `n_central_masses` stars with the remaining
/// `n_masses - n_central_masses` planets on bound orbits around them.
///
/// Stars come first in the returned list. Returns `None` when the counts are
/// inconsistent or no free position could be found.
pub fn generate_random_orbits<R: Rng + ?Sized>(
    rng: &mut R,
    n_masses: u32,
    n_central_masses: u32,
) -> Option<Vec<Mass<2>>> {
    let n_orbiting = n_masses.checked_sub(n_central_masses)?;
    if n_central_masses == 0 {
        return (n_orbiting == 0).then(Vec::new);
    }
    let stars = n_central_masses as usize;
    let mut bodies: Vec<Mass<2>> = Vec::with_capacity(n_masses as usize);

    while bodies.len() < n_masses as usize {
        let is_star = bodies.len() < stars;
        let mass = if is_star {
            rng.random_range(2e29..3e30)
        } else {
            rng.random_range(1e21..1e25)
        };
        let position = generate_unique_position(rng, &bodies, 1e11, 1e10)?;

        // the first star rests at its spot, everything else orbits an earlier star
        let velocity = if bodies.is_empty() {
            Vector2::zeros()
        } else {
            let host = bodies[rng.random_range(0..bodies.len().min(stars))];
            host.velocity + generate_orbital_velocity(rng, position - host.position, host.mass)
        };
        bodies.push(Mass::new(mass, position, velocity));
    }
    Some(bodies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn binary_has_zero_momentum_and_circular_speed() {
        let bodies = circular_binary(2.0e20, 4.0e6);
        let p: Vector2<f64> = bodies.iter().map(|b| b.velocity * b.mass).sum();
        assert_eq!(p, Vector2::zeros());
        // relative speed^2 = G (m1 + m2) / d on a circular orbit
        let rel = (bodies[0].velocity - bodies[1].velocity).norm_squared();
        assert_relative_eq!(rel, G * 4.0e20 / 4.0e6, max_relative = 1e-12);
    }

    #[test]
    fn circular_orbit_is_tangent_and_at_distance() {
        let sun = Mass::new(1.59128e29, Vector2::new(1.0, 2.0), Vector2::new(3.0, 0.0));
        let planet = circular_orbit(&sun, 5.972e24, 2.5e9, 300f64.to_radians());
        let r = planet.position - sun.position;
        let v = planet.velocity - sun.velocity;
        assert_relative_eq!(r.norm(), 2.5e9, max_relative = 1e-12);
        assert_relative_eq!(r.dot(&v) / (r.norm() * v.norm()), 0.0, epsilon = 1e-12);
        assert_relative_eq!(v.norm_squared(), G * sun.mass / 2.5e9, max_relative = 1e-12);
    }

    #[test]
    fn random_orbits_are_bound_and_spread_out() {
        let mut rng = StdRng::seed_from_u64(7);
        let bodies = generate_random_orbits(&mut rng, 6, 2).unwrap();
        assert_eq!(bodies.len(), 6);
        assert_eq!(bodies[0].velocity, Vector2::zeros());
        for (i, a) in bodies.iter().enumerate() {
            for b in &bodies[i + 1..] {
                assert!((a.position - b.position).norm() >= 1e10);
            }
        }
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let a = generate_random_orbits(&mut StdRng::seed_from_u64(11), 4, 1).unwrap();
        let b = generate_random_orbits(&mut StdRng::seed_from_u64(11), 4, 1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn inconsistent_counts_yield_none() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(generate_random_orbits(&mut rng, 2, 3).is_none());
        assert!(generate_random_orbits(&mut rng, 2, 0).is_none());
        assert_eq!(generate_random_orbits(&mut rng, 0, 0), Some(vec![]));
    }
}
