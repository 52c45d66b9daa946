//! Plain-text snapshot format.
//!
//! ```text
//! n t
//! m_1 x_1 .. v_1 ..
//! ..
//! m_n x_n .. v_n ..
//! d_01 d_02 .. d_(n-2)(n-1)
//! ```
//!
//! The trailing distance line is written for convenience and is optional on
//! input, so any output stream can be fed back in to resume a run.

use crate::error::{NbodyError, NbodyResult};
use crate::mass::{pair_count, Mass, ParticleSystem, Vector};
use std::io::{BufRead, Lines, Write};

/// One snapshot in external units, exactly as read.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<const D: usize> {
    pub time: f64,
    pub bodies: Vec<Mass<D>>,
    /// The distance line, when present and complete.
    pub distances: Option<Vec<f64>>,
}

impl<const D: usize> Snapshot<D> {
    /// Hands the snapshot to the integrator: masses are scaled by `G` and the
    /// system is moved to its center-of-mass frame.
    pub fn into_system(self) -> (f64, ParticleSystem<D>) {
        let mut system = ParticleSystem::from_masses(&self.bodies);
        system.normalize_to_center_of_mass();
        (self.time, system)
    }
}

/// Reads successive snapshots from a text stream.
pub struct SnapshotReader<R, const D: usize> {
    lines: Lines<R>,
    line_no: usize,
    pending: Option<String>,
}

impl<R: BufRead, const D: usize> SnapshotReader<R, D> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            pending: None,
        }
    }

    fn next_line(&mut self) -> NbodyResult<Option<String>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        match self.lines.next() {
            None => Ok(None),
            Some(line) => {
                self.line_no += 1;
                Ok(Some(line?))
            }
        }
    }

    fn parse_error(&self, message: impl Into<String>) -> NbodyError {
        NbodyError::Parse {
            line: self.line_no,
            message: message.into(),
        }
    }

    fn parse_values(&self, line: &str) -> NbodyResult<Vec<f64>> {
        line.split_whitespace()
            .map(|tok| {
                tok.parse::<f64>()
                    .map_err(|e| self.parse_error(format!("{tok:?}: {e}")))
            })
            .collect()
    }

    fn parse_header(&self, line: &str) -> NbodyResult<(usize, f64)> {
        let mut tokens = line.split_whitespace();
        let (Some(n), Some(t), None) = (tokens.next(), tokens.next(), tokens.next()) else {
            return Err(self.parse_error("header must be `<count> <time>`"));
        };
        let n = n
            .parse::<usize>()
            .map_err(|e| self.parse_error(format!("particle count {n:?}: {e}")))?;
        let t = t
            .parse::<f64>()
            .map_err(|e| self.parse_error(format!("time {t:?}: {e}")))?;
        Ok((n, t))
    }

    fn body(values: &[f64]) -> Mass<D> {
        Mass::new(
            values[0],
            Vector::from_column_slice(&values[1..=D]),
            Vector::from_column_slice(&values[1 + D..]),
        )
    }

    /// Reads the next snapshot, or `None` at a clean end of input.
    pub fn next_snapshot(&mut self) -> NbodyResult<Option<Snapshot<D>>> {
        let header = loop {
            match self.next_line()? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
            }
        };
        let (n, time) = self.parse_header(&header)?;

        // mass, D position and D velocity components per body, in a
        // whitespace-separated token stream that may wrap across lines
        let width = 1 + 2 * D;
        let mut bodies = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(width);
        while bodies.len() < n {
            let Some(line) = self.next_line()? else {
                return Err(NbodyError::Truncated {
                    expected: n,
                    found: bodies.len(),
                });
            };
            for value in self.parse_values(&line)? {
                if bodies.len() == n {
                    return Err(self.parse_error(format!(
                        "value {value} after the last of {n} bodies"
                    )));
                }
                values.push(value);
                if values.len() == width {
                    bodies.push(Self::body(&values));
                    values.clear();
                }
            }
        }

        // A count-line can never be mistaken for a distance line: n(n-1)/2 is never 2.
        let expected = pair_count(n);
        let distances = match self.next_line()? {
            None => None,
            Some(line) => match self.parse_values(&line) {
                Ok(values) if values.len() == expected => Some(values),
                _ => {
                    self.pending = Some(line);
                    None
                }
            },
        };

        Ok(Some(Snapshot {
            time,
            bodies,
            distances,
        }))
    }
}

impl<R: BufRead, const D: usize> Iterator for SnapshotReader<R, D> {
    type Item = NbodyResult<Snapshot<D>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_snapshot().transpose()
    }
}

/// Reads the first snapshot of `reader` and prepares it for integration.
pub fn read_initial_state<R: BufRead, const D: usize>(
    reader: R,
) -> NbodyResult<(f64, ParticleSystem<D>)> {
    let mut snapshots = SnapshotReader::<R, D>::new(reader);
    let snapshot = snapshots.next_snapshot()?.ok_or(NbodyError::EmptyInput)?;
    Ok(snapshot.into_system())
}

/// Writes `system` at `time`, with masses restored to external units and the
/// pair distances on a trailing line.
pub fn write_snapshot<W: Write, const D: usize>(
    out: &mut W,
    system: &ParticleSystem<D>,
    distances: &[f64],
    time: f64,
) -> NbodyResult<()> {
    writeln!(out, "{} {}", system.len(), time)?;
    for body in system.to_masses() {
        write!(out, "{:e}", body.mass)?;
        for x in body.position.iter().chain(body.velocity.iter()) {
            write!(out, " {x:e}")?;
        }
        writeln!(out)?;
    }
    let mut first = true;
    for d in distances {
        if !first {
            write!(out, " ")?;
        }
        write!(out, "{d:e}")?;
        first = false;
    }
    writeln!(out)?;
    Ok(())
}
