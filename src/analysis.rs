//! Post-processing of completed sweeps: running integration, resonance
//! midpoint extraction, and 2-D matrix assembly.

use ndarray::Array2;

use crate::error::FmrError;
use crate::sweep::{Channel, SweepResult};

/// Generates `n` linearly spaced samples in [start, stop].
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n as f64 - 1.0);
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Running integral of a mean-centered signal.
///
/// The signal is first centered so a flat background integrates to a
/// constant. A synthetic point one interval before `x[0]` seeds the first
/// interval width, then gets dropped again, so the output sequences have the
/// same length as the input. The sum is rectangle-rule:
/// `out[i] = out[i-1] + y[i] * (x'[i+1] - x'[i])`, seeded at `constant`.
pub fn integrate(x: &[f64], y: &[f64], constant: f64) -> Result<(Vec<f64>, Vec<f64>), FmrError> {
    if x.len() != y.len() {
        return Err(FmrError::LengthMismatch {
            left: x.len(),
            right: y.len(),
        });
    }
    if x.len() < 2 {
        return Err(FmrError::TooFewPoints { needed: 2, got: x.len() });
    }

    let mean = y.iter().sum::<f64>() / y.len() as f64;
    let centered: Vec<f64> = y.iter().map(|v| v - mean).collect();

    let mut grid = Vec::with_capacity(x.len() + 1);
    grid.push(x[0] - (x[1] - x[0]));
    grid.extend_from_slice(x);

    let mut running = Vec::with_capacity(x.len());
    let mut sum = constant;
    for i in 0..x.len() {
        sum += centered[i] * (grid[i + 1] - grid[i]);
        running.push(sum);
    }

    Ok((grid[1..].to_vec(), running))
}

fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v < values[best] {
            best = i;
        }
    }
    best
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Resonance midpoint: the set-point halfway between a channel's extremes.
/// With `Channel::Both` the two per-channel midpoints are averaged.
pub fn find_midpoint(
    setpoints: &[f64],
    x: &[f64],
    y: &[f64],
    channel: Channel,
) -> Result<f64, FmrError> {
    if setpoints.len() != x.len() || setpoints.len() != y.len() {
        return Err(FmrError::LengthMismatch {
            left: setpoints.len(),
            right: x.len().max(y.len()),
        });
    }
    if setpoints.is_empty() {
        return Err(FmrError::TooFewPoints { needed: 1, got: 0 });
    }
    let midpoint = |values: &[f64]| (setpoints[argmin(values)] + setpoints[argmax(values)]) / 2.0;
    Ok(match channel {
        Channel::X => midpoint(x),
        Channel::Y => midpoint(y),
        Channel::Both => (midpoint(x) + midpoint(y)) / 2.0,
    })
}

/// Midpoint of a completed sweep's own axis.
pub fn sweep_midpoint(sweep: &SweepResult, channel: Channel) -> Result<f64, FmrError> {
    find_midpoint(&sweep.setpoints, &sweep.x, &sweep.y, channel)
}

/// Assemble the rows of a 2-D sweep into a matrix, one inner sweep per row,
/// optionally replacing each row with its running integral. All sweeps must
/// be complete and equally long.
pub fn channel_matrix(
    sweeps: &[SweepResult],
    channel: Channel,
    integrate_rows: bool,
) -> Result<Array2<f64>, FmrError> {
    let first = sweeps.first().ok_or(FmrError::EmptyAxis)?;
    let cols = first.len();
    let mut matrix = Array2::zeros((sweeps.len(), cols));
    for (i, sweep) in sweeps.iter().enumerate() {
        if sweep.len() != cols {
            return Err(FmrError::LengthMismatch {
                left: cols,
                right: sweep.len(),
            });
        }
        let values = sweep.channel(channel)?;
        let row: Vec<f64> = if integrate_rows {
            integrate(&sweep.setpoints, values, 0.0)?.1
        } else {
            values.to_vec()
        };
        for (j, v) in row.iter().enumerate() {
            matrix[[i, j]] = *v;
        }
    }
    Ok(matrix)
}
