//! Persists sweep data as column-oriented CSV files.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use ndarray::Array2;

use crate::error::FmrError;
use crate::sweep::{AxisKind, SweepResult};

/// Write named columns as CSV. All columns must be equally long.
pub fn write_table(path: &Path, columns: &[(&str, &[f64])]) -> Result<(), FmrError> {
    if let Some((_, first)) = columns.first() {
        for (_, col) in columns {
            if col.len() != first.len() {
                return Err(FmrError::LengthMismatch {
                    left: first.len(),
                    right: col.len(),
                });
            }
        }
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    let header: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
    writeln!(w, "{}", header.join(","))?;
    let rows = columns.first().map_or(0, |(_, col)| col.len());
    for row in 0..rows {
        let line: Vec<String> = columns.iter().map(|(_, col)| col[row].to_string()).collect();
        writeln!(w, "{}", line.join(","))?;
    }
    w.flush()?;
    Ok(())
}

/// Descriptive file stem in the lab's naming convention, e.g.
/// `freq_9.4000_GHz_field_0.0000-3000.0000_Oe`.
pub fn sweep_stem(sweep: &SweepResult) -> String {
    let min = sweep.setpoints.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = sweep.setpoints.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    match sweep.axis {
        AxisKind::FieldOe => {
            format!("freq_{:.4}_GHz_field_{:.4}-{:.4}_Oe", sweep.fixed, min, max)
        }
        AxisKind::FrequencyGhz => {
            format!("field_{:.4}_Oe_freq_{:.4}-{:.4}_GHz", sweep.fixed, min, max)
        }
    }
}

/// Write one completed 1-D sweep to `dir`, returning the file path.
pub fn write_sweep(dir: &Path, sweep: &SweepResult) -> Result<PathBuf, FmrError> {
    let path = dir.join(format!("{}.csv", sweep_stem(sweep)));
    let mut columns: Vec<(&str, &[f64])> = Vec::new();
    let axis_name = match sweep.axis {
        AxisKind::FieldOe => "field_Oe",
        AxisKind::FrequencyGhz => "frequency_ghz",
    };
    if let Some(currents) = &sweep.currents {
        columns.push(("current_A", currents));
    }
    columns.push((axis_name, &sweep.setpoints));
    columns.push(("X", &sweep.x));
    columns.push(("Y", &sweep.y));
    write_table(&path, &columns)?;
    info!("wrote {} rows to {}", sweep.len(), path.display());
    Ok(path)
}

/// Write a 2-D sweep matrix as plain CSV, one inner sweep per row.
pub fn write_matrix(path: &Path, matrix: &Array2<f64>) -> Result<(), FmrError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    for row in matrix.rows() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(w, "{}", line.join(","))?;
    }
    w.flush()?;
    info!("wrote {}x{} matrix to {}", matrix.nrows(), matrix.ncols(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::SweepPhase;
    use ndarray::array;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fmr_rig_test_{name}_{}", std::process::id()))
    }

    #[test]
    fn table_round_trips_through_csv_text() {
        let path = scratch("table").join("t.csv");
        write_table(&path, &[("a", &[1.0, 2.0]), ("b", &[0.5, -0.5])]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "a,b\n1,0.5\n2,-0.5\n");
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn table_rejects_ragged_columns() {
        let path = scratch("ragged").join("t.csv");
        assert!(matches!(
            write_table(&path, &[("a", &[1.0]), ("b", &[1.0, 2.0])]),
            Err(FmrError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn sweep_files_carry_axis_columns() {
        let sweep = SweepResult {
            axis: AxisKind::FieldOe,
            fixed: 9.4,
            setpoints: vec![0.0, 669.0],
            currents: Some(vec![0.0, 1.0]),
            x: vec![1e-6, 2e-6],
            y: vec![0.0, 0.0],
            phase: SweepPhase::Done,
            fault: None,
        };
        let dir = scratch("sweep");
        let path = write_sweep(&dir, &sweep).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("current_A,field_Oe,X,Y\n"));
        assert!(path.file_name().unwrap().to_str().unwrap().contains("freq_9.4000_GHz"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn matrix_rows_match_input() {
        let dir = scratch("matrix");
        let path = dir.join("m.csv");
        write_matrix(&path, &array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "1,2\n3,4\n");
        fs::remove_dir_all(&dir).ok();
    }
}
