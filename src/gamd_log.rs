//! Reading AMBER GaMD logs and CV tables into named numeric columns.
//!
//! An AMBER GaMD log starts with a few comment lines beginning with `#`; the last
//! of them lists the column names separated by commas:
//!
//! ```text
//! # Gaussian accelerated Molecular Dynamics log file
//! # All energy terms stored in units of kcal/mol
//! # ntwx,total_nstep,Unboosted-Potential-Energy,Unboosted-Dihedral-Energy,Total-Force-Weight,Dihedral-Force-Weight,Boost-Energy-Potential,Boost-Energy-Dihedral
//!        500        500   -85071.5   1208.4   0.3   0.9   3.12   1.87
//! ```
//!
//! Every following line holds whitespace-separated numbers, one per column.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::debug;

use crate::error::{ReweightError, Result};

/// Column-major table of `f64` values with unique column names.
#[derive(Debug, Clone, PartialEq)]
pub struct LogTable {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl LogTable {
    /// Creates an empty table with the given column names.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if let Some(duplicate) = names.iter().duplicates().next() {
            return Err(ReweightError::SchemaMismatch(format!(
                "duplicate column name `{duplicate}`"
            )));
        }
        let columns = vec![Vec::new(); names.len()];
        Ok(Self { names, columns })
    }

    /// Builds a table from whole columns, which must all have the same length.
    pub fn from_columns<S: Into<String>>(
        columns: impl IntoIterator<Item = (S, Vec<f64>)>,
    ) -> Result<Self> {
        let (names, columns): (Vec<String>, Vec<Vec<f64>>) = columns
            .into_iter()
            .map(|(name, values)| (name.into(), values))
            .unzip();
        let mut table = Self::new(names)?;
        if !columns.iter().map(Vec::len).all_equal() {
            return Err(ReweightError::SchemaMismatch(
                "columns have different lengths".to_string(),
            ));
        }
        table.columns = columns;
        Ok(table)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_columns(&self) -> usize {
        self.names.len()
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|index| self.columns[index].as_slice())
            .ok_or_else(|| ReweightError::MissingColumn(name.to_string()))
    }

    /// Row-wise sum of several columns, e.g. the two terms of a dual boost.
    pub fn sum_columns(&self, names: &[&str]) -> Result<Vec<f64>> {
        let mut total = vec![0.0; self.n_rows()];
        for name in names {
            for (acc, value) in total.iter_mut().zip(self.column(name)?) {
                *acc += value;
            }
        }
        Ok(total)
    }

    fn push_row(&mut self, row: &[f64]) {
        for (column, &value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
    }

    /// Appends the rows of `other` along the time axis.
    pub fn append(&mut self, other: LogTable) -> Result<()> {
        if self.names != other.names {
            return Err(ReweightError::SchemaMismatch(format!(
                "cannot concatenate columns [{}] with [{}]",
                self.names.join(", "),
                other.names.join(", ")
            )));
        }
        for (column, extra) in self.columns.iter_mut().zip(other.columns) {
            column.extend(extra);
        }
        Ok(())
    }

    /// Concatenates tables in the given order; all must share one schema.
    pub fn concat(tables: impl IntoIterator<Item = LogTable>) -> Result<Self> {
        let mut tables = tables.into_iter();
        let mut combined = tables.next().ok_or_else(|| {
            ReweightError::SchemaMismatch("no tables to concatenate".to_string())
        })?;
        for table in tables {
            combined.append(table)?;
        }
        Ok(combined)
    }

    /// Places the columns of `other` next to these; row counts must match.
    pub fn join(mut self, other: LogTable) -> Result<Self> {
        if self.n_rows() != other.n_rows() {
            return Err(ReweightError::SchemaMismatch(format!(
                "cannot join a table of {} rows with one of {} rows",
                self.n_rows(),
                other.n_rows()
            )));
        }
        if let Some(name) = other.names.iter().find(|name| self.names.contains(name)) {
            return Err(ReweightError::SchemaMismatch(format!(
                "column `{name}` present in both tables"
            )));
        }
        self.names.extend(other.names);
        self.columns.extend(other.columns);
        Ok(self)
    }
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> ReweightError + '_ {
    move |source| ReweightError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn parse_row(fields: &str, width: usize, path: &Path, line: usize) -> Result<Vec<f64>> {
    let row = fields
        .split_whitespace()
        .map(|field| {
            field.parse::<f64>().map_err(|_| ReweightError::Parse {
                path: path.to_path_buf(),
                line,
                detail: format!("`{field}` is not a number"),
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    if row.len() != width {
        return Err(ReweightError::Parse {
            path: path.to_path_buf(),
            line,
            detail: format!("expected {width} columns, found {}", row.len()),
        });
    }
    Ok(row)
}

/// Parses a GaMD log from any buffered reader; `origin` is used in error messages.
pub fn parse_gamd_log<R: BufRead>(reader: R, origin: &Path) -> Result<LogTable> {
    let mut header: Option<String> = None;
    let mut table: Option<LogTable> = None;

    for (line_idx, line) in reader.lines().enumerate() {
        let line_no = line_idx + 1;
        let line = line.map_err(io_error(origin))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            if table.is_none() {
                header = Some(comment.to_string());
            }
            continue;
        }
        if table.is_none() {
            let names = header
                .as_deref()
                .ok_or_else(|| ReweightError::Parse {
                    path: origin.to_path_buf(),
                    line: line_no,
                    detail: "data found before the column header".to_string(),
                })?
                .split(',')
                .map(|name| name.trim().to_string())
                .collect::<Vec<_>>();
            table = Some(LogTable::new(names)?);
        }
        if let Some(table) = table.as_mut() {
            let row = parse_row(trimmed, table.n_columns(), origin, line_no)?;
            table.push_row(&row);
        }
    }

    match (table, header) {
        (Some(table), _) => Ok(table),
        // header only, no frames yet
        (None, Some(header)) => LogTable::new(header.split(',').map(|name| name.trim().to_string())),
        (None, None) => Err(ReweightError::Parse {
            path: origin.to_path_buf(),
            line: 0,
            detail: "no column header found".to_string(),
        }),
    }
}

/// Reads a single AMBER GaMD log file.
pub fn read_gamd_log(path: impl AsRef<Path>) -> Result<LogTable> {
    let path = path.as_ref();
    let file = File::open(path).map_err(io_error(path))?;
    let table = parse_gamd_log(BufReader::new(file), path)?;
    debug!(
        "read {} frames with columns [{}] from {}",
        table.n_rows(),
        table.names().join(", "),
        path.display()
    );
    Ok(table)
}

/// Reads several GaMD logs and concatenates them in order.
pub fn read_gamd_logs(paths: &[impl AsRef<Path>]) -> Result<LogTable> {
    let tables = paths
        .iter()
        .map(read_gamd_log)
        .collect::<Result<Vec<_>>>()?;
    LogTable::concat(tables)
}

/// Parses a whitespace-separated table whose column names are supplied by the
/// caller, as written by trajectory analysis tools. Comment lines are skipped.
pub fn parse_cv_table<R: BufRead>(reader: R, origin: &Path, names: &[&str]) -> Result<LogTable> {
    let mut table = LogTable::new(names.iter().copied())?;
    for (line_idx, line) in reader.lines().enumerate() {
        let line = line.map_err(io_error(origin))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let row = parse_row(trimmed, names.len(), origin, line_idx + 1)?;
        table.push_row(&row);
    }
    Ok(table)
}

pub fn read_cv_table(path: impl AsRef<Path>, names: &[&str]) -> Result<LogTable> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let file = File::open(&path).map_err(io_error(&path))?;
    let table = parse_cv_table(BufReader::new(file), &path, names)?;
    debug!("read {} CV rows from {}", table.n_rows(), path.display());
    Ok(table)
}
