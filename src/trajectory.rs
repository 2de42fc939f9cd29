//! Validated GaMD trajectories: boost potential and collective variables per frame.

use log::debug;

use crate::error::{ReweightError, Result};
use crate::gamd_log::LogTable;

/// One frame of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: f64,
    /// Total boost potential, in the energy unit of the log.
    pub boost: f64,
    pub cv1: f64,
    pub cv2: Option<f64>,
}

/// Which table columns make up a trajectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSelection {
    /// Time or step column; the row index is used when absent.
    pub time: Option<String>,
    /// Columns summed into the total boost potential.
    pub boost: Vec<String>,
    /// One or two collective-variable columns.
    pub cvs: Vec<String>,
}

impl ColumnSelection {
    pub fn new<S: Into<String>>(
        boost: impl IntoIterator<Item = S>,
        cvs: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            time: None,
            boost: boost.into_iter().map(Into::into).collect(),
            cvs: cvs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }
}

/// Time-ordered frames stored column-wise.
///
/// All values are finite; construction fails otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    boost_source: Vec<String>,
    cv_names: Vec<String>,
    time: Vec<f64>,
    boost: Vec<f64>,
    cvs: Vec<Vec<f64>>,
}

fn check_finite(column: &str, values: &[f64]) -> Result<()> {
    match values.iter().position(|value| !value.is_finite()) {
        Some(row) => Err(ReweightError::malformed(
            column,
            row,
            format!("non-finite value {}", values[row]),
        )),
        None => Ok(()),
    }
}

impl Trajectory {
    /// Builds a trajectory from raw columns.
    ///
    /// `cvs` holds one column per collective variable, named by `cv_names`.
    pub fn new(
        time: Vec<f64>,
        boost: Vec<f64>,
        cv_names: Vec<String>,
        cvs: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if cvs.is_empty() || cvs.len() > 2 {
            return Err(ReweightError::invalid_config(format!(
                "a trajectory needs one or two CV columns, got {}",
                cvs.len()
            )));
        }
        if cv_names.len() != cvs.len() {
            return Err(ReweightError::invalid_config(format!(
                "{} CV names given for {} CV columns",
                cv_names.len(),
                cvs.len()
            )));
        }
        let n = boost.len();
        let mismatch = std::iter::once(("time", time.len()))
            .chain(cv_names.iter().map(String::as_str).zip(cvs.iter().map(Vec::len)))
            .find(|&(_, len)| len != n);
        if let Some((column, len)) = mismatch {
            return Err(ReweightError::malformed(
                column,
                len.min(n),
                format!("column has {len} rows but the boost potential has {n}"),
            ));
        }

        check_finite("time", &time)?;
        check_finite("boost", &boost)?;
        for (name, values) in cv_names.iter().zip(&cvs) {
            check_finite(name, values)?;
        }

        Ok(Self {
            boost_source: vec!["boost".to_string()],
            cv_names,
            time,
            boost,
            cvs,
        })
    }

    /// Extracts a trajectory from a parsed log table.
    pub fn from_table(table: &LogTable, columns: &ColumnSelection) -> Result<Self> {
        if columns.boost.is_empty() {
            return Err(ReweightError::invalid_config("no boost potential column selected"));
        }
        let time = match &columns.time {
            Some(name) => table.column(name)?.to_vec(),
            None => (0..table.n_rows()).map(|row| row as f64).collect(),
        };
        let boost_names: Vec<&str> = columns.boost.iter().map(String::as_str).collect();
        for name in &boost_names {
            check_finite(name, table.column(name)?)?;
        }
        let boost = table.sum_columns(&boost_names)?;
        let cvs = columns
            .cvs
            .iter()
            .map(|name| table.column(name).map(<[f64]>::to_vec))
            .collect::<Result<Vec<_>>>()?;

        let mut trajectory = Self::new(time, boost, columns.cvs.clone(), cvs)?;
        trajectory.boost_source = columns.boost.clone();
        debug!(
            "trajectory of {} frames, boost from [{}], CVs [{}]",
            trajectory.len(),
            trajectory.boost_source.join(" + "),
            trajectory.cv_names.join(", ")
        );
        Ok(trajectory)
    }

    /// Appends `other` along the time axis; both must share boost and CV definitions.
    pub fn append(&mut self, other: Trajectory) -> Result<()> {
        if self.boost_source != other.boost_source || self.cv_names != other.cv_names {
            return Err(ReweightError::SchemaMismatch(format!(
                "cannot concatenate trajectory (boost [{}], CVs [{}]) with (boost [{}], CVs [{}])",
                self.boost_source.join(" + "),
                self.cv_names.join(", "),
                other.boost_source.join(" + "),
                other.cv_names.join(", ")
            )));
        }
        self.time.extend(other.time);
        self.boost.extend(other.boost);
        for (column, extra) in self.cvs.iter_mut().zip(other.cvs) {
            column.extend(extra);
        }
        Ok(())
    }

    pub fn concat(parts: impl IntoIterator<Item = Trajectory>) -> Result<Self> {
        let mut parts = parts.into_iter();
        let mut combined = parts.next().ok_or_else(|| {
            ReweightError::SchemaMismatch("no trajectories to concatenate".to_string())
        })?;
        for part in parts {
            combined.append(part)?;
        }
        Ok(combined)
    }

    pub fn len(&self) -> usize {
        self.boost.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boost.is_empty()
    }

    pub fn cv_dim(&self) -> usize {
        self.cvs.len()
    }

    pub fn cv_names(&self) -> &[String] {
        &self.cv_names
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn boost(&self) -> &[f64] {
        &self.boost
    }

    pub fn cv(&self, dim: usize) -> &[f64] {
        &self.cvs[dim]
    }

    pub fn sample(&self, index: usize) -> Sample {
        Sample {
            time: self.time[index],
            boost: self.boost[index],
            cv1: self.cvs[0][index],
            cv2: self.cvs.get(1).map(|cv| cv[index]),
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        (0..self.len()).map(move |index| self.sample(index))
    }
}
