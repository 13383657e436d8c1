use super::{NegativeSize, Snapshot};
use crate::{
    error::{ModelError, Result},
    model::CompartmentalModel,
    prelude::{Real, Time},
    trackers::{TableTracker, Tracker},
};
use getset::Getters;
use std::path::Path;

/// Relative tolerance, in units of the output spacing, for times at the ends
/// of the simulated interval.
const TIME_TOLERANCE: Real = 1e-9;

/// Results of a model run: compartment sizes, derived outputs and flow rates
/// at every output time.
#[derive(Debug, Clone, Getters)]
pub struct Outputs {
    /// Full compartment names, in model order.
    #[getset(get = "pub")]
    compartments: Vec<String>,
    bases: Vec<String>,
    #[getset(get = "pub")]
    derived_names: Vec<String>,
    flow_names: Vec<String>,
    #[getset(get = "pub")]
    times: Vec<Time>,
    #[getset(get = "pub")]
    table: TableTracker<Real>,
    derived: TableTracker<Real>,
    flows: TableTracker<Real>,
    /// First compartment that became negative, if any.
    #[getset(get = "pub")]
    first_negative: Option<NegativeSize>,
}

impl Outputs {
    /// Trajectory of the given compartment. Full names (e.g., "S_young")
    /// select a single compartment, base names (e.g., "S") sum over all
    /// strata.
    pub fn compartment(&self, name: &str) -> Option<Vec<Real>> {
        if let Some(j) = self.compartments.iter().position(|c| c == name) {
            return self.table.col(j);
        }
        let cols: Vec<usize> = (0..self.bases.len())
            .filter(|&j| self.bases[j] == name)
            .collect();
        sum_columns(&self.table, &cols)
    }

    /// Trajectory of a derived output.
    pub fn derived_output(&self, name: &str) -> Option<Vec<Real>> {
        let j = self.derived_names.iter().position(|c| c == name)?;
        self.derived.col(j)
    }

    /// Instantaneous magnitude of a flow, summed across strata.
    pub fn flow_rate(&self, name: &str) -> Option<Vec<Real>> {
        let cols: Vec<usize> = (0..self.flow_names.len())
            .filter(|&j| self.flow_names[j] == name)
            .collect();
        sum_columns(&self.flows, &cols)
    }

    /// Trajectory of a compartment, derived output or flow, looked up in that
    /// order.
    pub fn series(&self, name: &str) -> Result<Vec<Real>> {
        self.compartment(name)
            .or_else(|| self.derived_output(name))
            .or_else(|| self.flow_rate(name))
            .ok_or_else(|| ModelError::UnknownOutput(name.to_string()))
    }

    /// Compartment sizes at the i-th output time.
    pub fn row(&self, i: usize) -> Option<&[Real]> {
        self.table.row(i)
    }

    /// Total population at each output time.
    pub fn totals(&self) -> Vec<Real> {
        self.table.rows().map(|row| row.iter().sum()).collect()
    }

    pub fn final_state(&self) -> Option<&[Real]> {
        self.table.tip()
    }

    /// Value of a series at time t, linearly interpolated between output
    /// times. Returns None if t is outside the simulated interval. Times that
    /// miss either end only by rounding error are clamped to it.
    pub fn value_at(&self, name: &str, t: Time) -> Result<Option<Real>> {
        let series = self.series(name)?;
        let n = self.times.len();
        if n == 0 {
            return Ok(None);
        }
        let (first, last) = (self.times[0], self.times[n - 1]);
        let tol = if n > 1 {
            TIME_TOLERANCE * (last - first) / (n - 1) as Real
        } else {
            TIME_TOLERANCE
        };
        if t < first - tol || t > last + tol {
            return Ok(None);
        }
        let t = t.max(first).min(last);
        let k = self.times.iter().position(|&x| x >= t).unwrap_or(n - 1);
        if k == 0 || self.times[k] == t {
            return Ok(Some(series[k]));
        }
        let (t0, t1) = (self.times[k - 1], self.times[k]);
        let w = (t - t0) / (t1 - t0);
        return Ok(Some(series[k - 1] * (1.0 - w) + series[k] * w));
    }

    fn header(&self) -> Vec<&str> {
        let mut head = vec!["time"];
        head.extend(self.compartments.iter().map(|s| s.as_str()));
        head.extend(self.derived_names.iter().map(|s| s.as_str()));
        return head;
    }

    /// Render times, compartments and derived outputs as CSV.
    pub fn render_csv(&self, sep: char) -> String {
        let mut table = TableTracker::from(self.times.clone());
        for j in 0..self.table.ncols() {
            table.add_column(self.table.col(j).unwrap_or_default(), 0.0);
        }
        for j in 0..self.derived.ncols() {
            table.add_column(self.derived.col(j).unwrap_or_default(), 0.0);
        }
        table.render_csv(&self.header().join(&sep.to_string()), sep)
    }

    /// Write the same table as render_csv() to a file.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(self.header())?;
        for (i, t) in self.times.iter().enumerate() {
            let mut record = vec![t.to_string()];
            if let Some(row) = self.table.row(i) {
                record.extend(row.iter().map(|x| x.to_string()));
            }
            if let Some(row) = self.derived.row(i) {
                record.extend(row.iter().map(|x| x.to_string()));
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        return Ok(());
    }
}

fn sum_columns(table: &TableTracker<Real>, cols: &[usize]) -> Option<Vec<Real>> {
    if cols.is_empty() {
        return None;
    }
    let data = table
        .rows()
        .map(|row| cols.iter().map(|&j| row[j]).sum())
        .collect();
    return Some(data);
}

/// Tracker that records snapshots into an Outputs table.
#[derive(Debug, Clone)]
pub struct Recorder {
    outputs: Outputs,
}

impl Recorder {
    pub fn new(model: &CompartmentalModel) -> Self {
        let nrows = model.n_steps() + 1;
        let n_outputs = model.outputs().len();
        let n_flows = model.flows().len();
        Recorder {
            outputs: Outputs {
                compartments: model.compartments().iter().map(|c| c.name().clone()).collect(),
                bases: model.compartments().iter().map(|c| c.base().clone()).collect(),
                derived_names: model.outputs().iter().map(|(name, _)| name.clone()).collect(),
                flow_names: model.flows().iter().map(|f| f.name().clone()).collect(),
                times: Vec::with_capacity(nrows),
                table: TableTracker::with_capacity(model.compartments().len(), nrows),
                derived: TableTracker::with_capacity(n_outputs, nrows),
                flows: TableTracker::with_capacity(n_flows, nrows),
                first_negative: None,
            },
        }
    }

    pub fn finish(self, first_negative: Option<NegativeSize>) -> Outputs {
        let mut outputs = self.outputs;
        outputs.first_negative = first_negative;
        return outputs;
    }
}

impl<'a> Tracker<Snapshot<'a>> for Recorder {
    fn track(&mut self, value: &Snapshot<'a>) {
        let out = &mut self.outputs;
        out.times.push(value.time);
        out.table.push_row(value.state);
        out.derived.push_row(value.derived);
        out.flows.push_row(value.flow_rates);
    }
}
