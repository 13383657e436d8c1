use getset::CopyGetters;
use std::fmt::Display;

/// A table of values that grows row by row, typically storing the state of
/// the population at each output time. Values are stored in a flat row-major
/// buffer.
///
/// The table can also grow column-wise.
#[derive(Clone, Debug, Default, PartialEq, CopyGetters)]
pub struct TableTracker<T> {
    #[getset(get_copy = "pub")]
    nrows: usize,
    #[getset(get_copy = "pub")]
    ncols: usize,
    buffer: Vec<T>,
}

impl<T: Copy> TableTracker<T> {
    pub fn new(ncols: usize) -> Self {
        TableTracker {
            ncols,
            nrows: 0,
            buffer: vec![],
        }
    }

    /// Create an empty table with room for nrows rows.
    pub fn with_capacity(ncols: usize, nrows: usize) -> Self {
        TableTracker {
            ncols,
            nrows: 0,
            buffer: Vec::with_capacity(ncols * nrows),
        }
    }

    #[inline(always)]
    fn _idx(&self, i: usize, j: usize) -> usize {
        i * self.ncols + j
    }

    /// Append a row. Rows shorter than ncols are padded with the last value,
    /// longer rows are truncated.
    pub fn push_row(&mut self, row: &[T]) -> &mut Self {
        let n = row.len().min(self.ncols);
        self.buffer.extend_from_slice(&row[..n]);
        if let Some(&last) = row.last() {
            for _ in n..self.ncols {
                self.buffer.push(last);
            }
        }
        if n > 0 || self.ncols == 0 {
            self.nrows += 1;
        }
        return self;
    }

    /// Get the j-th column at the i-th row.
    pub fn get(&self, i: usize, j: usize) -> Option<T> {
        if i >= self.nrows || j >= self.ncols {
            return None;
        }
        self.buffer.get(self._idx(i, j)).copied()
    }

    /// Return the i-th row.
    pub fn row(&self, i: usize) -> Option<&[T]> {
        if i >= self.nrows {
            return None;
        }
        let k = self._idx(i, 0);
        return Some(&self.buffer[k..k + self.ncols]);
    }

    /// Return the j-th column.
    pub fn col(&self, j: usize) -> Option<Vec<T>> {
        if j >= self.ncols {
            return None;
        }
        return Some((0..self.nrows).map(|i| self.buffer[self._idx(i, j)]).collect());
    }

    /// Return the last row, if any.
    pub fn tip(&self) -> Option<&[T]> {
        if self.nrows == 0 {
            return None;
        }
        self.row(self.nrows - 1)
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.buffer.chunks(self.ncols.max(1)).take(self.nrows)
    }

    /// Add new column to the table from an iterator.
    ///
    /// Columns longer than the number of rows are truncated. Shorter columns
    /// are filled with the given value.
    pub fn add_column(&mut self, data: impl IntoIterator<Item = T>, fill: T) -> &mut Self {
        let mut col: Vec<T> = data.into_iter().take(self.nrows).collect();
        col.resize(self.nrows, fill);

        let mut buffer = Vec::with_capacity(self.nrows * (self.ncols + 1));
        for (i, x) in col.into_iter().enumerate() {
            let k = self._idx(i, 0);
            buffer.extend_from_slice(&self.buffer[k..k + self.ncols]);
            buffer.push(x);
        }
        self.ncols += 1;
        self.buffer = buffer;
        return self;
    }

    /// Render table as CSV data with the given header line.
    pub fn render_csv(&self, head: &str, sep: char) -> String
    where
        T: Display,
    {
        let mut data = head.to_string();
        for row in self.rows() {
            data.push('\n');
            for (j, x) in row.iter().enumerate() {
                if j > 0 {
                    data.push(sep);
                }
                data.push_str(&x.to_string());
            }
        }
        return data;
    }
}

impl<T> From<Vec<T>> for TableTracker<T> {
    fn from(data: Vec<T>) -> Self {
        TableTracker {
            ncols: 1,
            nrows: data.len(),
            buffer: data,
        }
    }
}
