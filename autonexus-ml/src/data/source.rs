//! Delimited-file data source for evaluation datasets.

use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A numeric table split into positional feature rows and a target column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Feature column names in file order, target excluded.
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

impl Dataset {
    pub fn row_count(&self) -> usize {
        self.target.len()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

/// CSV file data source.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub path: PathBuf,
    pub delimiter: char,
    pub target_column: String,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, target_column: &str) -> Self {
        Self {
            path: path.into(),
            delimiter: ',',
            target_column: target_column.to_string(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Read the file and split the target column out of every row.
    pub fn load(&self) -> Result<Dataset, MlError> {
        let raw =
            std::fs::read_to_string(&self.path).map_err(|e| MlError::from_read(e, &self.path))?;
        let content = raw.strip_prefix('\u{feff}').unwrap_or(raw.as_str());
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        // Parse header
        let (_, header) = lines
            .next()
            .ok_or_else(|| MlError::load(format!("empty CSV file: {}", self.path.display())))?;
        let columns = self.split_row(header);

        let target_idx = columns
            .iter()
            .position(|c| c == &self.target_column)
            .ok_or_else(|| {
                MlError::load(format!(
                    "target column '{}' not found in {}",
                    self.target_column,
                    self.path.display()
                ))
            })?;

        let feature_names: Vec<String> = columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != target_idx)
            .map(|(_, c)| c.clone())
            .collect();

        let mut features = Vec::new();
        let mut target = Vec::new();
        for (line_no, line) in lines {
            let cells = self.split_row(line);
            if cells.len() != columns.len() {
                return Err(MlError::load(format!(
                    "line {}: expected {} fields, found {}",
                    line_no + 1,
                    columns.len(),
                    cells.len()
                )));
            }

            let mut row = Vec::with_capacity(feature_names.len());
            for (i, cell) in cells.iter().enumerate() {
                let value = cell.parse::<f64>().map_err(|_| {
                    MlError::load(format!(
                        "line {}: column '{}' is not numeric: '{}'",
                        line_no + 1,
                        columns[i],
                        cell
                    ))
                })?;
                if i == target_idx {
                    target.push(value);
                } else {
                    row.push(value);
                }
            }
            features.push(row);
        }

        Ok(Dataset {
            feature_names,
            features,
            target,
        })
    }

    /// Split one record into trimmed fields. Double-quoted fields may contain
    /// the delimiter; `""` inside quotes is a literal quote.
    fn split_row(&self, line: &str) -> Vec<String> {
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '"' if in_quotes && chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = !in_quotes,
                c if c == self.delimiter && !in_quotes => {
                    fields.push(field.trim().to_string());
                    field.clear();
                }
                c => field.push(c),
            }
        }
        fields.push(field.trim().to_string());
        fields
    }
}

/// Load an evaluation dataset, logging the outcome.
pub fn load_data(path: &Path, target_column: &str) -> Result<Dataset, MlError> {
    load_data_with(&CsvSource::new(path, target_column))
}

/// Load an evaluation dataset from a configured source.
pub fn load_data_with(source: &CsvSource) -> Result<Dataset, MlError> {
    source
        .load()
        .inspect(|ds| {
            tracing::debug!(
                path = %source.path.display(),
                rows = ds.row_count(),
                features = ds.feature_count(),
                "data loaded"
            );
        })
        .inspect_err(|e| {
            tracing::error!(path = %source.path.display(), kind = e.kind(), "load_data failed: {e}");
        })
}
