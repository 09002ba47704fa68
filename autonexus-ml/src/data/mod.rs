//! Evaluation dataset loading.

pub mod source;

pub use source::{CsvSource, Dataset, load_data, load_data_with};
