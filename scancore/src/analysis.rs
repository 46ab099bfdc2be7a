//! # Dataset Analysis
//!
//! Small numeric helpers that run over a scanned [`Dataset`]: a column
//! summary, z-score outlier removal and equal-width histograms. They work on
//! the non-null, non-NaN values of one numeric column.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, RecordBatch};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::{DataType, Float64Type};

use crate::assemble::{Dataset, ResultAssembler};
use crate::error::{ScanError, ScanResult};

/// Count, mean, population standard deviation and range of a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSummary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl ColumnSummary {
    fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        Some(Self {
            count,
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
        })
    }

    /// Distance from the mean in standard deviations; zero for a constant column.
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std_dev == 0.0 {
            0.0
        } else {
            (value - self.mean) / self.std_dev
        }
    }
}

impl std::fmt::Display for ColumnSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "count={} mean={:.4} std={:.4} min={:.4} max={:.4}",
            self.count, self.mean, self.std_dev, self.min, self.max
        )
    }
}

/// Summarizes a numeric column; `None` if it holds no values.
///
/// # Errors
///
/// Returns `SchemaMismatch` if the column is missing or not numeric.
pub fn summarize(dataset: &Dataset, column: &str) -> ScanResult<Option<ColumnSummary>> {
    let values = column_values(dataset, column)?;
    Ok(ColumnSummary::from_values(&values))
}

/// Drops rows whose `column` lies `threshold` or more standard deviations
/// from the mean.
///
/// With `lower_exclusive`, rows whose value is not strictly greater are
/// dropped too. Rows where the column is null or NaN are always dropped.
/// Mean and deviation are computed over all values before either bound is
/// applied. Warnings of the input carry over.
pub fn remove_outliers(
    dataset: &Dataset,
    column: &str,
    threshold: f64,
    lower_exclusive: Option<f64>,
) -> ScanResult<Dataset> {
    let mut assembler = ResultAssembler::new(dataset.schema());
    for warning in dataset.warnings() {
        assembler.add_warning(warning.clone());
    }
    let Some(summary) = summarize(dataset, column)? else {
        return Ok(assembler.finish());
    };

    for batch in dataset.batches() {
        let values = float_column(batch, column)?;
        let values = values.as_primitive::<Float64Type>();
        let keep: BooleanArray = values
            .iter()
            .map(|value| {
                Some(value.is_some_and(|v| {
                    !v.is_nan()
                        && summary.z_score(v).abs() < threshold
                        && lower_exclusive.is_none_or(|lower| v > lower)
                }))
            })
            .collect();
        assembler.push(filter_record_batch(batch, &keep)?)?;
    }

    let dataset = assembler.finish();
    tracing::debug!(
        column,
        threshold,
        kept = dataset.num_rows(),
        dropped = summary.count - dataset.num_rows().min(summary.count),
        "removed outliers"
    );
    Ok(dataset)
}

/// One bucket of a histogram, covering `[lower, upper)`; the last bucket
/// also includes its upper edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// An equal-width histogram of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub column: String,
    pub bins: Vec<HistogramBin>,
}

impl Histogram {
    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }

    /// Renders the histogram as text, one `#` bar per bin, scaled to `width`.
    pub fn render(&self, width: usize) -> String {
        let peak = self.bins.iter().map(|b| b.count).max().unwrap_or(0).max(1);
        let mut out = format!("{}\n", self.column);
        for bin in &self.bins {
            let bar = "#".repeat(bin.count * width / peak);
            out.push_str(&format!(
                "[{:>12.2}, {:>12.2}) {:>8} {}\n",
                bin.lower, bin.upper, bin.count, bar
            ));
        }
        out
    }
}

/// Buckets a numeric column into `bins` equal-width bins spanning its range.
///
/// A column with a single distinct value gets one bin holding every value.
/// An empty column yields no bins.
pub fn histogram(dataset: &Dataset, column: &str, bins: usize) -> ScanResult<Histogram> {
    let values = column_values(dataset, column)?;
    let Some(summary) = ColumnSummary::from_values(&values) else {
        return Ok(Histogram {
            column: column.to_string(),
            bins: Vec::new(),
        });
    };

    let range = summary.max - summary.min;
    let bin_count = if range == 0.0 { 1 } else { bins.max(1) };
    let width = range / bin_count as f64;
    let mut result: Vec<HistogramBin> = (0..bin_count)
        .map(|i| HistogramBin {
            lower: summary.min + width * i as f64,
            upper: if i + 1 == bin_count {
                summary.max
            } else {
                summary.min + width * (i + 1) as f64
            },
            count: 0,
        })
        .collect();

    for value in values {
        let index = if width == 0.0 {
            0
        } else {
            (((value - summary.min) / width) as usize).min(bin_count - 1)
        };
        result[index].count += 1;
    }

    Ok(Histogram {
        column: column.to_string(),
        bins: result,
    })
}

/// The non-null, non-NaN values of a column across all batches.
fn column_values(dataset: &Dataset, column: &str) -> ScanResult<Vec<f64>> {
    let schema = dataset.schema();
    let field = schema.field_with_name(column).map_err(|_| {
        ScanError::SchemaMismatch(format!("column {} is not part of the dataset", column))
    })?;
    if !field.data_type().is_numeric() {
        return Err(ScanError::SchemaMismatch(format!(
            "column {} has non-numeric type {}",
            column,
            field.data_type()
        )));
    }

    let mut values = Vec::with_capacity(dataset.num_rows());
    for batch in dataset.batches() {
        let array = float_column(batch, column)?;
        values.extend(
            array
                .as_primitive::<Float64Type>()
                .iter()
                .flatten()
                .filter(|v| !v.is_nan()),
        );
    }
    Ok(values)
}

fn float_column(batch: &RecordBatch, column: &str) -> ScanResult<ArrayRef> {
    let array = batch.column_by_name(column).ok_or_else(|| {
        ScanError::SchemaMismatch(format!("column {} is not part of the batch", column))
    })?;
    if array.data_type() == &DataType::Float64 {
        Ok(Arc::clone(array))
    } else {
        Ok(cast(array, &DataType::Float64)?)
    }
}
