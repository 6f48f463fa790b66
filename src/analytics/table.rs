//! Trial analytics table
//!
//! Flattens an [`ExperimentStore`] into one Arrow row per trial, then applies
//! a [`SearchExpression`] (filter, sort, limit) to it.

use std::cmp::Ordering;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute::{filter_record_batch, sort_to_indices, take, SortOptions};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use arrow::record_batch::RecordBatch;
use tracing::debug;

use super::filter::{FilterOperator, FilterValue, SearchExpression, SearchFilter, SortOrder};
use crate::experiment::{ExperimentStore, MetricRecord, TrialRecord};
use crate::{Error, Result};

/// Trial name column
pub const TRIAL_NAME: &str = "TrialName";
/// Experiment name column
pub const EXPERIMENT_NAME: &str = "ExperimentName";
/// Training job name column (null for trials without a job)
pub const JOB_NAME: &str = "JobName";
/// Trial status column
pub const STATUS: &str = "Status";

type Statistic = (&'static str, fn(&Summary) -> f64);

const STATISTICS: [Statistic; 4] = [
    ("Min", |s| s.min),
    ("Max", |s| s.max),
    ("Avg", Summary::avg),
    ("Last", |s| s.last),
];

/// Per-trial, per-key aggregate of a metric series.
#[derive(Debug, Clone, Copy)]
struct Summary {
    min: f64,
    max: f64,
    sum: f64,
    last: f64,
    count: usize,
}

impl Summary {
    /// `series` must be ordered by step.
    fn of(series: &[&MetricRecord]) -> Option<Self> {
        let last = series.last()?.value();
        let mut summary = Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            last,
            count: series.len(),
        };
        for metric in series {
            summary.min = summary.min.min(metric.value());
            summary.max = summary.max.max(metric.value());
            summary.sum += metric.value();
        }
        Some(summary)
    }

    #[allow(clippy::cast_precision_loss)]
    fn avg(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Column name for one statistic of a metric key, e.g. `"train:loss - Min"`.
#[must_use]
pub fn metric_column(key: &str, statistic: &str) -> String {
    format!("{key} - {statistic}")
}

/// Tabular view over tracked trials.
///
/// ## Columns
///
/// | column | type |
/// |---|---|
/// | `TrialName`, `ExperimentName`, `Status` | Utf8 |
/// | `JobName` | Utf8 (nullable) |
/// | `<key> - Min`, `- Max`, `- Avg`, `- Last` | Float64 (null if the trial never logged `key`) |
/// | `<key> - Count` | Int64 |
///
/// Metric keys are the union over all trials in the store, sorted.
#[derive(Debug, Clone, Copy)]
pub struct TrialAnalytics;

impl TrialAnalytics {
    /// Build the full table, then filter, sort and truncate it.
    ///
    /// # Errors
    /// `Error::InvalidInput` when a filter or the sort key names an unknown
    /// column, or a filter value does not fit the column type.
    ///
    /// # Example
    /// ```
    /// use pipemode::analytics::{SearchExpression, TrialAnalytics};
    /// use pipemode::experiment::{ExperimentStore, MetricRecord, TrialRecord};
    ///
    /// # fn main() -> pipemode::Result<()> {
    /// let mut store = ExperimentStore::new();
    /// store.add_trial(TrialRecord::new("t-1", "demo"));
    /// store.add_metric(MetricRecord::new("t-1", "loss", 0, 0.9));
    /// store.add_metric(MetricRecord::new("t-1", "loss", 1, 0.4));
    ///
    /// let expr = SearchExpression::parse(r#""loss - Min" < 0.5"#)?;
    /// let table = TrialAnalytics::table(&store, &expr)?;
    /// assert_eq!(table.num_rows(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn table(store: &ExperimentStore, expr: &SearchExpression) -> Result<RecordBatch> {
        let batch = Self::full_table(store)?;
        let batch = apply_filters(&batch, &expr.filters)?;
        let batch = apply_sort(batch, expr.sort_by.as_deref(), expr.sort_order)?;
        let batch = match expr.max_results {
            Some(max) if max < batch.num_rows() => batch.slice(0, max),
            _ => batch,
        };
        debug!(rows = batch.num_rows(), filters = expr.filters.len(), "trial table built");
        Ok(batch)
    }

    /// Every trial in the store, unfiltered, in creation order.
    ///
    /// # Errors
    /// Returns error if the Arrow batch cannot be assembled.
    pub fn full_table(store: &ExperimentStore) -> Result<RecordBatch> {
        let trials: Vec<&TrialRecord> = store.trials();
        let series = store.metric_series();

        let mut fields = vec![
            Field::new(TRIAL_NAME, DataType::Utf8, false),
            Field::new(EXPERIMENT_NAME, DataType::Utf8, false),
            Field::new(JOB_NAME, DataType::Utf8, true),
            Field::new(STATUS, DataType::Utf8, false),
        ];
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                trials.iter().map(|t| t.trial_name()),
            )),
            Arc::new(StringArray::from_iter_values(
                trials.iter().map(|t| t.experiment_name()),
            )),
            Arc::new(trials.iter().map(|t| t.job_name()).collect::<StringArray>()),
            Arc::new(StringArray::from_iter_values(
                trials.iter().map(|t| t.status().to_string()),
            )),
        ];

        for key in store.all_metric_keys() {
            let summaries: Vec<Option<Summary>> = trials
                .iter()
                .map(|t| {
                    series
                        .get(&(t.trial_name(), key))
                        .and_then(|points| Summary::of(points))
                })
                .collect();

            for (statistic, value) in STATISTICS {
                fields.push(Field::new(metric_column(key, statistic), DataType::Float64, true));
                columns.push(Arc::new(
                    summaries
                        .iter()
                        .map(|s| s.as_ref().map(value))
                        .collect::<Float64Array>(),
                ));
            }

            fields.push(Field::new(metric_column(key, "Count"), DataType::Int64, false));
            columns.push(Arc::new(Int64Array::from_iter_values(summaries.iter().map(
                |s| s.map_or(0, |s| i64::try_from(s.count).unwrap_or(i64::MAX)),
            ))));
        }

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch.column_by_name(name).ok_or_else(|| {
        let known: Vec<String> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        Error::InvalidInput(format!(
            "unknown column '{name}' (available: {})",
            known.join(", ")
        ))
    })
}

/// One filter resolved against its column.
enum Predicate<'a> {
    Text {
        values: &'a StringArray,
        operator: FilterOperator,
        needle: &'a str,
    },
    Number {
        values: Vec<Option<f64>>,
        operator: FilterOperator,
        target: f64,
    },
}

impl<'a> Predicate<'a> {
    fn resolve(batch: &'a RecordBatch, filter: &'a SearchFilter) -> Result<Self> {
        let array = column(batch, &filter.name)?;
        match array.data_type() {
            DataType::Utf8 => {
                let FilterValue::Text(needle) = &filter.value else {
                    return Err(Error::InvalidInput(format!(
                        "column '{}' holds text, cannot compare with a number",
                        filter.name
                    )));
                };
                Ok(Self::Text {
                    values: array.as_string::<i32>(),
                    operator: filter.operator,
                    needle,
                })
            }
            DataType::Float64 | DataType::Int64 => {
                if filter.operator == FilterOperator::Contains {
                    return Err(Error::InvalidInput(format!(
                        "Contains needs a text column, '{}' is numeric",
                        filter.name
                    )));
                }
                let target = match &filter.value {
                    FilterValue::Number(n) => *n,
                    FilterValue::Text(text) => text.trim().parse::<f64>().map_err(|_| {
                        Error::InvalidInput(format!(
                            "column '{}' is numeric, '{text}' is not a number",
                            filter.name
                        ))
                    })?,
                };
                Ok(Self::Number {
                    values: numeric_values(array),
                    operator: filter.operator,
                    target,
                })
            }
            other => Err(Error::InvalidInput(format!(
                "column '{}' has unsupported type {other}",
                filter.name
            ))),
        }
    }

    fn matches(&self, row: usize) -> bool {
        match self {
            Self::Text {
                values,
                operator,
                needle,
            } => {
                if values.is_null(row) {
                    return false;
                }
                let value = values.value(row);
                match operator {
                    FilterOperator::Contains => value.contains(*needle),
                    op => op.accepts(value.cmp(*needle)),
                }
            }
            Self::Number {
                values,
                operator,
                target,
            } => values[row]
                .and_then(|v| v.partial_cmp(target))
                .is_some_and(|ordering: Ordering| operator.accepts(ordering)),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn numeric_values(array: &ArrayRef) -> Vec<Option<f64>> {
    match array.data_type() {
        DataType::Int64 => array
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.map(|v| v as f64))
            .collect(),
        _ => array.as_primitive::<Float64Type>().iter().collect(),
    }
}

fn apply_filters(batch: &RecordBatch, filters: &[SearchFilter]) -> Result<RecordBatch> {
    let predicates = filters
        .iter()
        .map(|filter| Predicate::resolve(batch, filter))
        .collect::<Result<Vec<_>>>()?;

    let mask: BooleanArray = (0..batch.num_rows())
        .map(|row| Some(predicates.iter().all(|p| p.matches(row))))
        .collect();

    Ok(filter_record_batch(batch, &mask)?)
}

fn apply_sort(batch: RecordBatch, sort_by: Option<&str>, order: SortOrder) -> Result<RecordBatch> {
    let Some(name) = sort_by else {
        return Ok(batch);
    };
    let options = SortOptions {
        descending: order == SortOrder::Descending,
        nulls_first: false,
    };
    let indices = sort_to_indices(column(&batch, name)?.as_ref(), Some(options), None)?;
    let columns = batch
        .columns()
        .iter()
        .map(|c| take(c.as_ref(), &indices, None))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(RecordBatch::try_new(batch.schema(), columns)?)
}
