//! Result analytics
//!
//! Query tracked trials with a declarative filter and get an Arrow table back.
//!
//! ```rust
//! use pipemode::analytics::{SearchExpression, SortOrder, TrialAnalytics};
//! use pipemode::experiment::ExperimentStore;
//!
//! # fn main() -> pipemode::Result<()> {
//! let store = ExperimentStore::new();
//! let expr = SearchExpression::parse("ExperimentName = 'pipe-mode-demo'")?
//!     .sort_by("TrialName", SortOrder::Descending)
//!     .max_results(10);
//! let table = TrialAnalytics::table(&store, &expr)?;
//! assert_eq!(table.num_rows(), 0);
//! # Ok(())
//! # }
//! ```

mod export;
mod filter;
mod table;

pub use export::{read_parquet, write_parquet};
pub use filter::{FilterOperator, FilterValue, SearchExpression, SearchFilter, SortOrder};
pub use table::{metric_column, TrialAnalytics, EXPERIMENT_NAME, JOB_NAME, STATUS, TRIAL_NAME};
