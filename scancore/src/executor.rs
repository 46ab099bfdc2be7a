//! # Scan Execution
//!
//! Materializes scan tasks on a bounded set of tokio tasks and feeds the
//! results to a [`ResultAssembler`].
//!
//! In ordered mode, results that complete early wait in a reorder buffer
//! until every earlier task has been appended, so the dataset always lists
//! batches in planner order. Unordered mode appends on completion.

use std::collections::BTreeMap;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use tokio::task::JoinSet;

use crate::assemble::{Dataset, ResultAssembler, ScanWarning};
use crate::config::{FailurePolicy, OutputOrdering, ScanOptions};
use crate::error::{ScanError, ScanResult};
use crate::reader::TaskMaterializer;
use crate::scan::ScanTask;

/// What a finished task contributes to the dataset.
type TaskOutput = Result<Vec<RecordBatch>, ScanWarning>;

/// Runs scan tasks concurrently under a set of [`ScanOptions`].
#[derive(Clone)]
pub struct ScanExecutor {
    materializer: TaskMaterializer,
    options: ScanOptions,
}

impl ScanExecutor {
    pub fn new(materializer: TaskMaterializer, options: ScanOptions) -> Self {
        Self {
            materializer,
            options,
        }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Materializes `tasks` and assembles their batches under `schema`.
    ///
    /// # Errors
    ///
    /// With [`FailurePolicy::AbortOnFirstError`] the first failing task
    /// cancels every task still running and its error is returned. With
    /// [`FailurePolicy::BestEffort`] per-file errors become warnings on the
    /// dataset; any other error still fails the scan.
    pub async fn execute(
        &self,
        tasks: impl IntoIterator<Item = ScanTask>,
        schema: SchemaRef,
    ) -> ScanResult<Dataset> {
        let limit = self.options.concurrency();
        let mut pending = tasks.into_iter().enumerate();
        let mut running: JoinSet<(usize, ScanResult<Vec<RecordBatch>>, String)> = JoinSet::new();
        let mut reorder: BTreeMap<usize, TaskOutput> = BTreeMap::new();
        let mut next_index = 0;
        let mut assembler = ResultAssembler::new(schema);

        loop {
            while running.len() < limit
                && let Some((index, task)) = pending.next()
            {
                let materializer = self.materializer.clone();
                running.spawn(async move {
                    let result = materializer.materialize(&task).await;
                    (index, result, task.file_path().to_string())
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (index, result, path) = match joined {
                Ok(completed) => completed,
                Err(e) => {
                    running.abort_all();
                    return Err(ScanError::TaskJoin(e.to_string()));
                }
            };

            let output = match result {
                Ok(batches) => Ok(batches),
                Err(e)
                    if e.is_file_error()
                        && self.options.failure_policy == FailurePolicy::BestEffort =>
                {
                    tracing::warn!(file = %path, error = %e, "skipping unreadable data file");
                    Err(ScanWarning {
                        path,
                        message: e.to_string(),
                    })
                }
                Err(e) => {
                    tracing::debug!(file = %path, in_flight = running.len(), "aborting scan");
                    running.abort_all();
                    return Err(e);
                }
            };

            match self.options.ordering {
                OutputOrdering::Unordered => append(&mut assembler, output)?,
                OutputOrdering::Ordered => {
                    reorder.insert(index, output);
                    while let Some(output) = reorder.remove(&next_index) {
                        append(&mut assembler, output)?;
                        next_index += 1;
                    }
                }
            }
        }

        Ok(assembler.finish())
    }
}

fn append(assembler: &mut ResultAssembler, output: TaskOutput) -> ScanResult<()> {
    match output {
        Ok(batches) => assembler.extend(batches),
        Err(warning) => {
            assembler.add_warning(warning);
            Ok(())
        }
    }
}
