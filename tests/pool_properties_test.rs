//! Pool Property Tests
//!
//! Completeness and counter invariants over arbitrary batch and worker
//! counts.

use batch_pool::{Pool, Task, TaskBatch};
use proptest::prelude::*;
use std::collections::HashSet;

/// `failing[i]` makes batch `i` fail on its first task
fn batches_from(failing: &[bool]) -> Vec<TaskBatch<usize, usize>> {
    failing
        .iter()
        .enumerate()
        .map(|(i, &fails)| {
            TaskBatch::new(format!("batch_{}", i))
                .with_task(Task::new("first", i, move |x: &usize| {
                    if fails {
                        anyhow::bail!("batch {} configured to fail", x)
                    }
                    Ok(*x)
                }))
                .with_task(Task::new("second", i, |x: &usize| Ok(x + 1)))
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_batch_reported_exactly_once(
        failing in prop::collection::vec(any::<bool>(), 1..24),
        workers in 1usize..9,
    ) {
        let expected_errors = failing.iter().filter(|&&f| f).count();
        let report = tokio_test::block_on(Pool::with_workers(workers).run(batches_from(&failing)))
            .expect("pool run");

        prop_assert_eq!(report.batch_count(), failing.len());
        prop_assert_eq!(report.batch_results().len(), failing.len());
        prop_assert_eq!(report.worker_count(), workers);
        prop_assert_eq!(report.error_count(), expected_errors);

        let labels: HashSet<&str> = report.batch_results().iter().map(|b| b.label()).collect();
        prop_assert_eq!(labels.len(), failing.len());

        for (i, &fails) in failing.iter().enumerate() {
            let batch = report.find(&format!("batch_{}", i)).expect("batch present");
            prop_assert_eq!(batch.has_error(), fails);
            // Fail-fast: a failing batch never runs its second task
            let expected_len = if fails { 1 } else { 2 };
            prop_assert_eq!(batch.results().len(), expected_len);
        }
    }
}
