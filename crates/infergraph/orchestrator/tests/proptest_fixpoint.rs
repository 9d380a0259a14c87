//! Property tests for scheduling: acyclic programs always reach their fixpoint

use infergraph_concept::{ConceptEntry, ConceptRepo, ConceptType, FlowIndex, InferenceEntry, InferenceRepo};
use infergraph_orchestrator::{
    ExecutorOutcome, ExecutorRegistry, Orchestrator, OrchestratorConfig, RunStatus,
};
use infergraph_reference::Reference;
use proptest::prelude::*;
use serde_json::json;

/// `c0` is ground; `c{i}` is produced from `c{i-1}` by the item at flow
/// position `positions[i-1]`, so flow order and dependency order differ.
fn chain(positions: &[u32]) -> (ConceptRepo, InferenceRepo) {
    let mut entries = vec![ConceptEntry::new("c0", ConceptType::Object).ground(json!([0]), None)];
    for i in 1..=positions.len() {
        entries.push(ConceptEntry::new(format!("c{i}"), ConceptType::Object));
    }
    let concepts = ConceptRepo::from_entries(entries).unwrap();

    let inferences = InferenceRepo::new(
        positions.iter().enumerate().map(|(i, pos)| {
            InferenceEntry::new("inc", format!("c{}", i + 1), FlowIndex::parse(&pos.to_string()).unwrap())
                .with_values([format!("c{i}")])
        }),
        &concepts,
    )
    .unwrap();
    (concepts, inferences)
}

fn inc_executors() -> ExecutorRegistry {
    let mut executors = ExecutorRegistry::new();
    executors.register_fn("inc", |b| {
        let inputs = b.value_references()?;
        let input = &inputs[0];
        Ok(ExecutorOutcome::Value(
            input.map(|v| v.as_i64().map(|n| json!(n + 1))),
        ))
    });
    executors
}

fn shuffled_positions() -> impl Strategy<Value = Vec<u32>> {
    (1u32..8).prop_flat_map(|n| Just((1..=n).collect::<Vec<_>>()).prop_shuffle())
}

proptest! {
    #[test]
    fn test_chain_reaches_fixpoint_within_item_count(positions in shuffled_positions()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let n = positions.len();
        let (concepts, inferences) = chain(&positions);
        let mut orch = Orchestrator::new(
            "chain",
            concepts,
            inferences,
            inc_executors(),
            OrchestratorConfig::default(),
        )
        .unwrap();

        let state = runtime.block_on(orch.start()).unwrap();
        prop_assert_eq!(state.status, RunStatus::Completed);
        prop_assert!(state.progress.cycle <= n as u64);
        prop_assert_eq!(state.progress.inference_count, n as u64);

        let last = orch.reference(&format!("c{n}")).unwrap().unwrap();
        prop_assert_eq!(last, &Reference::from_data(&json!([n]), None).unwrap());
    }

    #[test]
    fn test_reverse_flow_order_needs_one_cycle_per_item(n in 1u32..8) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let positions: Vec<u32> = (1..=n).rev().collect();
        let (concepts, inferences) = chain(&positions);
        let mut orch = Orchestrator::new(
            "chain",
            concepts,
            inferences,
            inc_executors(),
            OrchestratorConfig::default(),
        )
        .unwrap();

        let state = runtime.block_on(orch.start()).unwrap();
        prop_assert_eq!(state.progress.cycle, u64::from(n));
    }
}
