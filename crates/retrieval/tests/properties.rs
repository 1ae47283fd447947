use augment_retrieval::evidence::{normalize, EvidenceUnit, RawOutput};
use augment_retrieval::hierarchy::HierarchyBuilder;
use augment_retrieval::retriever::{merge_into_parents, MultiRetriever, Retriever, ScoredResult};
use augment_retrieval::testing::MockRetriever;
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

fn arb_raw_output() -> impl Strategy<Value = RawOutput> {
    let leaf = prop_oneof![
        ".{0,40}".prop_map(RawOutput::Text),
        "[a-z ]{1,20}".prop_map(|t| RawOutput::Unit(EvidenceUnit::text(t))),
        any::<i64>().prop_map(|n| RawOutput::Structured(serde_json::json!({ "n": n }))),
        Just(RawOutput::Structured(serde_json::Value::Null)),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop::collection::vec(inner, 0..6).prop_map(RawOutput::Sequence)
    })
}

/// Strictly decreasing chunk sizes, coarse to fine
fn arb_chunk_sizes() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::btree_set(8usize..400, 1..4).prop_map(|sizes| sizes.into_iter().rev().collect())
}

fn arb_text() -> impl Strategy<Value = String> {
    prop::collection::vec("[A-Za-z]{1,12}[ .,\n]{1,2}|é|日本", 0..120).prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn normalize_is_total(raw in arb_raw_output()) {
        let units = normalize(raw);
        prop_assert!(!units.is_empty());
    }

    #[test]
    fn normalize_string_round_trips(text in ".{0,200}") {
        let units = normalize(RawOutput::Text(text.clone()));
        prop_assert_eq!(units.len(), 1);
        prop_assert_eq!(units[0].text_content(), text.as_str());
    }

    #[test]
    fn hierarchy_reconstructs_every_unit(texts in prop::collection::vec(arb_text(), 1..4), sizes in arb_chunk_sizes()) {
        let units: Vec<EvidenceUnit> = texts.iter().map(|t| EvidenceUnit::text(t.as_str())).collect();
        let hierarchy = HierarchyBuilder::new(&sizes).unwrap().build(&units).unwrap();

        let roots: Vec<Uuid> = hierarchy.roots().map(|r| r.id).collect();
        prop_assert_eq!(roots.len(), texts.len());
        for (root, text) in roots.iter().zip(&texts) {
            prop_assert_eq!(&hierarchy.reconstruct(root), text);
        }
        for leaf in hierarchy.leaves() {
            prop_assert_eq!(leaf.depth, 0);
            prop_assert!(leaf.child_ids.is_empty());
        }
    }

    #[test]
    fn merging_never_grows_the_result_set(
        text in arb_text(),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 0..20),
        threshold in 0.0f32..=1.0,
    ) {
        let hierarchy = HierarchyBuilder::new(&[120, 40])
            .unwrap()
            .build(&[EvidenceUnit::text(text)])
            .unwrap();
        let leaves: Vec<Uuid> = hierarchy.leaves().map(|l| l.id).collect();

        let mut hits: Vec<(Uuid, f32)> = Vec::new();
        for (i, pick) in picks.iter().enumerate() {
            let id = leaves[pick.index(leaves.len())];
            if !hits.iter().any(|(h, _)| *h == id) {
                hits.push((id, 1.0 / (i as f32 + 1.0)));
            }
        }
        let before = hits.len();

        let merged = merge_into_parents(&hierarchy, hits, threshold);
        prop_assert!(merged.len() <= before);
        for (id, _) in &merged {
            prop_assert!(hierarchy.get(id).is_some());
        }
    }

    #[test]
    fn lower_threshold_merges_at_least_as_much(
        picks in prop::collection::vec(any::<prop::sample::Index>(), 0..20),
        low in 0.0f32..=1.0,
        delta in 0.0f32..=1.0,
    ) {
        let text: String = (0..30).map(|i| format!("Sentence {} about rivers. ", i)).collect();
        let hierarchy = HierarchyBuilder::new(&[200, 50])
            .unwrap()
            .build(&[EvidenceUnit::text(text)])
            .unwrap();
        let leaves: Vec<Uuid> = hierarchy.leaves().map(|l| l.id).collect();

        let mut hits: Vec<(Uuid, f32)> = Vec::new();
        for pick in &picks {
            let id = leaves[pick.index(leaves.len())];
            if !hits.iter().any(|(h, _)| *h == id) {
                hits.push((id, 0.5));
            }
        }
        let high = (low + delta).min(1.0);

        let merged_low = merge_into_parents(&hierarchy, hits.clone(), low);
        let merged_high = merge_into_parents(&hierarchy, hits, high);
        prop_assert!(merged_low.len() <= merged_high.len());
    }

    #[test]
    fn multi_concatenates_in_order(sizes in prop::collection::vec(1usize..5, 1..5)) {
        let mut expected = Vec::new();
        let retrievers: Vec<Arc<dyn Retriever>> = sizes
            .iter()
            .enumerate()
            .map(|(r, &n)| {
                let results: Vec<ScoredResult> = (0..n)
                    .map(|i| {
                        let text = format!("r{}-{}", r, i);
                        expected.push(text.clone());
                        ScoredResult::from_unit(EvidenceUnit::text(text), None)
                    })
                    .collect();
                Arc::new(MockRetriever::new(format!("r{}", r), results)) as Arc<dyn Retriever>
            })
            .collect();

        let multi = MultiRetriever::new(retrievers);
        let found = tokio_test::block_on(multi.retrieve("q")).unwrap();
        let texts: Vec<String> = found.iter().map(|r| r.unit().text_content().to_string()).collect();
        prop_assert_eq!(texts, expected);
    }
}
