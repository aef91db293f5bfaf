use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest_derive::Arbitrary;

use crate::DoubleTreeMap;

/// Simple model implementation using BTreeMap for comparison
#[derive(Default, Clone)]
struct Model {
    map: BTreeMap<u64, u64>,
}

impl Model {
    fn insert(&mut self, key: u64, value: u64) -> bool {
        if self.map.contains_key(&key) {
            return false;
        }
        self.map.insert(key, value);
        true
    }

    fn get(&self, key: u64) -> Option<&u64> {
        self.map.get(&key)
    }

    fn remove(&mut self, key: u64) -> usize {
        self.map.remove(&key).map_or(0, |_| 1)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Actions to test against both implementations
#[derive(Arbitrary, Debug, Clone)]
enum Action {
    Insert(Key, u64),
    Get(Key),
    Remove(Key),
}

/// Wrapper for key generation with custom strategy
#[derive(Debug, Clone, Copy)]
struct Key(u64);

impl Arbitrary for Key {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            // Tiny range: constant churn on the same lines
            (0u64..16).prop_map(Key),
            // Small range: collisions and rebalancing
            (0u64..512).prop_map(Key),
            // Medium range: several pages
            (0u64..65_536).prop_map(Key),
            // Full range
            any::<u64>().prop_map(Key),
        ]
        .boxed()
    }
}

/// Test harness that executes actions on both DoubleTreeMap and Model
#[derive(Default)]
struct Test {
    tree: DoubleTreeMap<u64, u64>,
    model: Model,
}

impl Test {
    fn execute(&mut self, action: Action) {
        match action {
            Action::Insert(Key(key), value) => {
                let tree_result = self.tree.insert(key, value);
                let model_result = self.model.insert(key, value);
                assert_eq!(
                    tree_result, model_result,
                    "Insert mismatch: key={key}, tree_result={tree_result:?}, model_result={model_result:?}"
                );
            }
            Action::Get(Key(key)) => {
                let tree_result = self.tree.get(key);
                let model_result = self.model.get(key);
                assert_eq!(
                    tree_result, model_result,
                    "Get mismatch: key={key}, tree_result={tree_result:?}, model_result={model_result:?}"
                );
            }
            Action::Remove(Key(key)) => {
                let tree_result = self.tree.remove(key);
                let model_result = self.model.remove(key);
                assert_eq!(
                    tree_result, model_result,
                    "Remove mismatch: key={key}, tree_result={tree_result:?}, model_result={model_result:?}"
                );
            }
        }
        // Always verify len matches
        assert_eq!(
            self.tree.len(),
            self.model.len(),
            "Length mismatch after action"
        );
        assert_eq!(
            self.tree.is_empty(),
            self.model.is_empty(),
            "is_empty mismatch"
        );
    }

    fn finish(self) {
        self.tree.check_invariants();
        let got: Vec<(u64, u64)> = self.tree.iter().map(|(k, v)| (*k, *v)).collect();
        let expected: Vec<(u64, u64)> = self.model.map.into_iter().collect();
        assert_eq!(got, expected, "Iteration order mismatch");
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn proptest_vs_btreemap(actions in prop::collection::vec(any::<Action>(), 1..256)) {
        let mut test = Test::default();
        for action in actions {
            test.execute(action);
        }
        test.finish();
    }

    #[test]
    fn proptest_hopscotch_vs_hashmap(actions in prop::collection::vec(any::<Action>(), 1..256)) {
        use std::collections::HashMap;

        let mut table: crate::HopscotchMap<u64, u64> = crate::HopscotchMap::new();
        let mut model: HashMap<u64, u64> = HashMap::new();

        for action in actions {
            match action {
                Action::Insert(Key(key), value) => {
                    let inserted = table.insert(key, value);
                    let model_inserted = !model.contains_key(&key);
                    if model_inserted {
                        model.insert(key, value);
                    }
                    prop_assert_eq!(inserted, model_inserted);
                }
                Action::Get(Key(key)) => {
                    prop_assert_eq!(table.get(&key), model.get(&key));
                }
                Action::Remove(Key(key)) => {
                    let removed = table.remove(&key);
                    prop_assert_eq!(removed, model.remove(&key).map_or(0, |_| 1));
                }
            }
            prop_assert_eq!(table.len(), model.len());
        }

        let mut got: Vec<(u64, u64)> = table.iter().map(|(k, v)| (*k, *v)).collect();
        got.sort_unstable();
        let mut expected: Vec<(u64, u64)> = model.into_iter().collect();
        expected.sort_unstable();
        prop_assert_eq!(got, expected);
    }
}
