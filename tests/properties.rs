//! Property tests: random insert/delete sequences checked against a plain
//! vector of entries.

use geopagedb::{CollectingVisitor, Entry, IndexOptions, Region, SpatialIndex, SplitPolicy};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Insert(Region, i32),
    /// Delete the live entry at this index (modulo the live count).
    DeleteLive(usize),
    /// Delete a pair that was never inserted.
    DeleteMissing(Region),
}

fn region_strategy() -> impl Strategy<Value = Region> {
    // Coarse integer grid: lots of shared edges and duplicates
    (-20i32..20, -20i32..20, 0i32..6, 0i32..6).prop_map(|(x, y, w, h)| {
        let (x, y) = (x as f64 * 0.5, y as f64 * 0.5);
        Region::new(x, y, x + w as f64 * 0.5, y + h as f64 * 0.5).unwrap()
    })
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (region_strategy(), 0i32..8).prop_map(|(r, p)| Op::Insert(r, p)),
        2 => any::<usize>().prop_map(Op::DeleteLive),
        1 => region_strategy().prop_map(Op::DeleteMissing),
    ]
}

fn options_strategy() -> impl Strategy<Value = IndexOptions> {
    prop_oneof![
        (2usize..6, 1usize..4).prop_map(|(cache, min)| {
            IndexOptions::rtree()
                .with_node_capacity(min, min * 2 + 1)
                .with_cache_capacity(cache)
        }),
        (2usize..6).prop_map(|cache| {
            IndexOptions::rtree()
                .with_node_capacity(2, 5)
                .with_split_policy(SplitPolicy::Linear)
                .with_cache_capacity(cache)
        }),
        (2usize..6).prop_map(|cache| IndexOptions::quadtree().with_cache_capacity(cache)),
    ]
}

fn sorted_payloads(entries: impl Iterator<Item = Entry>) -> Vec<i32> {
    let mut payloads: Vec<i32> = entries.map(|e| e.payload).collect();
    payloads.sort_unstable();
    payloads
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn queries_match_model(
        options in options_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..120),
        window in region_strategy(),
    ) {
        let cache_capacity = options.cache_capacity;
        let mut index = SpatialIndex::in_memory(options).unwrap();
        let mut model: Vec<Entry> = Vec::new();

        for op in ops {
            match op {
                Op::Insert(region, payload) => {
                    index.insert(region, payload).unwrap();
                    model.push(Entry::new(region, payload));
                }
                Op::DeleteLive(i) if !model.is_empty() => {
                    let entry = model.swap_remove(i % model.len());
                    prop_assert!(index.delete(&entry.region, entry.payload).unwrap());
                }
                Op::DeleteLive(_) => {}
                Op::DeleteMissing(region) => {
                    // Payload 100 is never inserted
                    prop_assert!(!index.delete(&region, 100).unwrap());
                }
            }
            prop_assert!(index.cached_nodes() <= cache_capacity);
        }

        prop_assert_eq!(index.statistics().data_count, model.len() as u64);

        let mut hits = CollectingVisitor::new();
        index.intersection_query(&window, &mut hits).unwrap();
        prop_assert_eq!(
            hits.payloads(),
            sorted_payloads(model.iter().copied().filter(|e| window.intersects(&e.region)))
        );

        let mut inside = CollectingVisitor::new();
        index.containment_query(&window, &mut inside).unwrap();
        prop_assert_eq!(
            inside.payloads(),
            sorted_payloads(model.iter().copied().filter(|e| window.contains(&e.region)))
        );

        // Every live entry lies inside the root region
        if let Some(bounds) = index.bounds().unwrap() {
            for entry in &model {
                prop_assert!(bounds.contains(&entry.region));
            }
        } else {
            prop_assert!(model.is_empty());
        }
    }
}
