//! Randomized concurrent allocation against the block hash table

use std::collections::{HashMap, HashSet};

use fusion_engine::map::{BlockHeap, HashTable, InsertOutcome};
use glam::IVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

fn random_coords(seed: u64, count: usize, extent: i32) -> Vec<IVec3> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            IVec3::new(
                rng.gen_range(-extent..=extent),
                rng.gen_range(-extent..=extent),
                rng.gen_range(-extent..=extent),
            )
        })
        .collect()
}

#[test]
fn test_random_concurrent_inserts_stay_consistent() {
    let coords = random_coords(0x5eed, 20_000, 12);
    let unique: HashSet<IVec3> = coords.iter().copied().collect();

    let table = HashTable::new(8192, 2, 8192);
    let mut heap = BlockHeap::new(16_384);

    let inserted = coords
        .par_iter()
        .filter(|c| table.try_insert(**c, &heap).is_inserted())
        .count();
    heap.reclaim();

    assert_eq!(inserted, unique.len());
    assert_eq!(table.allocated_count(), unique.len());
    assert_eq!(heap.used_count() as usize, unique.len());
    assert_eq!(heap.used_count() + heap.free_count(), heap.capacity());

    let mut slots: HashMap<i32, IVec3> = HashMap::new();
    for c in &unique {
        let slot = table.lookup(*c).expect("inserted coordinate missing");
        assert!(slots.insert(slot, *c).is_none(), "slot {} handed out twice", slot);
    }

    // Second round only finds existing entries
    let outcomes: Vec<InsertOutcome> = coords.par_iter().map(|c| table.try_insert(*c, &heap)).collect();
    assert!(outcomes.iter().all(|o| matches!(o, InsertOutcome::Existing { .. })));
    assert!(table.lookup(IVec3::new(1000, 0, 0)).is_none());
}

#[test]
fn test_random_inserts_past_capacity() {
    let coords = random_coords(0xfeed, 5_000, 30);
    let unique: HashSet<IVec3> = coords.iter().copied().collect();
    assert!(unique.len() > 1000);

    let table = HashTable::new(512, 2, 256);
    let mut heap = BlockHeap::new(1000);

    let outcomes: Vec<InsertOutcome> = coords.par_iter().map(|c| table.try_insert(*c, &heap)).collect();
    heap.reclaim();

    let inserted = outcomes.iter().filter(|o| o.is_inserted()).count();
    assert!(inserted <= 1000);
    assert_eq!(table.allocated_count(), inserted);
    assert_eq!(heap.used_count() as usize, inserted);
    assert_eq!(heap.used_count() + heap.free_count(), heap.capacity());
    assert!(table.excess_used() <= table.num_excess());

    for (index, entry) in table.allocated_entries() {
        assert_eq!(table.lookup(entry.block_coord()), Some(entry.ptr));
        assert_eq!(table.lookup_entry(entry.block_coord()).map(|(i, _)| i), Some(index));
    }
}
