use super::*;
use rayon::prelude::*;
use std::collections::HashSet;

fn assert_unique(table: &HashTable) {
    let entries = table.allocated_entries();
    let slots: HashSet<i32> = entries.iter().map(|(_, e)| e.ptr).collect();
    let coords: HashSet<IVec3> = entries.iter().map(|(_, e)| e.block_coord()).collect();
    assert_eq!(slots.len(), entries.len(), "heap slot shared by two entries");
    assert_eq!(coords.len(), entries.len(), "block coordinate stored twice");
}

#[test]
fn test_coordinate_helpers_handle_negatives() {
    assert_eq!(voxel_to_block(IVec3::new(-1, 7, 8)), IVec3::new(-1, 0, 1));
    assert_eq!(voxel_to_local(IVec3::new(-1, 7, 8)), IVec3::new(7, 7, 0));
    assert_eq!(world_to_block(Vec3::new(-0.001, 0.0, 0.159), 0.01), IVec3::new(-1, 0, 1));

    for i in [0, 1, 63, 64, 511] {
        assert_eq!(local_index(local_offset(i)), i);
    }
}

#[test]
fn test_concurrent_inserts_same_coordinates() {
    let table = HashTable::new(8, 2, 64);
    let mut heap = BlockHeap::new(1024);
    let coords: Vec<IVec3> = (0..40).map(|i| IVec3::new(i % 5, i / 5, -i)).collect();

    // Every coordinate requested by many workers at once
    (0..16 * coords.len()).into_par_iter().for_each(|i| {
        table.try_insert(coords[i % coords.len()], &heap);
    });
    heap.reclaim();

    assert_eq!(table.allocated_count(), coords.len());
    assert_unique(&table);
    assert_eq!(heap.used_count(), coords.len() as u32);
    assert_eq!(heap.used_count() + heap.free_count(), heap.capacity());
    for c in &coords {
        assert!(table.lookup(*c).is_some());
    }
}

#[test]
fn test_exhaustion_leaves_valid_table() {
    let table = HashTable::new(32, 2, 32);
    let mut heap = BlockHeap::new(20);

    let inserted = (0..100)
        .into_par_iter()
        .filter(|&i| table.try_insert(IVec3::new(i, 2 * i, -i), &heap).is_inserted())
        .count();
    heap.reclaim();

    assert_eq!(inserted, 20);
    assert_eq!(table.allocated_count(), 20);
    assert_eq!(heap.free_count(), 0);
    assert_unique(&table);
}

#[test]
fn test_excess_exhaustion_returns_heap_slot() {
    let table = HashTable::new(1, 1, 2);
    let mut heap = BlockHeap::new(10);
    let outcomes: Vec<InsertOutcome> = (0..5)
        .map(|x| table.try_insert(IVec3::new(x, 0, 0), &heap))
        .collect();
    heap.reclaim();

    assert_eq!(outcomes.iter().filter(|o| o.is_inserted()).count(), 3);
    assert_eq!(outcomes[4], InsertOutcome::ExcessExhausted);
    assert_eq!(heap.used_count(), 3);
    assert_eq!(heap.free_count(), 7);
}

#[test]
fn test_view_trilinear_sample() {
    let table = HashTable::new(64, 2, 16);
    let heap = BlockHeap::new(8);
    let mut voxels = VoxelStore::new(8);

    let slot = match table.try_insert(IVec3::ZERO, &heap) {
        InsertOutcome::Inserted { slot, .. } => slot,
        other => panic!("unexpected {other:?}"),
    };
    // sdf varies linearly along x
    for (i, v) in voxels.block_mut(slot).unwrap().iter_mut().enumerate() {
        let local = local_offset(i);
        v.sdf = local.x as f32 * 0.1;
        v.weight = 1;
    }

    let view = MapView {
        table: &table,
        heap: &heap,
        voxels: &voxels,
        voxel_size: 0.01,
        truncation: 0.04,
    };
    let sdf = view.sample_sdf(Vec3::new(0.025, 0.03, 0.03)).unwrap();
    assert!((sdf - 0.25).abs() < 1e-4);

    let n = view.gradient(Vec3::new(0.035, 0.035, 0.035)).unwrap();
    assert!((n - Vec3::X).length() < 1e-3);

    // Samples straddling into the unallocated neighbour fail
    assert!(view.sample_sdf(Vec3::new(0.075, 0.03, 0.03)).is_none());
    assert!(view.sample_sdf(Vec3::new(-0.005, 0.03, 0.03)).is_none());
}

#[test]
fn test_reset_is_idempotent() {
    let table = HashTable::new(16, 2, 8);
    let heap = BlockHeap::new(16);
    for i in 0..10 {
        table.try_insert(IVec3::new(i, 0, 0), &heap);
    }
    for _ in 0..2 {
        table.reset();
        heap.reset();
        assert_eq!(table.allocated_count(), 0);
        assert_eq!(heap.free_count(), 16);
        assert!((0..10).all(|i| table.lookup(IVec3::new(i, 0, 0)).is_none()));
    }
}
