//! Backend-generic tests run against both metadata store implementations.

use std::collections::HashSet;

use skerry_types::{Address, Meta};

use crate::{FjallMetaStore, MemoryMetaStore, MetaError, MetaStore};

/// Run a test against both the in-memory and the Fjall (temporary) backend.
fn with_both_backends(f: impl Fn(&dyn MetaStore)) {
    f(&MemoryMetaStore::new());
    f(&FjallMetaStore::open_temporary().unwrap());
}

/// Test-only access to the raw free-slot counters.
trait AdjustSlots: MetaStore {
    fn adjust(&self, shard: u8, delta: i64);
}

impl AdjustSlots for MemoryMetaStore {
    fn adjust(&self, shard: u8, delta: i64) {
        self.adjust_free_slots(shard, delta);
    }
}

impl AdjustSlots for FjallMetaStore {
    fn adjust(&self, shard: u8, delta: i64) {
        self.adjust_free_slots(shard, delta);
    }
}

fn addr(bytes: &[u8]) -> Address {
    Address::from(bytes)
}

#[test]
fn test_set_get_roundtrip() {
    with_both_backends(|store| {
        let a = addr(&[0xaa, 0x03]);
        let meta = Meta { size: 100, offset: 8192 };
        store.set(&a, 3, false, meta).unwrap();
        assert_eq!(store.get(&a).unwrap(), meta);
    });
}

#[test]
fn test_get_missing_is_not_found() {
    with_both_backends(|store| {
        let err = store.get(&addr(&[0x01])).unwrap_err();
        assert!(matches!(err, MetaError::NotFound(_)));
    });
}

#[test]
fn test_remove_missing_is_not_found() {
    with_both_backends(|store| {
        let err = store.remove(&addr(&[0x01]), 1).unwrap_err();
        assert!(matches!(err, MetaError::NotFound(_)));
    });
}

#[test]
fn test_count_tracks_live_records() {
    with_both_backends(|store| {
        assert_eq!(store.count().unwrap(), 0);
        for i in 0..5u8 {
            store
                .set(
                    &addr(&[i, i]),
                    i % 32,
                    false,
                    Meta { size: 1, offset: u64::from(i) * 4096 },
                )
                .unwrap();
        }
        assert_eq!(store.count().unwrap(), 5);
        store.remove(&addr(&[2, 2]), 2).unwrap();
        assert_eq!(store.count().unwrap(), 4);
    });
}

#[test]
fn test_free_offset_peeks_without_consuming() {
    with_both_backends(|store| {
        let a = addr(&[0x09]);
        store.set(&a, 9, false, Meta { size: 7, offset: 0 }).unwrap();
        store.remove(&a, 9).unwrap();

        assert_eq!(store.free_offset(9).unwrap(), Some(0));
        assert_eq!(store.free_offset(9).unwrap(), Some(0));

        // The reclaimed set consumes it.
        store
            .set(&addr(&[0x29]), 9, true, Meta { size: 7, offset: 0 })
            .unwrap();
        assert_eq!(store.free_offset(9).unwrap(), None);
    });
}

#[test]
fn test_free_offsets_stay_per_shard() {
    with_both_backends(|store| {
        let a = addr(&[0x04]);
        store.set(&a, 4, false, Meta { size: 7, offset: 4096 }).unwrap();
        store.remove(&a, 4).unwrap();

        assert_eq!(store.free_offset(4).unwrap(), Some(4096));
        assert_eq!(store.free_offset(5).unwrap(), None);
    });
}

#[test]
fn test_iterate_visits_every_record_once() {
    with_both_backends(|store| {
        let mut expected = HashSet::new();
        for i in 0..20u8 {
            let a = addr(&[0xf0, i]);
            store
                .set(&a, a.shard(), false, Meta { size: 1, offset: u64::from(i) * 4096 })
                .unwrap();
            expected.insert(a);
        }

        let mut seen = HashSet::new();
        store
            .iterate(&mut |a, _| {
                assert!(seen.insert(a), "address visited twice");
                false
            })
            .unwrap();
        assert_eq!(seen, expected);
    });
}

#[test]
fn test_iterate_stops_early() {
    with_both_backends(|store| {
        for i in 0..10u8 {
            store
                .set(&addr(&[i]), i % 32, false, Meta { size: 1, offset: 0 })
                .unwrap();
        }
        let mut visited = 0;
        store
            .iterate(&mut |_, _| {
                visited += 1;
                visited == 3
            })
            .unwrap();
        assert_eq!(visited, 3);
    });
}

#[test]
fn test_displaced_offset_returned_on_replacement() {
    with_both_backends(|store| {
        let a = addr(&[0x06]);
        store.set(&a, 6, false, Meta { size: 5, offset: 0 }).unwrap();
        let displaced = store
            .set(&a, 6, false, Meta { size: 9, offset: 4096 })
            .unwrap();
        assert_eq!(displaced, Some(0));
        assert_eq!(store.free_offset(6).unwrap(), Some(0));
        assert_eq!(store.shard_slots(false)[6].slots, 1);
    });
}

#[test]
fn test_close_is_idempotent() {
    with_both_backends(|store| {
        store.close().unwrap();
        store.close().unwrap();
    });
}

// ---------------------------------------------------------------------------
// Shard-slots view
// ---------------------------------------------------------------------------

fn with_adjustable_backends(f: impl Fn(&dyn AdjustSlots)) {
    f(&MemoryMetaStore::new());
    f(&FjallMetaStore::open_temporary().unwrap());
}

#[test]
fn test_shard_slots_unsorted() {
    struct Case {
        shard: u8,
        delta: i64,
        expect: i64,
        zero: &'static [usize],
    }

    with_adjustable_backends(|store| {
        for case in [
            // Initial state, all zero.
            Case { shard: 0, delta: 0, expect: 0, zero: &[0, 1, 2, 3] },
            // Increment shard 0.
            Case { shard: 0, delta: 3, expect: 3, zero: &[1, 2, 3] },
            // Increment shard 2.
            Case { shard: 2, delta: 15, expect: 15, zero: &[1, 3] },
            // Decrement shard 0.
            Case { shard: 0, delta: -2, expect: 1, zero: &[1, 3] },
            // Back to zero on shard 0.
            Case { shard: 0, delta: -1, expect: 0, zero: &[0, 1, 3] },
        ] {
            store.adjust(case.shard, case.delta);
            let view = store.shard_slots(false);

            assert_eq!(view[case.shard as usize].shard, case.shard);
            assert_eq!(view[case.shard as usize].slots, case.expect);
            for &i in case.zero {
                assert_eq!(view[i].slots, 0, "shard {i} should have no free slots");
            }
        }
    });
}

#[test]
fn test_shard_slots_sorted() {
    struct Case {
        shard: u8,
        delta: i64,
        head: &'static [(u8, i64)],
    }

    with_adjustable_backends(|store| {
        for case in [
            Case { shard: 0, delta: 0, head: &[(0, 0), (1, 0), (2, 0), (3, 0)] },
            Case { shard: 0, delta: 10, head: &[(0, 10), (1, 0), (2, 0), (3, 0)] },
            Case { shard: 2, delta: 11, head: &[(2, 11), (0, 10), (1, 0), (3, 0)] },
            Case { shard: 0, delta: -3, head: &[(2, 11), (0, 7), (1, 0), (3, 0)] },
            Case { shard: 3, delta: 8, head: &[(2, 11), (3, 8), (0, 7), (1, 0)] },
            Case { shard: 1, delta: 29, head: &[(1, 29), (2, 11), (3, 8), (0, 7)] },
        ] {
            store.adjust(case.shard, case.delta);
            let view = store.shard_slots(true);

            for (i, &(shard, slots)) in case.head.iter().enumerate() {
                assert_eq!(view[i].shard, shard, "wrong shard at index {i}");
                assert_eq!(view[i].slots, slots, "wrong slot count for shard {shard}");
            }

            // Everything past the populated head is zero, in ascending
            // shard-id order.
            let tail = &view[case.head.len()..];
            for pair in tail.windows(2) {
                assert!(pair[0].shard < pair[1].shard);
            }
            assert!(tail.iter().all(|s| s.slots == 0));
        }
    });
}
