// HashOpen unit test suite (public API).
//
// Each test documents what behavior is being verified and which
// invariants are assumed or asserted. The core invariants exercised:
// - Chaining: elements with one hash share a chain in insertion order.
// - Lookup: search/find/remove_matching consult only the chain for the hash
//   and let the caller decide equality.
// - Load: below half load after insert, above an eighth after removal unless
//   at the minimum size.
// - Handles: stable across resizes, dead after removal.
// - Drop: payloads still in the table are dropped with it.
use hashopen::{HashOpen, TableError, DEFAULT_MIN_BIT, LINE_BIT, MAX_BIT};
use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

#[derive(Debug, PartialEq)]
struct Record {
    key: String,
    value: i32,
}

fn hash32(key: &str) -> u32 {
    let mut h = DefaultHasher::new();
    key.hash(&mut h);
    h.finish() as u32
}

fn insert(t: &mut HashOpen<Record>, key: &str, value: i32) -> hashopen::Handle {
    t.insert(
        hash32(key),
        Record {
            key: key.to_string(),
            value,
        },
    )
    .expect("insert ok")
}

fn lookup<'a>(t: &'a HashOpen<Record>, key: &str) -> Option<&'a Record> {
    t.search(hash32(key), |r| r.key == key)
}

// Test: a keyed index built on caller hashes.
// Assumes: equality is decided by the caller predicate.
// Verifies: every key is found; absent keys are not.
#[test]
fn keyed_index_round_trip() {
    let mut t = HashOpen::new();
    for i in 0..500 {
        insert(&mut t, &format!("key{i}"), i);
    }
    assert_eq!(t.len(), 500);
    for i in 0..500 {
        let r = lookup(&t, &format!("key{i}")).expect("present");
        assert_eq!(r.value, i);
    }
    assert!(lookup(&t, "absent").is_none());

    for i in (0..500).step_by(2) {
        let key = format!("key{i}");
        let r = t
            .remove_matching(hash32(&key), |r| r.key == key)
            .expect("removed");
        assert_eq!(r.value, i);
    }
    assert_eq!(t.len(), 250);
    for i in 0..500 {
        assert_eq!(lookup(&t, &format!("key{i}")).is_some(), i % 2 == 1);
    }
}

// Test: full hash collisions between different keys.
// Assumes: distinct keys may share a hash; the chain holds both.
// Verifies: predicate picks the right element; removal keeps the other.
#[test]
fn colliding_keys_share_a_chain() {
    let mut t = HashOpen::new();
    let a = t
        .insert(
            77,
            Record {
                key: "a".into(),
                value: 1,
            },
        )
        .unwrap();
    t.insert(
        77,
        Record {
            key: "b".into(),
            value: 2,
        },
    )
    .unwrap();

    assert_eq!(t.stats().filled_count, 1);
    assert_eq!(t.search(77, |r| r.key == "b").map(|r| r.value), Some(2));
    assert_eq!(t.find(77, |r| r.key == "a"), Some(a));

    let removed = t.remove(a).expect("live");
    assert_eq!(removed.key, "a");
    let left: Vec<_> = t.bucket(77).map(|(_, r)| r.key.as_str()).collect();
    assert_eq!(left, ["b"]);
}

// Test: handles survive growth and shrinkage.
// Assumes: resize moves chains, never nodes.
// Verifies: every handle resolves to its own payload throughout.
#[test]
fn handles_stable_across_resizes() {
    let mut t = HashOpen::new();
    let first = insert(&mut t, "first", -1);
    let bit0 = t.stats().bucket_bit;
    let many: Vec<_> = (0..2000)
        .map(|i| insert(&mut t, &format!("k{i}"), i))
        .collect();
    assert!(t.stats().bucket_bit > bit0);
    assert_eq!(first.value(&t).map(|r| r.value), Some(-1));

    for h in many {
        assert!(t.remove(h).is_some());
    }
    assert_eq!(t.stats().bucket_bit, DEFAULT_MIN_BIT);
    assert_eq!(t.get(first).map(|r| r.key.as_str()), Some("first"));
}

// Test: load bounds after every mutation.
// Assumes: grow at half load, shrink at an eighth.
// Verifies: the bounds hold on a mixed insert/remove workload.
#[test]
fn load_bounds_hold() {
    let mut t: HashOpen<u32> = HashOpen::new();
    let mut handles = Vec::new();
    let mut s = 0x9e3779b97f4a7c15u64;
    for round in 0..5000u32 {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        if s % 3 != 0 || handles.is_empty() {
            handles.push(t.insert((s >> 32) as u32, round).unwrap());
            let st = t.stats();
            assert!((st.filled_count + st.deleted_count) * 2 < st.bucket_max);
            assert!(st.load_factor() < 0.5);
        } else {
            let h = handles.swap_remove((s >> 40) as usize % handles.len());
            assert!(t.remove(h).is_some());
            let st = t.stats();
            assert!(st.bucket_bit == st.min_bit || st.filled_count * 8 > st.bucket_max);
        }
    }
    assert_eq!(t.len(), handles.len());
}

// Test: tombstones accumulate under churn and resize clears them.
// Assumes: a resize rebuilds from live chains only.
// Verifies: emptied chains leave tombstones, an insert on the same line
// reuses the first one, and shrink_to_fit drops the rest.
#[test]
fn churn_then_shrink_to_fit() {
    let mut t: HashOpen<u32> = HashOpen::with_min_bit(6);
    // multiples of 64 all start probing at slot 0
    let hs: Vec<_> = (0..20u32).map(|i| t.insert(i * 64, i).unwrap()).collect();
    assert_eq!(t.stats().filled_count, 20);
    for h in hs {
        t.remove(h);
    }
    assert_eq!((t.stats().filled_count, t.stats().deleted_count), (0, 20));
    assert_eq!(t.stats().bucket_bit, 6);

    t.insert(3, 3).unwrap();
    assert_eq!(t.stats().deleted_count, 19);

    t.shrink_to_fit().unwrap();
    let st = t.stats();
    assert_eq!(st.deleted_count, 0);
    assert_eq!(st.bucket_bit, 6);
    assert_eq!(t.search(3, |_| true), Some(&3));
    assert!(!t.contains_hash(64));
}

// Test: construction bounds.
// Verifies: InvalidMinBit outside the supported range; Display is readable.
#[test]
fn invalid_min_bit_reports_range() {
    let err = HashOpen::<()>::try_with_min_bit(MAX_BIT + 1).unwrap_err();
    match err {
        TableError::InvalidMinBit { bit, min, max } => {
            assert_eq!((bit, min, max), (MAX_BIT + 1, LINE_BIT, MAX_BIT));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err_text(MAX_BIT + 1).contains("out of range"));
}

fn err_text(bit: u32) -> String {
    HashOpen::<()>::try_with_min_bit(bit).unwrap_err().to_string()
}

// Test: oversized reservations.
// Assumes: reserve reports failure through its Result.
// Verifies: requests near usize::MAX return CapacityOverflow without panicking
// and without touching the table.
#[test]
fn reserve_overflow_is_reported() {
    let mut t: HashOpen<u32> = HashOpen::new();
    t.insert(1, 1).unwrap();
    assert!(t.reserve(usize::MAX).is_err());
    let err = t.reserve(usize::MAX - 1).unwrap_err();
    assert!(matches!(err, TableError::CapacityOverflow { .. }));
    assert!(err.to_string().contains("capacity overflow"));
    assert_eq!(t.len(), 1);
    assert_eq!(t.stats().bucket_bit, DEFAULT_MIN_BIT);
    t.reserve(100).expect("small reservation fits");
}

#[test]
#[should_panic(expected = "out of range")]
fn with_min_bit_panics_on_bad_bit() {
    let _ = HashOpen::<()>::with_min_bit(0);
}

// Test: payload ownership.
// Assumes: removal hands back the payload; the table drops the rest.
// Verifies: drop counts for removed, cleared and dropped-with-table payloads.
#[test]
fn payloads_dropped_exactly_once() {
    #[derive(Debug)]
    struct Tracked(Rc<Cell<usize>>);
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    let drops = Rc::new(Cell::new(0));
    let mut t = HashOpen::new();
    let h = t.insert(1, Tracked(drops.clone())).unwrap();
    for i in 0..9 {
        t.insert(i, Tracked(drops.clone())).unwrap();
    }

    let removed = t.remove(h).expect("live");
    assert_eq!(drops.get(), 0);
    drop(removed);
    assert_eq!(drops.get(), 1);

    t.clear();
    assert_eq!(drops.get(), 10);

    for i in 0..5 {
        t.insert(i, Tracked(drops.clone())).unwrap();
    }
    drop(t);
    assert_eq!(drops.get(), 15);
}

// Test: Debug output exposes the counters.
#[test]
fn debug_shows_stats() {
    let mut t: HashOpen<u8> = HashOpen::default();
    t.insert(1, 1).unwrap();
    let s = format!("{t:?}");
    assert!(s.contains("filled_count: 1"));
    assert!(s.contains("bucket_max: 16"));
}
