//! Tracker admission, release, and teardown tests

use memtrack_core::config::TrackerConfig;
use memtrack_mem::{Addr, CountingAlloc, Error, Tracker};

fn counting(max_bytes: usize) -> (Tracker<CountingAlloc>, CountingAlloc) {
    let host = CountingAlloc::new();
    let tracker = Tracker::with_allocator(&TrackerConfig::with_max_bytes(max_bytes), host.clone());
    (tracker, host)
}

#[test]
fn test_budget_exhaustion() {
    let mut mt = Tracker::new(150);

    let a = mt.alloc(100).expect("first alloc failed");
    assert_eq!(mt.used_bytes(), 100);

    // 100 + 100 > 150
    let result = mt.alloc(100);
    assert!(matches!(
        result,
        Err(Error::BudgetExceeded {
            requested: 100,
            used: 100,
            max: 150
        })
    ));
    assert_eq!(mt.used_bytes(), 100);
    assert!(mt.contains(a));
}

#[test]
fn test_release_makes_room() {
    let mut mt = Tracker::new(150);
    let a = mt.alloc(100).expect("alloc failed");
    assert!(mt.alloc(100).is_err());

    mt.release(a);
    assert_eq!(mt.used_bytes(), 0);

    let b = mt.alloc(100).expect("alloc after release failed");
    assert_eq!(mt.used_bytes(), 100);
    assert!(mt.contains(b));
}

#[test]
fn test_grow_and_shrink_account_by_size() {
    let mut mt = Tracker::new(1000);
    let a = mt.alloc(50).expect("alloc failed");

    let a = mt.grow(a, 200).expect("grow failed");
    assert_eq!(mt.used_bytes(), 200);

    let a = mt.grow(a, 10).expect("shrink failed");
    assert_eq!(mt.used_bytes(), 10);
    assert_eq!(mt.size_of(a), Some(10));
}

#[test]
fn test_zero_ceiling_selects_default() {
    let mt = Tracker::new(0);
    assert_eq!(mt.max_bytes(), 134_217_728);
}

#[test]
fn test_teardown_returns_every_region_once() {
    let (mut mt, host) = counting(1024);
    mt.alloc(64).expect("alloc failed");
    mt.alloc(64).expect("alloc failed");
    assert_eq!(host.counts().live, 2);

    let report = mt.teardown();
    assert_eq!(report.entries, 2);
    assert_eq!(report.bytes, 128);

    let counts = host.counts();
    assert_eq!(counts.deallocs, 2);
    assert_eq!(counts.live, 0);
    assert_eq!(counts.unknown_frees, 0);
}

#[test]
fn test_drop_releases_like_teardown() {
    let (mut mt, host) = counting(1024);
    mt.alloc(32).expect("alloc failed");
    mt.alloc_zeroed(4, 8).expect("zeroed alloc failed");
    drop(mt);
    assert_eq!(host.counts().live, 0);
    assert_eq!(host.counts().deallocs, 2);
}

#[test]
fn test_grow_unknown_address() {
    let mut mt = Tracker::new(1000);
    mt.alloc(40).expect("alloc failed");

    let bogus = Addr::new(0xdead_bee0);
    assert!(matches!(
        mt.grow(bogus, 10),
        Err(Error::NotTracked { addr }) if addr == bogus
    ));
    assert_eq!(mt.used_bytes(), 40);
}

#[test]
fn test_release_is_idempotent_on_unknown_input() {
    let (mut mt, host) = counting(1024);
    let a = mt.alloc(16).expect("alloc failed");
    mt.release(a);
    mt.release(a);
    mt.release(Addr::new(0x1000));

    assert_eq!(mt.used_bytes(), 0);
    assert_eq!(mt.stats().unknown_releases, 2);
    // nothing unknown ever reaches the host
    assert_eq!(host.counts().deallocs, 1);
    assert_eq!(host.counts().unknown_frees, 0);
}

#[test]
fn test_no_leak_when_tracking_fails() {
    let host = CountingAlloc::new();
    let cfg = TrackerConfig {
        max_bytes: 4096,
        max_entries: Some(2),
        ..TrackerConfig::default()
    };
    let mut mt = Tracker::with_allocator(&cfg, host.clone());
    mt.alloc(8).expect("alloc failed");
    mt.alloc(8).expect("alloc failed");

    let result = mt.alloc(8);
    assert!(matches!(result, Err(Error::TrackingFailed { entries: 2 })));
    assert_eq!(mt.used_bytes(), 16);
    assert_eq!(mt.len(), 2);
    // the third region was handed back immediately
    assert_eq!(host.counts().allocs, 3);
    assert_eq!(host.counts().live, 2);
}

#[test]
fn test_host_failure_leaves_state_untouched() {
    let (mut mt, host) = counting(4096);
    let a = mt.alloc(100).expect("alloc failed");
    mt.write(a, 0, b"keep").expect("write failed");

    host.fail_next_allocs(1);
    assert!(matches!(mt.alloc(10), Err(Error::AllocFailed { bytes: 10 })));

    host.fail_next_reallocs(1);
    assert!(matches!(mt.grow(a, 200), Err(Error::AllocFailed { bytes: 200 })));
    assert_eq!(mt.used_bytes(), 100);
    assert_eq!(&mt.bytes(a).expect("still tracked")[..4], b"keep");
}

#[test]
fn test_grow_preserves_content() {
    let mut mt = Tracker::new(4096);
    let a = mt.alloc_bytes(b"hello tracker").expect("alloc failed");
    let a = mt.grow(a, 1024).expect("grow failed");

    let bytes = mt.bytes(a).expect("tracked");
    assert_eq!(&bytes[..13], b"hello tracker");
    assert!(bytes[13..].iter().all(|&b| b == 0));
}

#[test]
fn test_shrink_preserves_prefix() {
    let mut mt = Tracker::new(4096);
    let a = mt.alloc_bytes(b"abcdefgh").expect("alloc failed");
    let a = mt.grow(a, 3).expect("shrink failed");

    assert_eq!(mt.bytes(a).expect("tracked"), b"abc");
    assert_eq!(mt.used_bytes(), 3);

    // growing back exposes zeros, not the old tail
    let a = mt.grow(a, 8).expect("grow failed");
    assert_eq!(mt.bytes(a).expect("tracked"), b"abc\0\0\0\0\0");
}

#[test]
fn test_zeroed_admission_uses_total_size() {
    let mut mt = Tracker::new(100);
    // each element fits, the product does not
    assert!(matches!(
        mt.alloc_zeroed(20, 8),
        Err(Error::BudgetExceeded { requested: 160, .. })
    ));
    assert!(matches!(
        mt.alloc_zeroed(usize::MAX, 2),
        Err(Error::BudgetExceeded { .. })
    ));
    assert_eq!(mt.used_bytes(), 0);
    assert_eq!(mt.stats().rejected, 2);
}

#[test]
fn test_budget_invariant_over_mixed_workload() {
    let mut mt = Tracker::new(2048);
    let mut live: Vec<Addr> = Vec::new();

    for round in 0..200usize {
        let size = (round * 37) % 300;
        match round % 4 {
            0 | 1 => {
                if let Ok(addr) = mt.alloc(size) {
                    live.push(addr);
                }
            }
            2 if !live.is_empty() => {
                let idx = round % live.len();
                if let Ok(addr) = mt.grow(live[idx], size) {
                    live[idx] = addr;
                }
            }
            _ => {
                if !live.is_empty() {
                    let addr = live.swap_remove(round % live.len());
                    mt.release(addr);
                }
            }
        }
        assert!(mt.used_bytes() <= mt.max_bytes());
        let sum: usize = mt.iter().map(|(_, size)| size).sum();
        assert_eq!(sum, mt.used_bytes());
        assert_eq!(mt.len(), live.len());
    }
    assert!(mt.stats().peak_bytes <= 2048);
}

#[test]
fn test_identities_are_unique() {
    let mut mt = Tracker::new(4096);
    let addrs: Vec<Addr> = (0..16).map(|_| mt.alloc(0).expect("alloc failed")).collect();

    let mut sorted = addrs.clone();
    sorted.sort_by_key(|a| a.get());
    sorted.dedup();
    assert_eq!(sorted.len(), addrs.len());
    assert_eq!(mt.used_bytes(), 0);
}

#[test]
fn test_release_does_not_preserve_entry_order() {
    let mut mt = Tracker::new(4096);
    let a = mt.alloc(1).expect("alloc failed");
    let b = mt.alloc(2).expect("alloc failed");
    let c = mt.alloc(3).expect("alloc failed");

    mt.release(a);
    // the last entry moved into the freed slot
    let order: Vec<Addr> = mt.iter().map(|(addr, _)| addr).collect();
    assert_eq!(order, [c, b]);
}

#[test]
fn test_lowered_ceiling_evicts_nothing() {
    let mut mt = Tracker::new(1000);
    let a = mt.alloc(600).expect("alloc failed");
    mt.set_max_bytes(100);

    assert_eq!(mt.used_bytes(), 600);
    assert_eq!(mt.free_bytes(), 0);
    assert!(mt.alloc(1).is_err());
    // shrinking needs no admission
    mt.grow(a, 50).expect("shrink failed");
    assert_eq!(mt.free_bytes(), 50);
}

#[test]
fn test_trackers_are_independent() {
    let mut first = Tracker::new(100);
    let mut second = Tracker::new(100);
    assert_ne!(first.id(), second.id());

    let a = first.alloc(80).expect("alloc failed");
    second.alloc(80).expect("alloc failed");

    // releasing through the wrong tracker is a no-op
    second.release(a);
    assert_eq!(first.used_bytes(), 80);
    assert_eq!(second.used_bytes(), 80);
}

#[test]
fn test_borrowed_host() {
    let host = CountingAlloc::new();
    {
        let mut mt = Tracker::with_allocator(&TrackerConfig::with_max_bytes(256), &host);
        mt.alloc(100).expect("alloc failed");
        assert_eq!(host.counts().live_bytes, 100);
    }
    assert_eq!(host.counts().live, 0);
}
