//! Confirms the structured lifecycle events described in SPEC_FULL.md §4.5
//! actually fire at the transitions they document.

use kvprim_core::{Dict, IntSet};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn intset_upgrade_is_logged() {
    let mut s = IntSet::new();
    s.add(1);
    s.add(100_000); // forces an I16 -> I32 upgrade
    assert!(logs_contain("encoding upgrade"));
}

#[traced_test]
#[test]
fn dict_expand_is_logged() {
    let mut d: Dict<u32, u32> = Dict::new();
    for i in 0..5u32 {
        d.insert(i, i).unwrap();
    }
    assert!(logs_contain("expand begins rehash"));
}
