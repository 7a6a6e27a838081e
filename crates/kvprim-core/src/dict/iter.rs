//! The no-mutation iterator: borrows the dict immutably for its whole
//! lifetime (so the borrow checker forbids any `insert`/`remove`/`replace`
//! call while it's alive) and, as a second line of defense, snapshots a
//! fingerprint on creation and asserts it is unchanged on `Drop`.

use super::{Dict, DictPolicy, Table};

pub struct UnsafeIter<'a, K, V, P: DictPolicy<K>> {
    dict: &'a Dict<K, V, P>,
    fingerprint: u64,
    table: usize,
    bucket: usize,
    cur: Option<&'a super::Node<K, V>>,
}

impl<'a, K, V, P: DictPolicy<K>> UnsafeIter<'a, K, V, P> {
    pub(super) fn new(dict: &'a Dict<K, V, P>) -> Self {
        Self {
            fingerprint: dict.fingerprint(),
            dict,
            table: 0,
            bucket: 0,
            cur: None,
        }
    }

    fn table_ref(&self, idx: usize) -> &'a Table<K, V> {
        if idx == 0 {
            &self.dict.t0
        } else {
            &self.dict.t1
        }
    }
}

impl<'a, K, V, P: DictPolicy<K>> Iterator for UnsafeIter<'a, K, V, P> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(node) = self.cur {
                self.cur = node.next.as_deref();
                return Some((&node.key, &node.value));
            }

            if self.table > 1 {
                return None;
            }
            let table = self.table_ref(self.table);
            if self.bucket >= table.size() {
                if self.table == 0 && self.dict.is_rehashing() {
                    self.table = 1;
                    self.bucket = 0;
                    continue;
                }
                self.table = 2;
                return None;
            }
            self.cur = table.buckets[self.bucket].as_deref();
            self.bucket += 1;
        }
    }
}

impl<'a, K, V, P: DictPolicy<K>> Drop for UnsafeIter<'a, K, V, P> {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.fingerprint,
            self.dict.fingerprint(),
            "dict mutated while an unsafe iterator was live"
        );
    }
}
