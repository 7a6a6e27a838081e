//! Open-hash-chaining dictionary with two backing tables and incremental,
//! amortized-O(1) rehashing.
//!
//! The physical state mirrors the distilled design directly: `t0`/`t1` are
//! the two tables, `rehashidx` is `None` when no rehash is in progress
//! (the `-1` sentinel from the C design, made a real `Option` here) and
//! `Some(idx)` otherwise, and `iterators` counts live safe iterators so
//! incremental rehashing can be suspended while one is outstanding.

mod hash;
mod iter;
mod scan;

use crate::config::DictConfig;
use crate::error::{KvError, Result};
use std::cell::Cell;
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;

pub use hash::{CaseInsensitiveBuildHasher, Murmur2BuildHasher};
pub use iter::UnsafeIter;

/// Caller-supplied key discipline: how to hash a key and how to compare
/// two keys for equality. The distilled spec models this as six function
/// pointers plus `private_data`; key/value duplication and destruction
/// fall out of ordinary `Clone`/`Drop` in this port and are not part of
/// the trait.
pub trait DictPolicy<K> {
    fn hash(&self, key: &K) -> u64;
    fn eq(&self, a: &K, b: &K) -> bool;
}

/// Default policy: any `K: Hash + Eq` hashed through a configurable
/// `BuildHasher` (MurmurHash2 by default).
pub struct StdPolicy<S = Murmur2BuildHasher> {
    hasher: S,
}

impl<S: Default> Default for StdPolicy<S> {
    fn default() -> Self {
        Self { hasher: S::default() }
    }
}

impl<S> StdPolicy<S> {
    pub fn new(hasher: S) -> Self {
        Self { hasher }
    }
}

impl<K: Hash + Eq, S: BuildHasher> DictPolicy<K> for StdPolicy<S> {
    fn hash(&self, key: &K) -> u64 {
        hash::hash_with(&self.hasher, key)
    }
    fn eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Case-insensitive policy for byte-string keys, using DJB-x33 over
/// ASCII-folded bytes.
pub struct CaseInsensitivePolicy {
    hasher: CaseInsensitiveBuildHasher,
}

impl Default for CaseInsensitivePolicy {
    fn default() -> Self {
        Self {
            hasher: CaseInsensitiveBuildHasher::default(),
        }
    }
}

impl DictPolicy<Vec<u8>> for CaseInsensitivePolicy {
    fn hash(&self, key: &Vec<u8>) -> u64 {
        let folded: Vec<u8> = key.iter().map(|b| b.to_ascii_lowercase()).collect();
        hash::hash_with(&self.hasher, &folded)
    }
    fn eq(&self, a: &Vec<u8>, b: &Vec<u8>) -> bool {
        a.eq_ignore_ascii_case(b)
    }
}

pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) next: Option<Box<Node<K, V>>>,
}

pub(crate) struct Table<K, V> {
    pub(crate) buckets: Vec<Option<Box<Node<K, V>>>>,
    pub(crate) mask: usize,
    pub(crate) used: usize,
}

impl<K, V> Table<K, V> {
    fn empty() -> Self {
        Self {
            buckets: Vec::new(),
            mask: 0,
            used: 0,
        }
    }

    fn new(size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        let mut buckets = Vec::with_capacity(size);
        buckets.resize_with(size, || None);
        Self {
            buckets,
            mask: size - 1,
            used: 0,
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.buckets.len()
    }
}

fn next_pow2(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    let mut n = n - 1;
    n |= n >> 1;
    n |= n >> 2;
    n |= n >> 4;
    n |= n >> 8;
    n |= n >> 16;
    n |= n >> 32;
    n + 1
}

fn find_in_table<'a, K, V, P: DictPolicy<K>>(
    table: &'a Table<K, V>,
    bucket: usize,
    key: &K,
    policy: &P,
) -> Option<&'a Node<K, V>> {
    let mut cur = table.buckets[bucket].as_deref();
    while let Some(node) = cur {
        if policy.eq(&node.key, key) {
            return Some(node);
        }
        cur = node.next.as_deref();
    }
    None
}

fn find_mut_in_table<'a, K, V, P: DictPolicy<K>>(
    table: &'a mut Table<K, V>,
    bucket: usize,
    key: &K,
    policy: &P,
) -> Option<&'a mut V> {
    let mut link = &mut table.buckets[bucket];
    loop {
        let matched = match link {
            Some(node) => policy.eq(&node.key, key),
            None => return None,
        };
        if matched {
            return Some(&mut link.as_mut().unwrap().value);
        }
        link = &mut link.as_mut().unwrap().next;
    }
}

fn remove_from_table<K, V, P: DictPolicy<K>>(
    table: &mut Table<K, V>,
    bucket: usize,
    key: &K,
    policy: &P,
) -> Option<(K, V)> {
    let mut link = &mut table.buckets[bucket];
    loop {
        let matched = match link {
            Some(node) => policy.eq(&node.key, key),
            None => return None,
        };
        if matched {
            let mut boxed = link.take().unwrap();
            *link = boxed.next.take();
            table.used -= 1;
            return Some((boxed.key, boxed.value));
        }
        link = &mut link.as_mut().unwrap().next;
    }
}

fn insert_into_table<K, V>(table: &mut Table<K, V>, bucket: usize, key: K, value: V) {
    let node = Box::new(Node {
        key,
        value,
        next: table.buckets[bucket].take(),
    });
    table.buckets[bucket] = Some(node);
    table.used += 1;
}

/// An incrementally-rehashing hash table dictionary.
pub struct Dict<K, V, P = StdPolicy<Murmur2BuildHasher>> {
    t0: Table<K, V>,
    t1: Table<K, V>,
    rehashidx: Option<usize>,
    iterators: Rc<Cell<usize>>,
    resize_enabled: bool,
    policy: P,
    config: DictConfig,
}

impl<K, V, P: DictPolicy<K> + Default> Dict<K, V, P> {
    /// Creates an empty dictionary with the default policy and config.
    pub fn new() -> Self {
        Self::with_policy(P::default(), DictConfig::default())
    }
}

impl<K, V, P: DictPolicy<K> + Default> Default for Dict<K, V, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, P: DictPolicy<K>> Dict<K, V, P> {
    /// Creates an empty dictionary with an explicit policy and config.
    pub fn with_policy(policy: P, config: DictConfig) -> Self {
        Self {
            t0: Table::empty(),
            t1: Table::empty(),
            rehashidx: None,
            iterators: Rc::new(Cell::new(0)),
            resize_enabled: true,
            policy,
            config,
        }
    }

    /// Number of live entries across both tables.
    pub fn len(&self) -> usize {
        self.t0.used + self.t1.used
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an incremental rehash is currently in progress.
    pub fn is_rehashing(&self) -> bool {
        self.rehashidx.is_some()
    }

    /// Disables automatic growth-on-load-factor (growth still happens once
    /// the load factor exceeds `force_ratio`). Mirrors the global
    /// "can-resize" toggle the reference dictionary uses to avoid COW
    /// page churn during a background save.
    pub fn set_resize_enabled(&mut self, enabled: bool) {
        self.resize_enabled = enabled;
    }

    fn hash_key(&self, key: &K) -> u64 {
        self.policy.hash(key)
    }

    fn maybe_rehash_step(&mut self) {
        if self.iterators.get() == 0 && self.is_rehashing() {
            self.rehash_step(1);
        }
    }

    fn expand_if_needed(&mut self) {
        if self.is_rehashing() {
            return;
        }
        if self.t0.size() == 0 {
            self.expand(self.config.initial_size);
            return;
        }
        if self.t0.used >= self.t0.size()
            && (self.resize_enabled || self.t0.used / self.t0.size() > self.config.force_ratio)
        {
            self.expand(self.t0.used * 2);
        }
    }

    /// Allocates a table sized to the smallest power of two `>= new_size_hint`
    /// (and `>= initial_size`). If `t0` is empty this is a first-time
    /// allocation; otherwise it installs the new table as `t1` and begins
    /// an incremental rehash. Returns whether anything changed.
    fn expand(&mut self, new_size_hint: usize) -> bool {
        if self.is_rehashing() {
            return false;
        }
        let new_size = next_pow2(new_size_hint.max(self.config.initial_size));
        if new_size < self.t0.used {
            return false;
        }
        if self.t0.size() == 0 {
            self.t0 = Table::new(new_size);
            tracing::debug!(target: "kvprim::dict", new_size, "initial allocation");
            return true;
        }
        if new_size == self.t0.size() {
            return false;
        }
        self.t1 = Table::new(new_size);
        self.rehashidx = Some(0);
        tracing::debug!(
            target: "kvprim::dict",
            old_size = self.t0.size(),
            new_size,
            used = self.t0.used,
            "expand begins rehash"
        );
        true
    }

    /// Shrinks (or grows) to the smallest power of two `>= max(used, initial_size)`.
    /// Driven externally -- nothing calls this automatically.
    pub fn resize(&mut self) -> bool {
        if self.is_rehashing() {
            return false;
        }
        let target = self.len().max(self.config.initial_size);
        self.expand(target)
    }

    /// Migrates up to `n` non-empty buckets from `t0` to `t1`, visiting at
    /// most `rehash_empty_visit_factor * n` empty buckets along the way.
    /// Returns whether a rehash was in progress to step.
    pub fn rehash_step(&mut self, n: usize) -> bool {
        if !self.is_rehashing() {
            return false;
        }
        let empty_budget = self.config.rehash_empty_visit_factor * n.max(1);
        let mut visited_empty = 0;
        let mut moved_buckets = 0;
        let mut idx = self.rehashidx.unwrap();

        while moved_buckets < n && idx < self.t0.size() {
            if self.t0.buckets[idx].is_none() {
                idx += 1;
                visited_empty += 1;
                if visited_empty >= empty_budget {
                    break;
                }
                continue;
            }
            let mut chain = self.t0.buckets[idx].take();
            let mut moved_nodes = 0usize;
            while let Some(mut node) = chain {
                chain = node.next.take();
                let h = self.hash_key(&node.key);
                let b1 = (h as usize) & self.t1.mask;
                node.next = self.t1.buckets[b1].take();
                self.t1.buckets[b1] = Some(node);
                self.t1.used += 1;
                moved_nodes += 1;
            }
            self.t0.used -= moved_nodes;
            idx += 1;
            moved_buckets += 1;
        }

        self.rehashidx = Some(idx);
        tracing::trace!(target: "kvprim::dict", idx, moved_buckets, "rehash_step");

        if self.t0.used == 0 {
            self.t0 = std::mem::replace(&mut self.t1, Table::empty());
            self.rehashidx = None;
            tracing::debug!(target: "kvprim::dict", final_size = self.t0.size(), "rehash complete");
        }
        true
    }

    /// Runs bounded batches of `rehash_ms_batch` buckets until either the
    /// rehash completes or `budget` elapses. Intended to be called from a
    /// periodic maintenance tick.
    pub fn rehash_millis(&mut self, budget: std::time::Duration) {
        let start = std::time::Instant::now();
        let batch = self.config.rehash_ms_batch;
        while self.is_rehashing() {
            if !self.rehash_step(batch) || start.elapsed() >= budget {
                break;
            }
        }
    }

    /// Looks up `key`, opportunistically stepping the rehash along the way.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.maybe_rehash_step();
        if self.t0.size() == 0 {
            return None;
        }
        let h = self.hash_key(key);
        let b0 = (h as usize) & self.t0.mask;
        if let Some(node) = find_in_table(&self.t0, b0, key, &self.policy) {
            return Some(&node.value);
        }
        if self.is_rehashing() {
            let b1 = (h as usize) & self.t1.mask;
            return find_in_table(&self.t1, b1, key, &self.policy).map(|n| &n.value);
        }
        None
    }

    pub fn contains_key(&mut self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Inserts `key`/`value`, refusing (and reporting) a duplicate key.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        self.maybe_rehash_step();
        self.expand_if_needed();

        let h = self.hash_key(&key);
        let b0 = (h as usize) & self.t0.mask;
        if find_in_table(&self.t0, b0, &key, &self.policy).is_some() {
            return Err(KvError::Duplicate);
        }
        if self.is_rehashing() {
            let b1 = (h as usize) & self.t1.mask;
            if find_in_table(&self.t1, b1, &key, &self.policy).is_some() {
                return Err(KvError::Duplicate);
            }
        }

        if self.is_rehashing() {
            let b1 = (h as usize) & self.t1.mask;
            insert_into_table(&mut self.t1, b1, key, value);
        } else {
            insert_into_table(&mut self.t0, b0, key, value);
        }
        Ok(())
    }

    /// Inserts `key`/`value`, overwriting and returning any prior value.
    /// The new value is stored before the old one is dropped, so a
    /// reference-counted value that happens to equal the old one is never
    /// observed at zero references mid-call.
    pub fn replace(&mut self, key: K, value: V) -> Option<V> {
        self.maybe_rehash_step();
        self.expand_if_needed();

        let h = self.hash_key(&key);
        let b0 = (h as usize) & self.t0.mask;
        if let Some(slot) = find_mut_in_table(&mut self.t0, b0, &key, &self.policy) {
            return Some(std::mem::replace(slot, value));
        }
        if self.is_rehashing() {
            let b1 = (h as usize) & self.t1.mask;
            if let Some(slot) = find_mut_in_table(&mut self.t1, b1, &key, &self.policy) {
                return Some(std::mem::replace(slot, value));
            }
        }

        if self.is_rehashing() {
            let b1 = (h as usize) & self.t1.mask;
            insert_into_table(&mut self.t1, b1, key, value);
        } else {
            insert_into_table(&mut self.t0, b0, key, value);
        }
        None
    }

    /// Removes `key`, returning its value if present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.maybe_rehash_step();
        if self.t0.size() == 0 {
            return None;
        }
        let h = self.hash_key(key);
        let b0 = (h as usize) & self.t0.mask;
        if let Some((_, v)) = remove_from_table(&mut self.t0, b0, key, &self.policy) {
            return Some(v);
        }
        if self.is_rehashing() {
            let b1 = (h as usize) & self.t1.mask;
            if let Some((_, v)) = remove_from_table(&mut self.t1, b1, key, &self.policy) {
                return Some(v);
            }
        }
        None
    }

    /// A 64-bit fingerprint over the internal pointers and sizes of both
    /// tables, used to detect mutation during unsafe iteration.
    fn fingerprint(&self) -> u64 {
        hash::mix_fields([
            self.t0.buckets.as_ptr() as u64,
            self.t0.size() as u64,
            self.t0.used as u64,
            self.t1.buckets.as_ptr() as u64,
            self.t1.size() as u64,
            self.t1.used as u64,
        ])
    }

    /// A no-mutation-allowed iterator that asserts the dictionary was not
    /// mutated between its creation and its release (on `Drop`). This is
    /// doubly enforced: the borrow checker rejects any `&mut self` call
    /// while the iterator is alive, and the fingerprint check below is a
    /// second line of defense against accidental interior mutability.
    pub fn iter_unsafe(&self) -> UnsafeIter<'_, K, V, P> {
        UnsafeIter::new(self)
    }

    /// Starts a mutation-tolerant safe iteration. The returned guard keeps
    /// the dict's rehash suspended for its lifetime; advance it with
    /// [`Dict::safe_next`].
    pub fn iter_safe(&self) -> SafeIterGuard<K> {
        self.iterators.set(self.iterators.get() + 1);
        SafeIterGuard {
            iterators: Rc::clone(&self.iterators),
            table: 0,
            bucket: 0,
            pending: None,
            released: false,
        }
    }
}

/// A position inside a safe iteration, obtained from [`Dict::iter_safe`].
///
/// While this guard is alive, the owning dict refuses incremental rehash
/// steps (tracked via a shared counter, not a borrow, so the dict remains
/// freely mutable between calls to [`Dict::safe_next`]).
pub struct SafeIterGuard<K> {
    iterators: Rc<Cell<usize>>,
    table: usize,
    bucket: usize,
    pending: Option<K>,
    released: bool,
}

impl<K> SafeIterGuard<K> {
    /// Ends the iteration early, re-enabling rehash immediately instead of
    /// waiting for `Drop`.
    pub fn release(mut self) {
        self.do_release();
    }

    fn do_release(&mut self) {
        if !self.released {
            self.iterators.set(self.iterators.get() - 1);
            self.released = true;
        }
    }
}

impl<K> Drop for SafeIterGuard<K> {
    fn drop(&mut self) {
        self.do_release();
    }
}

enum Locate<'a, K, V> {
    Next(Option<&'a Node<K, V>>),
    Missing,
}

fn find_after<'a, K, V, P: DictPolicy<K>>(
    table: &'a Table<K, V>,
    bucket: usize,
    key: &K,
    policy: &P,
) -> Locate<'a, K, V> {
    let mut cur = table.buckets[bucket].as_deref();
    while let Some(node) = cur {
        if policy.eq(&node.key, key) {
            return Locate::Next(node.next.as_deref());
        }
        cur = node.next.as_deref();
    }
    Locate::Missing
}

impl<K: Clone, V, P: DictPolicy<K>> Dict<K, V, P>
where
    V: Clone,
{
    /// Advances a safe iteration, yielding an owned copy of the next
    /// entry. Returns `None` once both tables have been exhausted.
    ///
    /// The caller may freely call `insert`/`remove`/etc. on the dict
    /// between calls to this method -- including removing the entry just
    /// yielded. An entry removed mid-scan is tolerated (the remainder of
    /// its bucket is simply re-scanned from the head), matching the
    /// "entries may appear more than once" guarantee that also applies to
    /// [`Dict::scan`].
    pub fn safe_next(&mut self, guard: &mut SafeIterGuard<K>) -> Option<(K, V)> {
        loop {
            if guard.table == 0 && guard.bucket >= self.t0.size() {
                if self.is_rehashing() {
                    guard.table = 1;
                    guard.bucket = 0;
                    guard.pending = None;
                } else {
                    return None;
                }
            }
            if guard.table == 1 && guard.bucket >= self.t1.size() {
                return None;
            }

            let table_ref = if guard.table == 0 { &self.t0 } else { &self.t1 };
            if table_ref.size() == 0 {
                return None;
            }

            let node = match &guard.pending {
                None => table_ref.buckets[guard.bucket].as_deref(),
                Some(key) => match find_after(table_ref, guard.bucket, key, &self.policy) {
                    Locate::Next(n) => n,
                    Locate::Missing => table_ref.buckets[guard.bucket].as_deref(),
                },
            };

            match node {
                Some(n) => {
                    let key = n.key.clone();
                    let value = n.value.clone();
                    guard.pending = Some(key.clone());
                    return Some((key, value));
                }
                None => {
                    guard.bucket += 1;
                    guard.pending = None;
                }
            }
        }
    }
}

impl<K: Clone, V: Clone, P: DictPolicy<K>> Dict<K, V, P> {
    /// Picks a uniformly random entry. `None` if the dict is empty.
    pub fn random_key(&self, rng: &mut impl rand::Rng) -> Option<(K, V)> {
        if self.is_empty() {
            return None;
        }
        loop {
            let (table, bucket) = if self.is_rehashing() {
                let total = self.t0.size() + self.t1.size();
                let idx = rng.gen_range(self.rehashidx.unwrap()..total);
                if idx >= self.t0.size() {
                    (&self.t1, idx - self.t0.size())
                } else {
                    (&self.t0, idx)
                }
            } else {
                (&self.t0, rng.gen_range(0..self.t0.size()))
            };
            if table.buckets[bucket].is_none() {
                continue;
            }
            let mut len = 0;
            let mut cur = table.buckets[bucket].as_deref();
            while let Some(node) = cur {
                len += 1;
                cur = node.next.as_deref();
            }
            let pick = rng.gen_range(0..len);
            let mut cur = table.buckets[bucket].as_deref();
            for _ in 0..pick {
                cur = cur.unwrap().next.as_deref();
            }
            let node = cur.unwrap();
            return Some((node.key.clone(), node.value.clone()));
        }
    }

    fn table_for(&self, idx: usize) -> (&Table<K, V>, usize) {
        if idx < self.t0.size() {
            (&self.t0, idx)
        } else {
            (&self.t1, idx - self.t0.size())
        }
    }

    /// Scatter-samples up to `count` entries, bounded to `10 * count`
    /// probe steps total; may return fewer than `count` entries.
    pub fn random_keys(&self, rng: &mut impl rand::Rng, count: usize) -> Vec<(K, V)> {
        let mut out = Vec::new();
        let total = self.t0.size() + if self.is_rehashing() { self.t1.size() } else { 0 };
        if total == 0 || count == 0 {
            return out;
        }
        let max_steps = 10 * count;
        let empty_jump_limit = count.max(5);
        let mut empty_run = 0usize;
        let mut idx = rng.gen_range(0..total);

        for _ in 0..max_steps {
            if out.len() >= count {
                break;
            }
            let (table, bucket) = self.table_for(idx);
            match table.buckets[bucket].as_deref() {
                None => {
                    empty_run += 1;
                    if empty_run >= empty_jump_limit {
                        idx = rng.gen_range(0..total);
                        empty_run = 0;
                        continue;
                    }
                }
                Some(mut cur) => {
                    empty_run = 0;
                    loop {
                        if out.len() >= count {
                            break;
                        }
                        out.push((cur.key.clone(), cur.value.clone()));
                        match cur.next.as_deref() {
                            Some(next) => cur = next,
                            None => break,
                        }
                    }
                }
            }
            idx = (idx + 1) % total;
        }
        out
    }
}
