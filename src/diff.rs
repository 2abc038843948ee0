use crate::types::Changes;
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;

/// key -> every entry carrying that key (duplicates are kept, not counted)
fn index_by<'a, T, K, F>(ts: &'a [T], to_key: &F) -> HashMap<K, Vec<&'a T>>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut index: HashMap<K, Vec<&T>> = HashMap::with_capacity(ts.len());
    for t in ts {
        index.entry(to_key(t)).or_default().push(t);
    }
    index
}

/// Diff 2 listings by key.
///
/// An entry of `prev` is deleted iff no entry of `next` has its key, and an
/// entry of `next` is added iff no entry of `prev` has its key. Multiplicity is
/// ignored: one match on the other side is enough, and duplicates without any
/// match are each reported.
pub fn diff_list<T, K, F>(prev: &[T], next: &[T], to_key: F) -> Changes<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let prev_index = index_by(prev, &to_key);
    let next_index = index_by(next, &to_key);

    let deleted = prev
        .iter()
        .filter(|t| !next_index.contains_key(&to_key(*t)))
        .cloned()
        .collect();

    let added = next
        .iter()
        .filter(|t| !prev_index.contains_key(&to_key(*t)))
        .cloned()
        .collect();

    Changes { added, deleted }
}

/// Iterator adapter returned by [`differential`].
pub struct Differential<I, T, K, F> {
    source: I,
    prev: Vec<T>,
    to_key: F,
    _key: PhantomData<fn() -> K>,
}

/// Turn a (possibly endless) sequence of snapshots into one `Changes` per
/// consecutive pair, starting from an implicit empty snapshot so the first
/// real listing comes out entirely as `added`.
///
/// Each call to `next` pulls exactly one snapshot from `source`. A source
/// error is passed through and leaves the previous snapshot in place.
pub fn differential<I, T, K, E, F>(snapshots: I, to_key: F) -> Differential<I::IntoIter, T, K, F>
where
    I: IntoIterator<Item = Result<Vec<T>, E>>,
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    Differential {
        source: snapshots.into_iter(),
        prev: Vec::new(),
        to_key,
        _key: PhantomData,
    }
}

impl<I, T, K, E, F> Iterator for Differential<I, T, K, F>
where
    I: Iterator<Item = Result<Vec<T>, E>>,
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    type Item = Result<Changes<T>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.source.next()? {
            Ok(snapshot) => snapshot,
            Err(e) => return Some(Err(e)),
        };

        let changes = diff_list(&self.prev, &next, &self.to_key);
        self.prev = next;
        Some(Ok(changes))
    }
}
