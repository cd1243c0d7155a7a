use std::collections::BTreeSet;
use std::collections::HashMap;
use std::ops::Bound;

use crate::request::ObjectId;
use crate::request::Position;
use crate::request::Request;
use crate::request::RequestId;

/// Key of a request in the total order: position first, request id breaks ties.
pub type OrderKey = (Position, RequestId);

/// ConflictIndex answers "which tracked requests touch these objects, below or above this key".
/// Every object has its own ordered set, so a lookup only visits requests that share an object.
#[derive(Debug, Default)]
pub struct ConflictIndex {
    by_object: HashMap<ObjectId, BTreeSet<OrderKey>>,

    /// Highest position of a retired request per object.
    watermarks: HashMap<ObjectId, Position>,
}

impl ConflictIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, oids: &[ObjectId], key: OrderKey) {
        for oid in oids.iter() {
            self.by_object.entry(*oid).or_default().insert(key);
        }
    }

    pub fn remove(&mut self, oids: &[ObjectId], key: OrderKey) {
        for oid in oids.iter() {
            if let Some(keys) = self.by_object.get_mut(oid) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.by_object.remove(oid);
                }
            }
        }
    }

    /// retire removes a decided request and raises the watermark of its objects.
    pub fn retire(&mut self, r: &Request) {
        self.remove(r.object_ids(), r.key());
        for oid in r.object_ids().iter() {
            let w = self.watermarks.entry(*oid).or_insert(r.position());
            if *w < r.position() {
                *w = r.position();
            }
        }
    }

    /// lower returns requests on any of `oids` ordered before `key`, except `key` itself.
    pub fn lower(&self, oids: &[ObjectId], key: OrderKey) -> BTreeSet<RequestId> {
        let mut rst = BTreeSet::new();
        for oid in oids.iter() {
            if let Some(keys) = self.by_object.get(oid) {
                for (_, rid) in keys.range(..key) {
                    if *rid != key.1 {
                        rst.insert(*rid);
                    }
                }
            }
        }
        rst
    }

    /// higher returns requests on any of `oids` ordered after `key`, except `key` itself.
    pub fn higher(&self, oids: &[ObjectId], key: OrderKey) -> BTreeSet<OrderKey> {
        let mut rst = BTreeSet::new();
        for oid in oids.iter() {
            if let Some(keys) = self.by_object.get(oid) {
                for k in keys.range((Bound::Excluded(key), Bound::Unbounded)) {
                    if k.1 != key.1 {
                        rst.insert(*k);
                    }
                }
            }
        }
        rst
    }

    /// watermark returns the highest retired position on any of `oids`.
    pub fn watermark(&self, oids: &[ObjectId]) -> Option<Position> {
        oids.iter().filter_map(|oid| self.watermarks.get(oid)).max().copied()
    }

    pub fn len(&self, oid: ObjectId) -> usize {
        self.by_object.get(&oid).map(|keys| keys.len()).unwrap_or(0)
    }
}
