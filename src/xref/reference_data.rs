//! Folded view of the xref chain and the edit-session overlay on top of it.
//!
//! [`ReferenceData`] is built once per opened document and never changes.
//! Free entries live in an arena; the reusable chain starts at object 0 and
//! links entries by arena index. Free entries that the chain never reaches
//! stay in the arena with no link and are never handed out again.
//!
//! [`ReferenceDataChange`] records what one incremental update does to that
//! snapshot: ids taken from the chain or appended past `/Size`, objects
//! rewritten at new offsets, and ids freed. It is owned by a single writer.

use super::{XRefChain, XRefEntry, XRefEntryKind, MAX_GENERATION};
use crate::error::{Error, Result};
use crate::object::ObjectId;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Where a used object is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum UsedLocation {
    /// Byte offset of the `id gen obj` header
    Offset(usize),
    /// Slot inside an object stream
    Compressed {
        /// Object number of the object stream
        stream_id: u32,
        /// Index inside the stream
        index: usize,
    },
}

/// A used object and its current generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct UsedReference {
    /// Object number
    pub id: u32,
    /// Generation
    pub generation: u16,
    /// Location
    pub location: UsedLocation,
}

impl UsedReference {
    /// Reference to this object.
    pub fn object_id(&self) -> ObjectId {
        ObjectId::new(self.id, self.generation)
    }

    fn to_entry(self) -> XRefEntry {
        match self.location {
            UsedLocation::Offset(offset) => XRefEntry::normal(self.id, self.generation, offset),
            UsedLocation::Compressed { stream_id, index } => XRefEntry::compressed(self.id, stream_id, index),
        }
    }
}

/// A free slot in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeReference {
    /// Object number
    pub id: u32,
    /// Generation to use when the id is reused
    pub generation: u16,
    /// Arena index of the next free entry; `None` when outside the chain
    pub next: Option<usize>,
}

/// Authoritative id -> location map for one snapshot of the file.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    free: Vec<FreeReference>,
    free_index: HashMap<u32, usize>,
    used: BTreeMap<u32, UsedReference>,
    size: u32,
}

impl Default for ReferenceData {
    fn default() -> Self {
        Self::from_entries(std::iter::empty(), 1)
    }
}

impl ReferenceData {
    /// Fold every section of the chain, newest first.
    pub fn from_chain(chain: &XRefChain) -> Self {
        Self::from_entries(chain.entries(), chain.size())
    }

    /// Fold entries given in precedence order: the first entry for an id wins.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a XRefEntry>, declared_size: u32) -> Self {
        let mut seen = HashSet::new();
        let mut free_entries: BTreeMap<u32, (u16, u32)> = BTreeMap::new();
        let mut used = BTreeMap::new();

        for entry in entries {
            if !seen.insert(entry.id) {
                continue;
            }
            let location = match entry.kind {
                XRefEntryKind::Free { next_free_id } => {
                    free_entries.insert(entry.id, (entry.generation, next_free_id));
                    continue;
                },
                XRefEntryKind::Normal { byte_offset } => UsedLocation::Offset(byte_offset),
                XRefEntryKind::Compressed {
                    stream_id,
                    index_in_stream,
                } => UsedLocation::Compressed {
                    stream_id,
                    index: index_in_stream,
                },
            };
            used.insert(entry.id, UsedReference {
                id: entry.id,
                generation: entry.generation,
                location,
            });
        }

        if used.remove(&0).is_some() {
            log::warn!("object 0 is listed as in use; treating it as the free list head");
        }
        let head_next = free_entries.remove(&0).map_or(0, |(_, next)| next);

        let mut free = vec![FreeReference {
            id: 0,
            generation: MAX_GENERATION,
            next: Some(0),
        }];
        let mut free_index = HashMap::from([(0, 0)]);
        let mut tail = 0;
        let mut next_id = head_next;
        while next_id != 0 {
            let Some((generation, after)) = free_entries.remove(&next_id) else {
                log::warn!("free chain points at object {} which is not free; chain truncated", next_id);
                break;
            };
            let index = free.len();
            free.push(FreeReference {
                id: next_id,
                generation,
                next: Some(0),
            });
            free_index.insert(next_id, index);
            free[tail].next = Some(index);
            tail = index;
            next_id = after;
        }

        for (id, (generation, _)) in free_entries {
            free_index.insert(id, free.len());
            free.push(FreeReference {
                id,
                generation,
                next: None,
            });
        }

        let highest = free.iter().map(|f| f.id).chain(used.keys().copied()).max().unwrap_or(0);
        Self {
            free,
            free_index,
            used,
            size: declared_size.max(highest.saturating_add(1)),
        }
    }

    /// Used entry for `id`.
    pub fn get_used(&self, id: u32) -> Option<&UsedReference> {
        self.used.get(&id)
    }

    /// All used entries, ordered by id.
    pub fn used(&self) -> impl Iterator<Item = &UsedReference> {
        self.used.values()
    }

    /// Free entry for `id`, chained or not.
    pub fn get_free(&self, id: u32) -> Option<&FreeReference> {
        self.free_index.get(&id).map(|&i| &self.free[i])
    }

    /// Whether `id` is a free slot.
    pub fn is_free(&self, id: u32) -> bool {
        self.free_index.contains_key(&id)
    }

    /// Id the free entry `id` links to, or `None` when it is outside the chain.
    pub fn free_next(&self, id: u32) -> Option<u32> {
        self.get_free(id)?.next.map(|i| self.free[i].id)
    }

    /// Ids of the reusable chain, starting and ending with object 0.
    pub fn free_chain(&self) -> Vec<u32> {
        let mut ids = vec![0];
        let mut index = self.free[0].next;
        while let Some(i) = index {
            ids.push(self.free[i].id);
            if i == 0 {
                break;
            }
            index = self.free[i].next;
        }
        ids
    }

    /// Free ids the chain does not reach.
    pub fn detached(&self) -> impl Iterator<Item = u32> + '_ {
        self.free.iter().filter(|f| f.next.is_none()).map(|f| f.id)
    }

    /// Current generation of a used or free id.
    pub fn generation_of(&self, id: u32) -> Option<u16> {
        self.get_used(id)
            .map(|u| u.generation)
            .or_else(|| self.get_free(id).map(|f| f.generation))
    }

    /// One more than the highest object number.
    pub fn size(&self) -> u32 {
        self.size
    }
}

/// Mutable overlay used by one incremental update.
#[derive(Debug)]
pub struct ReferenceDataChange {
    source: Arc<ReferenceData>,
    chain: Vec<u32>,
    used: BTreeMap<u32, UsedReference>,
    freed: BTreeMap<u32, u16>,
    size: u32,
}

impl ReferenceDataChange {
    /// Empty overlay on `source`.
    pub fn new(source: Arc<ReferenceData>) -> Self {
        let chain = source.free_chain().into_iter().filter(|&id| id != 0).collect();
        let size = source.size();
        Self {
            source,
            chain,
            used: BTreeMap::new(),
            freed: BTreeMap::new(),
            size,
        }
    }

    /// Snapshot this overlay is built on.
    pub fn source(&self) -> &ReferenceData {
        &self.source
    }

    /// Allocate an id for a new object written at `offset`.
    ///
    /// Reuses the first chained id whose generation is below the maximum,
    /// skipping ids freed in this session, unless `force_new` is set; then
    /// appends a fresh id with generation 0.
    pub fn take_free_ref(&mut self, offset: usize, force_new: bool) -> ObjectId {
        let reusable = if force_new {
            None
        } else {
            self.chain.iter().position(|id| {
                !self.freed.contains_key(id)
                    && self.source.get_free(*id).is_some_and(|f| f.generation < MAX_GENERATION)
            })
        };
        let reference = match reusable {
            Some(position) => {
                let id = self.chain.remove(position);
                let generation = self.source.get_free(id).map_or(0, |f| f.generation);
                ObjectId::new(id, generation)
            },
            None => {
                let id = self.size;
                self.size += 1;
                ObjectId::new(id, 0)
            },
        };
        log::debug!("allocated {} at offset {}", reference, offset);
        self.used.insert(reference.id, UsedReference {
            id: reference.id,
            generation: reference.generation,
            location: UsedLocation::Offset(offset),
        });
        reference
    }

    /// Current generation of `id`, taking this session's edits into account.
    pub fn generation_of(&self, id: u32) -> Option<u16> {
        if let Some(generation) = self.freed.get(&id) {
            return Some(*generation);
        }
        self.used.get(&id).map(|u| u.generation).or_else(|| self.source.generation_of(id))
    }

    /// Whether `id` is in use after this session's edits.
    pub fn is_used(&self, id: u32) -> bool {
        self.used.contains_key(&id) || (self.source.get_used(id).is_some() && !self.freed.contains_key(&id))
    }

    /// Record that `reference` was rewritten at `offset`.
    ///
    /// The generation does not change. A stale generation, a freed id or an
    /// unknown id is an integrity error.
    pub fn update_used_ref(&mut self, reference: ObjectId, offset: usize) -> Result<()> {
        if self.freed.contains_key(&reference.id) {
            return Err(Error::ReferenceIntegrity(format!("{} was freed in this update", reference)));
        }
        let current = self
            .used
            .get(&reference.id)
            .or_else(|| self.source.get_used(reference.id))
            .map(|u| u.generation)
            .ok_or_else(|| Error::ReferenceIntegrity(format!("{} is not an object in use", reference)))?;
        if current != reference.generation {
            return Err(Error::ReferenceIntegrity(format!(
                "stale reference {}: current generation is {}",
                reference, current
            )));
        }
        self.used.insert(reference.id, UsedReference {
            id: reference.id,
            generation: reference.generation,
            location: UsedLocation::Offset(offset),
        });
        Ok(())
    }

    /// Free `id`; returns whether anything changed.
    ///
    /// Ids known to the source are appended to the chain with their
    /// generation raised by one. An id allocated in this session and never
    /// known to the source is simply dropped. Freeing twice is a no-op.
    pub fn set_ref_free(&mut self, id: u32) -> Result<bool> {
        if id == 0 || self.freed.contains_key(&id) {
            return Ok(false);
        }
        let in_session = self.used.remove(&id);
        let current = match (in_session, self.source.get_used(id)) {
            (_, Some(source_used)) => source_used.generation,
            (Some(session), None) if self.source.is_free(id) => session.generation,
            (Some(_), None) => {
                log::debug!("dropped object {} allocated in this update", id);
                return Ok(true);
            },
            (None, None) => return Ok(false),
        };

        let generation = current.saturating_add(1);
        self.freed.insert(id, generation);
        if generation < MAX_GENERATION {
            self.chain.push(id);
        }
        log::debug!("freed object {} (next generation {})", id, generation);
        Ok(true)
    }

    /// Entries of the new section: touched used ids plus every free entry
    /// whose link changed or that was freed in this session, sorted by id.
    pub fn xref_entries(&self) -> Vec<XRefEntry> {
        let mut entries: BTreeMap<u32, XRefEntry> =
            self.used.values().map(|u| (u.id, u.to_entry())).collect();

        let links = std::iter::once(0).chain(self.chain.iter().copied());
        let nexts = self.chain.iter().copied().chain(std::iter::once(0));
        for (id, next) in links.zip(nexts) {
            match self.freed.get(&id) {
                Some(&generation) => {
                    entries.insert(id, XRefEntry::free(id, generation, next));
                },
                None if self.source.free_next(id) != Some(next) => {
                    let generation = self.source.get_free(id).map_or(0, |f| f.generation);
                    entries.insert(id, XRefEntry::free(id, generation, next));
                },
                None => {},
            }
        }
        for (&id, &generation) in &self.freed {
            entries.entry(id).or_insert_with(|| XRefEntry::free(id, generation, 0));
        }

        entries.into_values().collect()
    }

    /// `/Size` after this update.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Whether the overlay records any change.
    pub fn is_empty(&self) -> bool {
        self.used.is_empty() && self.freed.is_empty() && self.xref_entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Arc<ReferenceData> {
        let entries = [
            XRefEntry::free(0, 65535, 1),
            XRefEntry::free(1, 0, 0),
            XRefEntry::normal(2, 0, 100),
        ];
        Arc::new(ReferenceData::from_entries(&entries, 3))
    }

    #[test]
    fn test_fold_free_chain_and_used() {
        let data = sample();
        assert_eq!(data.free_chain(), vec![0, 1, 0]);
        assert_eq!(data.get_used(2), Some(&UsedReference {
            id: 2,
            generation: 0,
            location: UsedLocation::Offset(100),
        }));
        assert_eq!(data.used().count(), 1);
        assert_eq!(data.size(), 3);
    }

    #[test]
    fn test_first_entry_wins() {
        let entries = [
            XRefEntry::normal(5, 1, 900),
            XRefEntry::free(0, 65535, 0),
            XRefEntry::normal(5, 0, 100),
            XRefEntry::free(5, 2, 0),
        ];
        let data = ReferenceData::from_entries(&entries, 6);
        assert_eq!(data.get_used(5).map(|u| (u.generation, u.location)), Some((1, UsedLocation::Offset(900))));
        assert!(!data.is_free(5));
    }

    #[test]
    fn test_object_zero_always_free() {
        let data = ReferenceData::from_entries(&[XRefEntry::normal(0, 0, 10), XRefEntry::normal(1, 0, 20)], 2);
        assert!(data.get_used(0).is_none());
        assert_eq!(data.get_free(0).map(|f| f.generation), Some(65535));
        assert_eq!(data.free_chain(), vec![0, 0]);
    }

    #[test]
    fn test_unreachable_free_entries_are_detached() {
        let entries = [
            XRefEntry::free(0, 65535, 3),
            XRefEntry::free(3, 1, 0),
            XRefEntry::free(4, 65535, 0),
            XRefEntry::free(6, 2, 0),
        ];
        let data = ReferenceData::from_entries(&entries, 7);
        assert_eq!(data.free_chain(), vec![0, 3, 0]);
        assert_eq!(data.detached().collect::<Vec<_>>(), vec![4, 6]);
        assert_eq!(data.free_next(4), None);
    }

    #[test]
    fn test_broken_chain_is_truncated() {
        let entries = [XRefEntry::free(0, 65535, 7), XRefEntry::normal(7, 0, 50)];
        let data = ReferenceData::from_entries(&entries, 8);
        assert_eq!(data.free_chain(), vec![0, 0]);
        assert!(data.get_used(7).is_some());
    }

    #[test]
    fn test_take_free_ref_reuses_then_appends() {
        let mut change = ReferenceDataChange::new(sample());
        let reused = change.take_free_ref(500, false);
        assert_eq!(reused, ObjectId::new(1, 0));
        let fresh = change.take_free_ref(600, false);
        assert_eq!(fresh, ObjectId::new(3, 0));
        let forced = change.take_free_ref(700, true);
        assert_eq!(forced, ObjectId::new(4, 0));
        assert_eq!(change.size(), 5);

        assert_eq!(change.xref_entries(), vec![
            XRefEntry::free(0, 65535, 0),
            XRefEntry::normal(1, 0, 500),
            XRefEntry::normal(3, 0, 600),
            XRefEntry::normal(4, 0, 700),
        ]);
    }

    #[test]
    fn test_max_generation_not_reused() {
        let entries = [XRefEntry::free(0, 65535, 1), XRefEntry::free(1, 65535, 0)];
        let mut change = ReferenceDataChange::new(Arc::new(ReferenceData::from_entries(&entries, 2)));
        assert_eq!(change.take_free_ref(10, false), ObjectId::new(2, 0));
    }

    #[test]
    fn test_set_ref_free_is_idempotent() {
        let mut change = ReferenceDataChange::new(sample());
        assert!(change.set_ref_free(2).unwrap());
        assert!(!change.set_ref_free(2).unwrap());
        assert!(!change.set_ref_free(1).unwrap());
        assert!(!change.set_ref_free(42).unwrap());
        assert!(!change.is_used(2));
        assert_eq!(change.generation_of(2), Some(1));

        assert_eq!(change.xref_entries(), vec![XRefEntry::free(1, 0, 2), XRefEntry::free(2, 1, 0)]);
    }

    #[test]
    fn test_freed_id_not_reused_in_same_session() {
        let mut change = ReferenceDataChange::new(sample());
        change.set_ref_free(2).unwrap();
        assert_eq!(change.take_free_ref(0, false), ObjectId::new(1, 0));
        assert_eq!(change.take_free_ref(0, false), ObjectId::new(3, 0));
    }

    #[test]
    fn test_free_session_allocation() {
        let mut change = ReferenceDataChange::new(sample());
        let fresh = change.take_free_ref(10, true);
        assert!(change.set_ref_free(fresh.id).unwrap());
        assert!(change.xref_entries().is_empty());
    }

    #[test]
    fn test_update_used_ref_checks_generation() {
        let mut change = ReferenceDataChange::new(sample());
        change.update_used_ref(ObjectId::new(2, 0), 900).unwrap();
        assert_eq!(change.xref_entries(), vec![XRefEntry::normal(2, 0, 900)]);

        assert!(matches!(change.update_used_ref(ObjectId::new(2, 1), 950), Err(Error::ReferenceIntegrity(_))));
        assert!(change.update_used_ref(ObjectId::new(1, 0), 950).is_err());
        change.set_ref_free(2).unwrap();
        assert!(change.update_used_ref(ObjectId::new(2, 0), 990).is_err());
    }

    #[test]
    fn test_no_edits_no_entries() {
        let change = ReferenceDataChange::new(sample());
        assert!(change.xref_entries().is_empty());
        assert!(change.is_empty());
    }
}
