//! A first-in, first-out line of waiters that any waiter may leave at any
//! time.
//!
//! See the [`WaitQueue`] type's documentation for details.
use crate::loom::sync::blocking::Mutex;
use core::fmt;
use slab::Slab;


/// A first-in, first-out queue of waiters.
///
/// A `WaitQueue` records the order in which waiters arrived. Each waiter
/// holds an [`Entry`]: its place in line. Entries are [appended] at the
/// tail, the [head] of the queue can be observed without removing it, and an
/// entry may be [removed] from any position, not just the head, so that a
/// waiter that gives up can leave the line without disturbing anyone else.
///
/// Every operation is O(1).
///
/// # Implementation Notes
///
/// The queue is a circular doubly-linked list. Nodes live in a [`Slab`]
/// and link to each other by slab index rather than by pointer; the list's
/// root is a sentinel at the reserved index [`ROOT`], so an empty list is a
/// root whose `next` and `prev` both point back at itself.
///
/// A short-held lock protects the list. It is only ever held for the
/// duration of a handful of index updates, and never while a waiter
/// blocks.
///
/// [appended]: Entry::append
/// [head]: WaitQueue::peek
/// [removed]: Entry::remove
pub struct WaitQueue {
    list: Mutex<List>,
}

/// A waiter's place in a [`WaitQueue`].
///
/// An `Entry` starts out detached. [`append`](Self::append) puts it at the
/// tail of the queue; [`remove`](Self::remove) takes it out again, from
/// wherever it is. Removing a detached entry does nothing, so cleanup code
/// may remove an entry without knowing whether someone already did.
///
/// Dropping an `Entry` removes it from the queue.
#[must_use = "dropping an `Entry` immediately removes it from its queue"]
pub struct Entry<'q> {
    queue: &'q WaitQueue,
    id: Option<EntryId>,
}

/// Identifies a queued [`Entry`].
///
/// Identifiers are unique among the entries currently in a queue. The
/// identifier of an entry that has been removed may be reused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EntryId(usize);

struct List {
    nodes: Slab<Links>,
    root: Links,
    len: usize,
}

#[derive(Copy, Clone, Debug)]
struct Links {
    next: usize,
    prev: usize,
}

/// Index of the list's sentinel root.
const ROOT: usize = usize::MAX;

// === impl WaitQueue ===

impl WaitQueue {
    /// Returns a new, empty `WaitQueue`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            list: Mutex::new(List::new()),
        }
    }

    /// Returns a new detached [`Entry`] for this queue.
    pub fn entry(&self) -> Entry<'_> {
        Entry {
            queue: self,
            id: None,
        }
    }

    /// Returns the identifier of the entry at the head of the queue, without
    /// removing it, or `None` if the queue is empty.
    #[must_use]
    pub fn peek(&self) -> Option<EntryId> {
        self.list.with_lock(|list| list.head().map(EntryId))
    }

    /// Returns the number of entries in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.with_lock(|list| list.len)
    }

    /// Returns `true` if no entries are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (len, head) = self
            .list
            .with_lock(|list| (list.len, list.head().map(EntryId)));
        f.debug_struct("WaitQueue")
            .field("len", &len)
            .field("head", &head)
            .finish()
    }
}

// === impl Entry ===

impl Entry<'_> {
    /// Appends this entry to the tail of its queue.
    ///
    /// # Panics
    ///
    /// If the entry is already queued.
    #[track_caller]
    pub fn append(&mut self) {
        assert!(self.id.is_none(), "Entry::append: entry is already queued");
        let id = self.queue.list.with_lock(|list| list.push_back());
        trace!(queue = ?crate::util::fmt::ptr(self.queue), id, "Entry::append");
        self.id = Some(EntryId(id));
    }

    /// Removes this entry from its queue, returning the number of entries
    /// that remain queued.
    ///
    /// If the entry is not queued, this does nothing and returns the current
    /// length of the queue.
    pub fn remove(&mut self) -> usize {
        match self.id.take() {
            Some(EntryId(id)) => {
                let remaining = self.queue.list.with_lock(|list| list.remove(id));
                trace!(queue = ?crate::util::fmt::ptr(self.queue), id, remaining, "Entry::remove");
                remaining
            }
            None => self.queue.len(),
        }
    }

    /// Returns `true` if this entry is at the head of its queue.
    #[must_use]
    pub fn is_head(&self) -> bool {
        self.id.is_some() && self.queue.peek() == self.id
    }

    /// Returns `true` if this entry is currently queued.
    #[inline]
    #[must_use]
    pub fn is_queued(&self) -> bool {
        self.id.is_some()
    }

    /// Returns this entry's identifier, if it is queued.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<EntryId> {
        self.id
    }
}

impl Drop for Entry<'_> {
    fn drop(&mut self) {
        if self.id.is_some() {
            self.remove();
        }
    }
}

impl fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("queue", &(self.queue as *const WaitQueue))
            .field("id", &self.id)
            .finish()
    }
}

// === impl List ===

impl List {
    fn new() -> Self {
        Self {
            nodes: Slab::new(),
            root: Links {
                next: ROOT,
                prev: ROOT,
            },
            len: 0,
        }
    }

    fn links_mut(&mut self, idx: usize) -> &mut Links {
        if idx == ROOT {
            &mut self.root
        } else {
            &mut self.nodes[idx]
        }
    }

    fn head(&self) -> Option<usize> {
        match self.root.next {
            ROOT => None,
            idx => Some(idx),
        }
    }

    fn push_back(&mut self) -> usize {
        let prev = self.root.prev;
        let idx = self.nodes.insert(Links { next: ROOT, prev });
        debug_assert_ne!(idx, ROOT, "slab index collided with the root sentinel");
        self.links_mut(prev).next = idx;
        self.root.prev = idx;
        self.len += 1;
        idx
    }

    fn remove(&mut self, idx: usize) -> usize {
        let Some(links) = self.nodes.try_remove(idx) else {
            return self.len;
        };
        self.links_mut(links.prev).next = links.next;
        self.links_mut(links.next).prev = links.prev;
        self.len -= 1;
        test_dbg!(self.len)
    }
}
