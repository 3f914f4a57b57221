#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing, examples and benchmarks in `reuse_pool` packages.
//!
//! The central piece is the [`Journal`], a shared recording of lifecycle hook invocations.
//! Test types that implement the pooling hooks record into a journal (usually the
//! [`thread_journal()`]) and the test then checks counts and ordering of what happened.
//!
//! This package deliberately does not depend on `reuse_pool` itself, so that it can also be
//! used from the unit tests inside that package without ending up with two copies of its traits.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// One lifecycle hook that a pooled instance went through.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Hook {
    /// The instance was constructed.
    Created,

    /// The instance transitioned into the active state.
    Acquired,

    /// The instance transitioned into the idle state.
    Released,

    /// The instance was permanently removed.
    Destroyed,
}

/// A shared, append-only record of `(instance id, hook)` pairs.
///
/// Cloning a journal gives another handle to the same record.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Rc<RefCell<Vec<(u64, Hook)>>>,
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal")
            .field("entries", &self.entries.borrow().len())
            .finish()
    }
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one hook invocation for the instance with the given id.
    pub fn record(&self, instance_id: u64, hook: Hook) {
        self.entries.borrow_mut().push((instance_id, hook));
    }

    /// Returns a copy of everything recorded so far, in recording order.
    #[must_use]
    pub fn entries(&self) -> Vec<(u64, Hook)> {
        self.entries.borrow().clone()
    }

    /// Returns the hooks recorded for one instance, in recording order.
    #[must_use]
    pub fn hooks_of(&self, instance_id: u64) -> Vec<Hook> {
        self.entries
            .borrow()
            .iter()
            .filter(|(id, _)| *id == instance_id)
            .map(|(_, hook)| *hook)
            .collect()
    }

    /// Returns how many times `hook` was recorded, across all instances.
    #[must_use]
    pub fn count(&self, hook: Hook) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|(_, recorded)| *recorded == hook)
            .count()
    }

    /// Returns the distinct instance ids seen so far, in order of first appearance.
    #[must_use]
    pub fn instance_ids(&self) -> Vec<u64> {
        let mut ids = Vec::new();

        for (id, _) in self.entries.borrow().iter() {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }

        ids
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Panics if the hooks of any recorded instance are out of lifecycle order.
    ///
    /// See [`assert_lifecycle_order()`] for the accepted order.
    pub fn assert_lifecycle_order(&self) {
        for id in self.instance_ids() {
            assert_lifecycle_order(&self.hooks_of(id));
        }
    }
}

/// Panics unless `hooks` is `Created, Acquired, (Released, Acquired)*` optionally followed by
/// `Released` and then optionally by `Destroyed`.
///
/// In other words: creation comes first and exactly once, activation is never repeated without
/// an intervening release and nothing follows destruction.
pub fn assert_lifecycle_order(hooks: &[Hook]) {
    let mut previous: Option<Hook> = None;

    for (position, hook) in hooks.iter().enumerate() {
        let allowed = matches!(
            (previous, hook),
            (None, Hook::Created)
                | (Some(Hook::Created | Hook::Released), Hook::Acquired)
                | (Some(Hook::Acquired), Hook::Released)
                | (
                    Some(Hook::Created | Hook::Acquired | Hook::Released),
                    Hook::Destroyed
                )
        );

        assert!(
            allowed,
            "hook {hook:?} at position {position} may not follow {previous:?} (full sequence: {hooks:?})"
        );

        previous = Some(*hook);
    }
}

thread_local! {
    static THREAD_JOURNAL: Journal = Journal::new();
    static NEXT_INSTANCE_ID: Cell<u64> = const { Cell::new(0) };
}

/// Returns a handle to the journal of the current thread.
///
/// Test types constructed via `Default` have no way to receive a journal as a parameter, so they
/// record into this one. Each test runs on its own thread, so tests do not see each other's
/// entries.
#[must_use]
pub fn thread_journal() -> Journal {
    THREAD_JOURNAL.with(Clone::clone)
}

/// Returns a new instance id, unique within the current thread.
#[must_use]
pub fn next_instance_id() -> u64 {
    NEXT_INSTANCE_ID.with(|next| {
        let id = next.get();
        next.set(id.wrapping_add(1));
        id
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn journal_clones_share_entries() {
        let journal = Journal::new();
        let other = journal.clone();

        journal.record(1, Hook::Created);
        other.record(1, Hook::Acquired);

        assert_eq!(
            journal.entries(),
            vec![(1, Hook::Created), (1, Hook::Acquired)]
        );
        assert_eq!(other.count(Hook::Created), 1);
    }

    #[test]
    fn instance_ids_in_first_seen_order() {
        let journal = Journal::new();

        journal.record(7, Hook::Created);
        journal.record(3, Hook::Created);
        journal.record(7, Hook::Acquired);

        assert_eq!(journal.instance_ids(), vec![7, 3]);
        assert_eq!(journal.hooks_of(7), vec![Hook::Created, Hook::Acquired]);
    }

    #[test]
    fn accepts_full_cycle() {
        assert_lifecycle_order(&[
            Hook::Created,
            Hook::Acquired,
            Hook::Released,
            Hook::Acquired,
            Hook::Released,
            Hook::Destroyed,
        ]);
    }

    #[test]
    fn accepts_destroy_while_active() {
        assert_lifecycle_order(&[Hook::Created, Hook::Acquired, Hook::Destroyed]);
    }

    #[test]
    #[should_panic]
    fn rejects_double_acquire() {
        assert_lifecycle_order(&[Hook::Created, Hook::Acquired, Hook::Acquired]);
    }

    #[test]
    #[should_panic]
    fn rejects_hook_after_destroy() {
        assert_lifecycle_order(&[Hook::Created, Hook::Acquired, Hook::Destroyed, Hook::Acquired]);
    }

    #[test]
    fn instance_ids_are_unique() {
        let a = next_instance_id();
        let b = next_instance_id();

        assert_ne!(a, b);
    }
}
