//! Revision-indexed log of committed events.

use crate::error::{CoreError, CoreResult};
use crate::event::Event;
use crate::transaction::Executable;

/// Append-only, dense log of the events of one model.
///
/// The log holds exactly one event per revision in
/// `[base_revision, current_revision)`. A new model starts with base 0; a
/// model loaded from a snapshot at revision `n` starts with base `n + 1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLog {
    base_revision: u64,
    events: Vec<Event>,
}

impl ChangeLog {
    /// Creates an empty log starting at revision 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty log whose first event will carry `base_revision`.
    #[must_use]
    pub fn with_base(base_revision: u64) -> Self {
        Self {
            base_revision,
            events: Vec::new(),
        }
    }

    /// Returns the first revision the log can hold.
    #[must_use]
    pub fn base_revision(&self) -> u64 {
        self.base_revision
    }

    /// Returns the revision the next appended event must carry.
    #[must_use]
    pub fn current_revision(&self) -> u64 {
        self.base_revision + self.events.len() as u64
    }

    /// Returns the number of logged events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the event committed at `revision`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OutOfRange`] outside
    /// `[base_revision, current_revision)`.
    pub fn event_at(&self, revision: u64) -> CoreResult<&Event> {
        revision
            .checked_sub(self.base_revision)
            .and_then(|offset| usize::try_from(offset).ok())
            .and_then(|offset| self.events.get(offset))
            .ok_or(CoreError::OutOfRange {
                revision,
                base: self.base_revision,
                current: self.current_revision(),
            })
    }

    /// Iterates over the events in `[begin, end)`, clamped to the logged
    /// range.
    pub fn events_between(&self, begin: u64, end: u64) -> std::slice::Iter<'_, Event> {
        let lo = self.offset_clamped(begin);
        let hi = self.offset_clamped(end).max(lo);
        self.events[lo..hi].iter()
    }

    /// Iterates over every event at or after `begin`.
    pub fn events_since(&self, begin: u64) -> std::slice::Iter<'_, Event> {
        self.events_between(begin, self.current_revision())
    }

    /// Iterates over all logged events.
    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// Appends an event.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RevisionMismatch`] unless the event carries
    /// [`current_revision`](Self::current_revision).
    pub fn append(&mut self, event: Event) -> CoreResult<()> {
        let expected = self.current_revision();
        if event.revision() != expected {
            return Err(CoreError::RevisionMismatch {
                expected,
                actual: event.revision(),
            });
        }
        self.events.push(event);
        Ok(())
    }

    /// Discards every event at or after `revision` and returns them in log
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OutOfRange`] if `revision` is below the base or
    /// beyond the current revision.
    pub fn truncate_from(&mut self, revision: u64) -> CoreResult<Vec<Event>> {
        if revision < self.base_revision || revision > self.current_revision() {
            return Err(CoreError::OutOfRange {
                revision,
                base: self.base_revision,
                current: self.current_revision(),
            });
        }
        let offset = self.offset_clamped(revision);
        Ok(self.events.split_off(offset))
    }

    fn offset_clamped(&self, revision: u64) -> usize {
        let offset = revision.saturating_sub(self.base_revision);
        usize::try_from(offset).map_or(self.events.len(), |o| o.min(self.events.len()))
    }
}

impl<'a> IntoIterator for &'a ChangeLog {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Storage for the events a model handle commits.
///
/// [`ChangeLog`] is the plain implementation. Other logs wrap one and track
/// extra state, such as which local changes a remote has confirmed.
pub trait EventLog: Send + Sync {
    /// Returns the underlying change log.
    fn change_log(&self) -> &ChangeLog;

    /// Records a committed event.
    ///
    /// `executed` is the change that produced the event when it was executed
    /// locally, and `None` when the event was replayed from elsewhere.
    fn record(&mut self, executed: Option<&Executable>, event: Event) -> CoreResult<()>;

    /// Discards every event at or after `revision`.
    fn truncate_from(&mut self, revision: u64) -> CoreResult<Vec<Event>>;
}

impl EventLog for ChangeLog {
    fn change_log(&self) -> &ChangeLog {
        self
    }

    fn record(&mut self, _executed: Option<&Executable>, event: Event) -> CoreResult<()> {
        self.append(event)
    }

    fn truncate_from(&mut self, revision: u64) -> CoreResult<Vec<Event>> {
        ChangeLog::truncate_from(self, revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Identifier;
    use crate::command::Action;
    use crate::event::AtomicEvent;

    fn event(revision: u64) -> Event {
        Event::Atomic(AtomicEvent {
            action: Action::Add,
            target: "/repo/model".parse().unwrap(),
            changed: format!("/repo/model/obj{revision}").parse().unwrap(),
            actor: Some(Identifier::new("tester").unwrap()),
            old_model_revision: revision.saturating_sub(1),
            old_object_revision: None,
            old_field_revision: None,
            revision,
            old_value: None,
            new_value: None,
            implied: false,
            in_transaction: false,
        })
    }

    fn log_with(base: u64, count: u64) -> ChangeLog {
        let mut log = ChangeLog::with_base(base);
        for revision in base..base + count {
            log.append(event(revision)).unwrap();
        }
        log
    }

    #[test]
    fn append_requires_next_revision() {
        let mut log = ChangeLog::new();
        log.append(event(0)).unwrap();
        let err = log.append(event(5)).unwrap_err();
        assert_eq!(
            err,
            CoreError::RevisionMismatch {
                expected: 1,
                actual: 5
            }
        );
        assert_eq!(log.current_revision(), 1);
    }

    #[test]
    fn event_at_bounds() {
        let log = log_with(10, 3);
        assert_eq!(log.base_revision(), 10);
        assert_eq!(log.current_revision(), 13);
        assert_eq!(log.event_at(11).unwrap().revision(), 11);
        assert!(matches!(log.event_at(9), Err(CoreError::OutOfRange { .. })));
        assert!(matches!(log.event_at(13), Err(CoreError::OutOfRange { .. })));
    }

    #[test]
    fn events_between_is_clamped_and_restartable() {
        let log = log_with(10, 5);
        let revisions = |begin, end| -> Vec<u64> {
            log.events_between(begin, end).map(Event::revision).collect()
        };
        assert_eq!(revisions(11, 13), vec![11, 12]);
        assert_eq!(revisions(0, 100), vec![10, 11, 12, 13, 14]);
        assert_eq!(revisions(13, 11), Vec::<u64>::new());
        assert_eq!(revisions(50, 60), Vec::<u64>::new());

        let iter = log.events_between(10, 12);
        assert_eq!(iter.clone().count(), 2);
        assert_eq!(iter.count(), 2);
    }

    #[test]
    fn truncate_from_returns_discarded_tail() {
        let mut log = log_with(0, 5);
        let tail = log.truncate_from(3).unwrap();
        assert_eq!(tail.iter().map(Event::revision).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(log.current_revision(), 3);

        assert!(log.truncate_from(4).is_err());
        assert!(log.truncate_from(3).unwrap().is_empty());
        log.append(event(3)).unwrap();
    }
}
