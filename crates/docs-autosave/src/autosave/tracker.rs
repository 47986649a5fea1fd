//! Dirty state tracking for auto-save.

/// Tracks unsaved local changes of one document.
///
/// The dirty flag is raised only by [`mark_dirty`](Self::mark_dirty) and
/// lowered only by [`begin_save`](Self::begin_save), which clears it
/// optimistically at dispatch time. Save outcomes never touch it.
#[derive(Debug, Clone)]
pub struct DirtyTracker {
    /// Whether there are local edits not yet dispatched for saving.
    dirty: bool,

    /// Whether saves are currently allowed.
    eligible: bool,

    /// Saves dispatched but not yet completed.
    in_flight: usize,

    local_updates: u64,
    dispatched: u64,
    completed: u64,
    failed: u64,
}

impl Default for DirtyTracker {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DirtyTracker {
    /// Create a clean tracker.
    pub fn new(eligible: bool) -> Self {
        Self {
            dirty: false,
            eligible,
            in_flight: 0,
            local_updates: 0,
            dispatched: 0,
            completed: 0,
            failed: 0,
        }
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn is_eligible(&self) -> bool {
        self.eligible
    }

    /// Whether a trigger firing now would dispatch a save.
    #[inline]
    pub fn should_save(&self) -> bool {
        self.dirty && self.eligible
    }

    /// Record an observed local update.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.local_updates += 1;
    }

    /// Allow or forbid saves. Dirty state is kept either way.
    pub fn set_eligible(&mut self, eligible: bool) {
        self.eligible = eligible;
    }

    /// Claim the current dirty episode for a save dispatch.
    ///
    /// Returns `false` (and changes nothing) when clean or not eligible.
    pub fn begin_save(&mut self) -> bool {
        if !self.should_save() {
            return false;
        }
        self.dirty = false;
        self.in_flight += 1;
        self.dispatched += 1;
        true
    }

    /// Mark that a dispatched save has completed successfully.
    pub fn save_complete(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.completed += 1;
    }

    /// Mark that a dispatched save has failed.
    pub fn save_failed(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.failed += 1;
        // Not re-dirtied; the next local edit starts a new episode.
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Local updates observed over the tracker's lifetime.
    pub fn local_updates(&self) -> u64 {
        self.local_updates
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_tracker_is_clean() {
        let tracker = DirtyTracker::new(true);
        assert!(!tracker.is_dirty());
        assert!(!tracker.should_save());
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_mark_dirty() {
        let mut tracker = DirtyTracker::new(true);
        tracker.mark_dirty();
        tracker.mark_dirty();
        assert!(tracker.is_dirty());
        assert_eq!(tracker.local_updates(), 2);
    }

    #[test]
    fn test_begin_save_clears_optimistically() {
        let mut tracker = DirtyTracker::new(true);
        tracker.mark_dirty();

        assert!(tracker.begin_save());
        assert!(!tracker.is_dirty());
        assert_eq!(tracker.in_flight(), 1);
        assert_eq!(tracker.local_updates(), 1);

        // Same episode cannot be dispatched twice.
        assert!(!tracker.begin_save());
        assert_eq!(tracker.dispatched(), 1);
    }

    #[test]
    fn test_save_failed_does_not_redirty() {
        let mut tracker = DirtyTracker::new(true);
        tracker.mark_dirty();
        tracker.begin_save();
        tracker.save_failed();

        assert!(!tracker.is_dirty());
        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(tracker.failed(), 1);
    }

    #[test]
    fn test_ineligible_keeps_dirty() {
        let mut tracker = DirtyTracker::new(false);
        tracker.mark_dirty();

        assert!(!tracker.begin_save());
        assert!(tracker.is_dirty());

        tracker.set_eligible(true);
        assert!(tracker.begin_save());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Local,
        Eligible(bool),
        Trigger,
        Complete,
        Fail,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Local),
            any::<bool>().prop_map(Op::Eligible),
            Just(Op::Trigger),
            Just(Op::Complete),
            Just(Op::Fail),
        ]
    }

    proptest! {
        #[test]
        fn dispatches_only_dirty_eligible_episodes(ops in prop::collection::vec(op(), 0..64)) {
            let mut tracker = DirtyTracker::new(true);
            let mut episodes_open = false;
            let mut expected_dispatches = 0u64;

            for op in ops {
                match op {
                    Op::Local => {
                        tracker.mark_dirty();
                        episodes_open = true;
                    }
                    Op::Eligible(eligible) => tracker.set_eligible(eligible),
                    Op::Trigger => {
                        let was_dirty = tracker.is_dirty();
                        let eligible = tracker.is_eligible();
                        let dispatched = tracker.begin_save();
                        prop_assert_eq!(dispatched, was_dirty && eligible);
                        if dispatched {
                            expected_dispatches += 1;
                            episodes_open = false;
                            prop_assert!(!tracker.is_dirty());
                        } else {
                            prop_assert_eq!(tracker.is_dirty(), was_dirty);
                        }
                    }
                    Op::Complete => {
                        if tracker.in_flight() > 0 {
                            tracker.save_complete();
                        }
                    }
                    Op::Fail => {
                        if tracker.in_flight() > 0 {
                            tracker.save_failed();
                        }
                    }
                }
                prop_assert_eq!(tracker.is_dirty(), episodes_open);
            }

            prop_assert_eq!(tracker.dispatched(), expected_dispatches);
            prop_assert_eq!(
                tracker.completed() + tracker.failed() + tracker.in_flight() as u64,
                tracker.dispatched()
            );
        }
    }
}
