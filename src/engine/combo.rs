//! Time-windowed streak (combo) counter.
//!
//! Successive classifications within the combo window grow the count;
//! going quiet first deactivates the combo, then a short cooldown later
//! resets the count to zero. The running maximum survives the reset.

use std::time::Duration;

use tokio::time::Instant;

/// UI-facing view of the combo state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComboSnapshot {
    /// Actions in the current burst.
    pub count: u32,
    /// Highest count reached since the tracker was created.
    pub max_count: u32,
    /// Whether a burst is currently running.
    pub active: bool,
}

/// Tracks classification bursts against a rolling time window.
pub struct ComboTracker {
    window: Duration,
    cooldown: Duration,
    count: u32,
    max_count: u32,
    active: bool,
    last_action: Option<Instant>,
}

impl ComboTracker {
    /// `window` is the max gap between actions of one burst; `cooldown`
    /// is the extra delay after deactivation before the count resets.
    pub fn new(window: Duration, cooldown: Duration) -> Self {
        ComboTracker {
            window,
            cooldown,
            count: 0,
            max_count: 0,
            active: false,
            last_action: None,
        }
    }

    /// Register an action at `now` and return the new combo count.
    ///
    /// Any pending decay is implicitly cancelled because the deadlines
    /// are derived from `last_action`.
    pub fn register(&mut self, now: Instant) -> u32 {
        let chained = self
            .last_action
            .is_some_and(|last| now.duration_since(last) <= self.window);
        self.count = if chained { self.count + 1 } else { 1 };
        self.max_count = self.max_count.max(self.count);
        self.active = true;
        self.last_action = Some(now);
        self.count
    }

    /// The next instant at which [`tick`](Self::tick) would change state.
    pub fn next_deadline(&self) -> Option<Instant> {
        let last = self.last_action?;
        if self.active {
            Some(last + self.window)
        } else if self.count > 0 {
            Some(last + self.window + self.cooldown)
        } else {
            None
        }
    }

    /// Apply any decay transitions due at `now`. Returns whether the
    /// observable state changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(last) = self.last_action else {
            return false;
        };
        let mut changed = false;
        if self.active && now.duration_since(last) >= self.window {
            self.active = false;
            changed = true;
        }
        if !self.active && self.count > 0 && now.duration_since(last) >= self.window + self.cooldown
        {
            self.count = 0;
            self.last_action = None;
            changed = true;
        }
        changed
    }

    /// Current observable state.
    pub fn snapshot(&self) -> ComboSnapshot {
        ComboSnapshot {
            count: self.count,
            max_count: self.max_count,
            active: self.active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(1500);
    const COOLDOWN: Duration = Duration::from_millis(300);

    fn tracker() -> ComboTracker {
        ComboTracker::new(WINDOW, COOLDOWN)
    }

    #[test]
    fn test_rapid_actions_chain() {
        let mut combo = tracker();
        let start = Instant::now();
        for i in 0..50 {
            let count = combo.register(start + Duration::from_millis(i * 10));
            assert_eq!(count, i as u32 + 1);
        }
        assert_eq!(combo.snapshot().max_count, 50);
        assert!(combo.snapshot().active);
    }

    #[test]
    fn test_gap_beyond_window_resets_to_one() {
        let mut combo = tracker();
        let start = Instant::now();
        combo.register(start);
        combo.register(start + Duration::from_millis(100));
        assert_eq!(combo.snapshot().count, 2);

        let count = combo.register(start + Duration::from_millis(100) + WINDOW + Duration::from_millis(1));
        assert_eq!(count, 1);
        assert_eq!(combo.snapshot().max_count, 2);
    }

    #[test]
    fn test_two_phase_decay() {
        let mut combo = tracker();
        let start = Instant::now();
        combo.register(start);
        combo.register(start + Duration::from_millis(50));

        // first deadline: combo goes inactive, count survives
        let first = combo.next_deadline().unwrap();
        assert!(combo.tick(first));
        let snap = combo.snapshot();
        assert!(!snap.active);
        assert_eq!(snap.count, 2);

        // second deadline: count resets, max preserved
        let second = combo.next_deadline().unwrap();
        assert_eq!(second, start + Duration::from_millis(50) + WINDOW + COOLDOWN);
        assert!(combo.tick(second));
        let snap = combo.snapshot();
        assert_eq!(snap.count, 0);
        assert_eq!(snap.max_count, 2);
        assert_eq!(combo.next_deadline(), None);
    }

    #[test]
    fn test_action_before_decay_restarts_timer() {
        let mut combo = tracker();
        let start = Instant::now();
        combo.register(start);

        let first = combo.next_deadline().unwrap();
        combo.tick(first);
        assert!(!combo.snapshot().active);

        // new action during the cooldown revives the burst
        let count = combo.register(first + Duration::from_millis(10));
        assert_eq!(count, 1);
        assert!(combo.snapshot().active);
        assert!(combo.next_deadline().unwrap() > first);
    }

    #[test]
    fn test_tick_before_deadline_is_a_no_op() {
        let mut combo = tracker();
        let start = Instant::now();
        combo.register(start);
        assert!(!combo.tick(start + Duration::from_millis(10)));
        assert!(combo.snapshot().active);
    }
}
