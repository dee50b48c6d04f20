use heapless::Vec;
use serde::{Deserialize, Serialize};

pub const HIGH_RATE_INTERVAL_MS: u64 = 25;
pub const STANDARD_RATE_INTERVAL_MS: u64 = 100;
pub const LOW_RATE_INTERVAL_MS: u64 = 1000;

pub const RATE_CLASS_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateClass {
    High,
    Standard,
    Low,
}

impl RateClass {
    pub const ALL: [RateClass; RATE_CLASS_COUNT] = [RateClass::High, RateClass::Standard, RateClass::Low];

    pub const fn index(self) -> usize {
        match self {
            RateClass::High => 0,
            RateClass::Standard => 1,
            RateClass::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateIntervals {
    pub high_ms: u64,
    pub standard_ms: u64,
    pub low_ms: u64,
}

impl RateIntervals {
    pub const fn get(&self, class: RateClass) -> u64 {
        match class {
            RateClass::High => self.high_ms,
            RateClass::Standard => self.standard_ms,
            RateClass::Low => self.low_ms,
        }
    }
}

impl Default for RateIntervals {
    fn default() -> Self {
        Self {
            high_ms: HIGH_RATE_INTERVAL_MS,
            standard_ms: STANDARD_RATE_INTERVAL_MS,
            low_ms: LOW_RATE_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub firings: [u32; RATE_CLASS_COUNT],
    /// Deadlines passed over without a firing because the loop ran late.
    pub skipped_deadlines: u32,
}

/// Independent periodic deadlines for the three rate classes.
///
/// A class is due once `now >= next_fire_time`. Firing moves the deadline to
/// `now + interval`, so a late loop fires each class at most once and never
/// replays the deadlines it missed.
#[derive(Debug)]
pub struct RateScheduler {
    intervals: RateIntervals,
    next_fire: [u64; RATE_CLASS_COUNT],
    stats: SchedulerStats,
}

impl RateScheduler {
    pub fn new(intervals: RateIntervals) -> Self {
        Self {
            intervals,
            // Zero deadlines make every class fire on the first tick
            next_fire: [0; RATE_CLASS_COUNT],
            stats: SchedulerStats::default(),
        }
    }

    /// Classes due at `now`, earliest deadline first. Ties keep
    /// high/standard/low order.
    pub fn due_classes(&mut self, now: u64) -> Vec<RateClass, RATE_CLASS_COUNT> {
        self.stats.ticks = self.stats.ticks.wrapping_add(1);

        let mut due: Vec<RateClass, RATE_CLASS_COUNT> = RateClass::ALL
            .iter()
            .copied()
            .filter(|class| now >= self.next_fire[class.index()])
            .collect();

        due.sort_unstable_by_key(|class| (self.next_fire[class.index()], class.index()));
        due
    }

    pub fn mark_fired(&mut self, class: RateClass, now: u64) {
        let index = class.index();
        let interval = self.intervals.get(class);
        let deadline = self.next_fire[index];

        if deadline != 0 && interval > 0 && now >= deadline + interval {
            let missed = (now - deadline) / interval;
            self.stats.skipped_deadlines = self.stats.skipped_deadlines.saturating_add(missed as u32);
        }

        self.next_fire[index] = now + interval;
        self.stats.firings[index] = self.stats.firings[index].saturating_add(1);
    }

    pub fn next_fire_time(&self, class: RateClass) -> u64 {
        self.next_fire[class.index()]
    }

    /// Earliest pending deadline across all classes.
    pub fn next_deadline(&self) -> u64 {
        self.next_fire.iter().copied().min().unwrap_or(0)
    }

    pub fn get_intervals(&self) -> &RateIntervals {
        &self.intervals
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

impl Default for RateScheduler {
    fn default() -> Self {
        Self::new(RateIntervals::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire_all(scheduler: &mut RateScheduler, now: u64) -> Vec<RateClass, RATE_CLASS_COUNT> {
        let due = scheduler.due_classes(now);
        for class in &due {
            scheduler.mark_fired(*class, now);
        }
        due
    }

    #[test]
    fn test_scheduler_creation() {
        let scheduler = RateScheduler::default();
        for class in RateClass::ALL {
            assert_eq!(scheduler.next_fire_time(class), 0);
        }
        assert_eq!(scheduler.stats.ticks, 0);
    }

    #[test]
    fn test_all_classes_fire_on_first_tick() {
        let mut scheduler = RateScheduler::default();
        let due = fire_all(&mut scheduler, 0);
        assert_eq!(due.as_slice(), &[RateClass::High, RateClass::Standard, RateClass::Low]);

        assert_eq!(scheduler.next_fire_time(RateClass::High), 25);
        assert_eq!(scheduler.next_fire_time(RateClass::Standard), 100);
        assert_eq!(scheduler.next_fire_time(RateClass::Low), 1000);
    }

    #[test]
    fn test_classes_are_independent() {
        let mut scheduler = RateScheduler::default();
        fire_all(&mut scheduler, 0);

        let due = fire_all(&mut scheduler, 25);
        assert_eq!(due.as_slice(), &[RateClass::High]);
        assert_eq!(scheduler.next_fire_time(RateClass::Standard), 100);

        let due = fire_all(&mut scheduler, 60);
        assert!(due.is_empty());
    }

    #[test]
    fn test_deadline_order() {
        let mut scheduler = RateScheduler::default();
        fire_all(&mut scheduler, 0);
        // Standard deadline (100) is earlier than the high deadline set at 90 (115)
        fire_all(&mut scheduler, 90);

        let due = scheduler.due_classes(1000);
        assert_eq!(due.as_slice(), &[RateClass::Standard, RateClass::High, RateClass::Low]);
    }

    #[test]
    fn test_no_catch_up_after_stall() {
        let mut scheduler = RateScheduler::default();
        fire_all(&mut scheduler, 0);

        // Stall for ten high-rate periods
        let due = fire_all(&mut scheduler, 250);
        assert_eq!(due.iter().filter(|c| **c == RateClass::High).count(), 1);
        assert_eq!(scheduler.next_fire_time(RateClass::High), 275);
        assert_eq!(scheduler.stats.firings[RateClass::High.index()], 2);
        assert_eq!(scheduler.stats.skipped_deadlines, 9 + 1);
    }
}
