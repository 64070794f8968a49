//! Macrotask timers and the promise microtask queue.
//!
//! Timers fire in due order, ties broken by registration order. The
//! microtask queue is drained completely after the main script and after
//! every timer callback.

use super::value::{Reaction, Settled, Value};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

pub struct Timer {
    pub id: u64,
    pub due: Instant,
    seq: u64,
    pub callback: Value,
    pub args: Vec<Value>,
    /// Repeat period for `setInterval`
    pub interval: Option<Duration>,
}

/// A promise reaction waiting to run
pub struct Job {
    pub reaction: Reaction,
    pub outcome: Settled,
}

#[derive(Default)]
pub struct EventLoop {
    timers: Vec<Timer>,
    microtasks: VecDeque<Job>,
    next_id: u64,
    next_seq: u64,
    /// Intervals cleared while their own callback was running
    cleared: HashSet<u64>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a timer and return its handle
    pub fn add_timer(
        &mut self,
        callback: Value,
        delay: Duration,
        args: Vec<Value>,
        interval: Option<Duration>,
    ) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.schedule(Timer {
            id,
            due: Instant::now() + delay,
            seq: 0,
            callback,
            args,
            interval,
        });
        id
    }

    fn schedule(&mut self, mut timer: Timer) {
        self.next_seq += 1;
        timer.seq = self.next_seq;
        self.timers.push(timer);
    }

    pub fn clear_timer(&mut self, id: u64) {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        if self.timers.len() == before {
            self.cleared.insert(id);
        }
    }

    /// Put an interval back after its callback ran, unless it was cleared
    pub fn reschedule(&mut self, mut timer: Timer) {
        if self.cleared.remove(&timer.id) {
            return;
        }
        if let Some(period) = timer.interval {
            timer.due = Instant::now() + period;
            self.schedule(timer);
        }
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.due).min()
    }

    /// Take the earliest timer that is due at `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<Timer> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= now)
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(i, _)| i)?;
        Some(self.timers.remove(index))
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn enqueue(&mut self, job: Job) {
        self.microtasks.push_back(job);
    }

    pub fn next_job(&mut self) -> Option<Job> {
        self.microtasks.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_order_with_ties() {
        let mut lp = EventLoop::new();
        let a = lp.add_timer(Value::Null, Duration::ZERO, vec![], None);
        let b = lp.add_timer(Value::Null, Duration::ZERO, vec![], None);
        let later = Instant::now() + Duration::from_millis(5);
        assert_eq!(lp.pop_due(later).map(|t| t.id), Some(a));
        assert_eq!(lp.pop_due(later).map(|t| t.id), Some(b));
        assert!(lp.pop_due(later).is_none());
    }

    #[test]
    fn test_clear_interval_during_callback() {
        let mut lp = EventLoop::new();
        let id = lp.add_timer(
            Value::Null,
            Duration::ZERO,
            vec![],
            Some(Duration::from_millis(1)),
        );
        let timer = lp.pop_due(Instant::now() + Duration::from_millis(1)).unwrap();
        lp.clear_timer(id);
        lp.reschedule(timer);
        assert_eq!(lp.pending_timers(), 0);
    }

    #[test]
    fn test_interval_reschedules() {
        let mut lp = EventLoop::new();
        lp.add_timer(Value::Null, Duration::ZERO, vec![], Some(Duration::from_millis(1)));
        let timer = lp.pop_due(Instant::now() + Duration::from_millis(1)).unwrap();
        lp.reschedule(timer);
        assert_eq!(lp.pending_timers(), 1);
    }
}
