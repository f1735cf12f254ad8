//! Deferred work keyed on the monotonic clock.
//!
//! The simulation loop drains due tasks once per tick; nothing here owns a
//! timer of its own. A task whose subject has gone away by the time it
//! fires is simply dropped by the handler.

use crate::world::PlayerId;
use shared::DeathSummary;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Tell a dying player how their run went.
    RevealDeath {
        player_id: PlayerId,
        summary: DeathSummary,
    },
    /// Close the death screen and drop the connection.
    FinishDeath { player_id: PlayerId },
}

#[derive(Debug, Default)]
pub struct Scheduler {
    // Kept sorted by due time; insertion order breaks ties.
    pending: Vec<(Instant, Task)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: Instant, task: Task) {
        let index = self.pending.partition_point(|(due, _)| *due <= at);
        self.pending.insert(index, (at, task));
    }

    /// Removes and returns every task due at or before `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<(Instant, Task)> {
        let split = self.pending.partition_point(|(due, _)| *due <= now);
        self.pending.drain(..split).collect()
    }

    /// Drops every pending task concerning `player_id`.
    pub fn cancel_player(&mut self, player_id: PlayerId) {
        self.pending.retain(|(_, task)| match task {
            Task::RevealDeath { player_id: id, .. } | Task::FinishDeath { player_id: id } => {
                *id != player_id
            }
        });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn finish(player_id: PlayerId) -> Task {
        Task::FinishDeath { player_id }
    }

    #[test]
    fn test_tasks_come_out_in_due_order() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(now + Duration::from_secs(3), finish(3));
        scheduler.schedule(now + Duration::from_secs(1), finish(1));
        scheduler.schedule(now + Duration::from_secs(2), finish(2));
        scheduler.schedule(now + Duration::from_secs(1), finish(4));

        let due = scheduler.take_due(now + Duration::from_secs(2));
        let order: Vec<Task> = due.into_iter().map(|(_, task)| task).collect();
        assert_eq!(order, vec![finish(1), finish(4), finish(2)]);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_nothing_due_early() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(now + Duration::from_millis(500), finish(1));

        assert!(scheduler.take_due(now).is_empty());
        assert_eq!(scheduler.take_due(now + Duration::from_millis(500)).len(), 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_cancel_player() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(now, finish(1));
        scheduler.schedule(now, finish(2));
        scheduler.cancel_player(1);

        let due = scheduler.take_due(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, finish(2));
    }
}
