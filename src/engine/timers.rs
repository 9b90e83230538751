//! Per-question timeout scheduling.

use std::{collections::HashMap, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::warn;
use uuid::Uuid;

use crate::engine::protocol::WorkerCommand;

/// Map of armed question timeouts, keyed by `(match_id, question_index)`.
///
/// At most one live timer may exist per key. A timer that fires sends a
/// [`WorkerCommand::QuestionTimedOut`] back into the owning unit's command
/// channel, so the callback serializes with everything else the unit does.
#[derive(Default)]
pub struct TimerMap {
    inner: HashMap<(Uuid, usize), JoinHandle<()>>,
}

impl TimerMap {
    /// Build an empty timer map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timeout for a question index.
    ///
    /// A pre-existing live timer for the same key is a bug in the caller; it
    /// is cancelled and logged rather than left to double-fire.
    pub fn arm(
        &mut self,
        match_id: Uuid,
        question_index: usize,
        duration: Duration,
        commands: mpsc::UnboundedSender<WorkerCommand>,
    ) {
        let key = (match_id, question_index);
        if let Some(stale) = self.inner.remove(&key) {
            warn!(%match_id, question_index, "replacing a live question timer");
            stale.abort();
        }

        let handle = tokio::spawn(async move {
            sleep(duration).await;
            let _ = commands.send(WorkerCommand::QuestionTimedOut {
                match_id,
                question_index,
            });
        });
        self.inner.insert(key, handle);
    }

    /// Cancel the timer for a key, if armed. Returns whether one was live.
    pub fn cancel(&mut self, match_id: Uuid, question_index: usize) -> bool {
        match self.inner.remove(&(match_id, question_index)) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Drop the entry for a timer that just fired, without aborting it.
    pub fn forget(&mut self, match_id: Uuid, question_index: usize) {
        self.inner.remove(&(match_id, question_index));
    }

    /// Cancel every timer belonging to a match.
    pub fn cancel_all_for(&mut self, match_id: Uuid) {
        self.inner.retain(|(id, _), handle| {
            if *id == match_id {
                handle.abort();
                false
            } else {
                true
            }
        });
    }

    /// Whether a timer is currently armed for the key.
    pub fn is_armed(&self, match_id: Uuid, question_index: usize) -> bool {
        self.inner.contains_key(&(match_id, question_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn armed_timer_fires_a_timeout_command() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerMap::new();
        let match_id = Uuid::new_v4();

        timers.arm(match_id, 0, Duration::from_secs(30), tx);
        assert!(timers.is_armed(match_id, 0));

        let command = rx.recv().await.unwrap();
        match command {
            WorkerCommand::QuestionTimedOut {
                match_id: id,
                question_index,
            } => {
                assert_eq!(id, match_id);
                assert_eq!(question_index, 0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerMap::new();
        let match_id = Uuid::new_v4();

        timers.arm(match_id, 0, Duration::from_secs(30), tx);
        assert!(timers.cancel(match_id, 0));
        assert!(!timers.is_armed(match_id, 0));

        // Channel closes once the aborted task is dropped; no command arrives.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_a_key_keeps_a_single_live_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerMap::new();
        let match_id = Uuid::new_v4();

        timers.arm(match_id, 0, Duration::from_secs(30), tx.clone());
        timers.arm(match_id, 0, Duration::from_secs(30), tx);
        drop(timers.cancel(match_id, 0));

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_for_drops_only_that_match() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timers = TimerMap::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        timers.arm(first, 0, Duration::from_secs(30), tx.clone());
        timers.arm(first, 1, Duration::from_secs(30), tx.clone());
        timers.arm(second, 0, Duration::from_secs(30), tx);

        timers.cancel_all_for(first);
        assert!(!timers.is_armed(first, 0));
        assert!(!timers.is_armed(first, 1));
        assert!(timers.is_armed(second, 0));
    }
}
