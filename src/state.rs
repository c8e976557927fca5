//! Per-task state table.
//!
//! The only mutable structure shared across workers. `try_claim` is the
//! CAS that moves a task index out of `Seen`: exactly one caller wins,
//! every redelivery of the same index loses, so terminal states are
//! reached at most once no matter how often the transport replays an
//! event.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Seen,
    Processing,
    Responded,
    Failed,
}

/// Outcome of recording a processing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Budget remains; the task is back in `Processing` for another pass.
    Retry { attempt: u32 },
    /// Budget exhausted; the task is terminally `Failed`.
    Terminal,
}

struct Entry {
    state: TaskState,
    attempts: u32,
}

pub struct StateTable {
    entries: Mutex<HashMap<u32, Entry>>,
    max_attempts: u32,
}

impl StateTable {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Claim a freshly seen task index for processing. Returns false if the
    /// index was ever seen before, whether in flight or terminal.
    pub fn try_claim(&self, task_index: u32) -> bool {
        let mut entries = self.entries.lock().expect("state lock");
        match entries.get(&task_index) {
            Some(_) => false,
            None => {
                entries.insert(
                    task_index,
                    Entry {
                        state: TaskState::Processing,
                        attempts: 0,
                    },
                );
                true
            }
        }
    }

    /// Transition the claimed task to `Responded`.
    pub fn complete(&self, task_index: u32) {
        let mut entries = self.entries.lock().expect("state lock");
        if let Some(entry) = entries.get_mut(&task_index) {
            debug_assert_eq!(entry.state, TaskState::Processing);
            entry.state = TaskState::Responded;
        }
    }

    /// Record a failed processing pass. Stays in `Processing` while retry
    /// budget remains, otherwise becomes terminal `Failed`.
    pub fn fail(&self, task_index: u32) -> FailOutcome {
        let mut entries = self.entries.lock().expect("state lock");
        let Some(entry) = entries.get_mut(&task_index) else {
            return FailOutcome::Terminal;
        };

        entry.attempts += 1;
        if entry.attempts >= self.max_attempts {
            entry.state = TaskState::Failed;
            FailOutcome::Terminal
        } else {
            FailOutcome::Retry {
                attempt: entry.attempts,
            }
        }
    }

    /// Terminal failure with no further retries, for rejections that a
    /// repeat attempt cannot fix.
    pub fn abandon(&self, task_index: u32) {
        let mut entries = self.entries.lock().expect("state lock");
        if let Some(entry) = entries.get_mut(&task_index) {
            entry.state = TaskState::Failed;
            entry.attempts = self.max_attempts;
        }
    }

    pub fn state_of(&self, task_index: u32) -> Option<TaskState> {
        self.entries
            .lock()
            .expect("state lock")
            .get(&task_index)
            .map(|entry| entry.state)
    }
}
