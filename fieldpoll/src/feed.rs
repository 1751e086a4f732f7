//! Schedules actions: once actions go straight to the sink, slow and fast actions are
//! kept until the host ticks the matching list

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::model::{Action, NodeId, RepeatPolicy};

/// Receives every action the feed dispatches
pub trait ActionSink: Send + Sync {
    /// queue one action for execution
    fn submit(&self, action: Action);
}

/// Once, slow and fast action lists
///
/// The feed owns no timers; the host calls [`ActionFeed::exec_slow`] and
/// [`ActionFeed::exec_fast`] at whatever cadence it chooses.
pub struct ActionFeed {
    sink: Arc<dyn ActionSink>,
    slow: Mutex<Vec<Action>>,
    fast: Mutex<Vec<Action>>,
}

fn lock(list: &Mutex<Vec<Action>>) -> MutexGuard<'_, Vec<Action>> {
    list.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ActionFeed {
    /// create a feed dispatching to `sink`
    pub fn new(sink: Arc<dyn ActionSink>) -> Self {
        Self {
            sink,
            slow: Mutex::new(Vec::new()),
            fast: Mutex::new(Vec::new()),
        }
    }

    /// dispatch a once action now, or append a repeating one to its list
    pub fn submit(&self, action: Action) {
        match action.repeat {
            RepeatPolicy::Once => self.sink.submit(action),
            RepeatPolicy::Slow => lock(&self.slow).push(action),
            RepeatPolicy::Fast => lock(&self.fast).push(action),
        }
    }

    /// dispatch every slow action in submission order, returning how many
    pub fn exec_slow(&self) -> usize {
        self.dispatch(&self.slow)
    }

    /// dispatch every fast action in submission order, returning how many
    pub fn exec_fast(&self) -> usize {
        self.dispatch(&self.fast)
    }

    fn dispatch(&self, list: &Mutex<Vec<Action>>) -> usize {
        // the sink may submit retries, so dispatch outside the lock
        let snapshot = lock(list).clone();
        let count = snapshot.len();
        for action in snapshot {
            self.sink.submit(action);
        }
        count
    }

    /// drop every slow and fast action of `node`
    pub fn remove_actions(&self, node: NodeId) {
        lock(&self.slow).retain(|x| x.node != node);
        lock(&self.fast).retain(|x| x.node != node);
    }

    /// number of slow and fast actions
    pub fn counts(&self) -> (usize, usize) {
        (lock(&self.slow).len(), lock(&self.fast).len())
    }
}
