//! Scripted counter backend.
//!
//! Serves queued values and failures per counter path so the sampling engine
//! can be driven deterministically from unit and integration tests. Not used
//! by the monitor binary.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::counters::{CounterBackend, CounterPath, RawCounter, ReadFailure};
use crate::error::{MonitorError, Result};

/// One scripted read outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptedRead {
    Value(f64),
    Transient,
    Vanish,
}

#[derive(Default)]
struct ScriptState {
    steady: HashMap<CounterPath, f64>,
    queued: HashMap<CounterPath, VecDeque<ScriptedRead>>,
    instances: HashMap<String, Vec<String>>,
    opened: HashMap<CounterPath, usize>,
    released: usize,
}

/// Counter backend whose values are set by the caller.
///
/// Cloning shares the script, so a test can keep a clone after handing the
/// backend to a registry.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `path` resolvable, reading `value` whenever nothing is queued.
    pub fn define(&self, path: CounterPath, value: f64) {
        self.state.lock().steady.insert(path, value);
    }

    /// Queue a one-off outcome for `path`.
    pub fn push(&self, path: &CounterPath, read: ScriptedRead) {
        self.state
            .lock()
            .queued
            .entry(path.clone())
            .or_default()
            .push_back(read);
    }

    pub fn set_instances(&self, category: &str, instances: &[&str]) {
        self.state.lock().instances.insert(
            category.to_string(),
            instances.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// How many times `path` was acquired.
    pub fn open_count(&self, path: &CounterPath) -> usize {
        self.state.lock().opened.get(path).copied().unwrap_or(0)
    }

    /// How many acquired counters have been dropped.
    pub fn released_count(&self) -> usize {
        self.state.lock().released
    }
}

impl CounterBackend for ScriptedBackend {
    fn open(&self, path: &CounterPath) -> Result<Box<dyn RawCounter>> {
        let mut state = self.state.lock();
        if !state.steady.contains_key(path) {
            return Err(MonitorError::acquisition(path, "counter is not defined"));
        }
        *state.opened.entry(path.clone()).or_default() += 1;

        Ok(Box::new(ScriptedCounter {
            path: path.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    fn instances(&self, category: &str) -> Result<Vec<String>> {
        self.state
            .lock()
            .instances
            .get(category)
            .cloned()
            .ok_or_else(|| MonitorError::acquisition(category, "category has no instances"))
    }
}

struct ScriptedCounter {
    path: CounterPath,
    state: Arc<Mutex<ScriptState>>,
}

impl RawCounter for ScriptedCounter {
    fn next_value(&mut self) -> std::result::Result<f64, ReadFailure> {
        let mut state = self.state.lock();
        let queued = state
            .queued
            .get_mut(&self.path)
            .and_then(|queue| queue.pop_front());

        match queued {
            Some(ScriptedRead::Value(value)) => Ok(value),
            Some(ScriptedRead::Transient) => Err(ReadFailure::Transient("scripted".to_string())),
            Some(ScriptedRead::Vanish) => Err(ReadFailure::Vanished("scripted".to_string())),
            None => state
                .steady
                .get(&self.path)
                .copied()
                .ok_or_else(|| ReadFailure::Vanished("counter was undefined".to_string())),
        }
    }
}

impl Drop for ScriptedCounter {
    fn drop(&mut self) {
        self.state.lock().released += 1;
    }
}
