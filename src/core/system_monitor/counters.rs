//! Performance counter handles and the registry that owns them.
//!
//! A [`CounterRegistry`] owns every OS counter resource acquired by the
//! monitor. Callers get lightweight [`CounterHandle`]s that read through the
//! registry. A handle whose backing object disappears removes its counter
//! from the registry, releases it, and reads as NaN until it is reopened.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Fully qualified name of an OS performance counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterPath {
    pub category: String,
    pub counter: String,
    /// `None` for single-instance categories such as `Memory`.
    pub instance: Option<String>,
}

impl CounterPath {
    pub fn new(category: &str, counter: &str, instance: Option<&str>) -> Self {
        Self {
            category: category.to_string(),
            counter: counter.to_string(),
            instance: instance.map(str::to_string),
        }
    }
}

impl fmt::Display for CounterPath {
    /// Formats the path using PDH syntax, e.g. `\Processor(_Total)\% Processor Time`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "\\{}({})\\{}", self.category, instance, self.counter),
            None => write!(f, "\\{}\\{}", self.category, self.counter),
        }
    }
}

/// Why a single raw read failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFailure {
    /// The value is unavailable this time; the counter itself is still usable.
    Transient(String),
    /// The object behind the counter (a disk, an interface, ...) is gone.
    Vanished(String),
}

/// One acquired OS counter.
///
/// Dropping a `RawCounter` releases its OS resources.
pub trait RawCounter: Send {
    /// Fetch the next formatted value.
    fn next_value(&mut self) -> std::result::Result<f64, ReadFailure>;
}

/// The OS counter subsystem.
pub trait CounterBackend: Send + Sync {
    /// Resolve and acquire a counter.
    ///
    /// Fails with [`MonitorError::Acquisition`](crate::MonitorError::Acquisition)
    /// when the category or counter cannot be resolved at all.
    fn open(&self, path: &CounterPath) -> Result<Box<dyn RawCounter>>;

    /// List instance names currently exposed by a category.
    fn instances(&self, category: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CounterState {
    Active,
    Invalid,
}

/// Outcome of [`CounterHandle::read`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterRead {
    Ok(f64),
    /// The read failed this tick only.
    TransientNaN,
    /// The handle was invalidated by this or an earlier read.
    Invalidated,
}

impl CounterRead {
    /// The read value, or NaN when nothing could be read.
    pub fn value(self) -> f64 {
        match self {
            CounterRead::Ok(value) => value,
            CounterRead::TransientNaN | CounterRead::Invalidated => f64::NAN,
        }
    }

    pub fn is_invalidated(self) -> bool {
        matches!(self, CounterRead::Invalidated)
    }
}

struct Registered {
    counter: Box<dyn RawCounter>,
    generation: u64,
}

#[derive(Default)]
struct RegistryInner {
    counters: HashMap<CounterPath, Registered>,
    next_generation: u64,
}

/// Owner of every acquired counter, keyed by its path.
///
/// One OS counter exists per unique path. The registry is shared between the
/// sampling thread and the shutdown path, so access goes through a mutex.
pub struct CounterRegistry {
    backend: Box<dyn CounterBackend>,
    inner: Mutex<RegistryInner>,
}

impl CounterRegistry {
    pub fn new(backend: Box<dyn CounterBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            inner: Mutex::new(RegistryInner::default()),
        })
    }

    /// Open a handle to `path`, acquiring the OS counter on first use.
    ///
    /// With `scrap_first`, a freshly acquired counter is read once and the
    /// value discarded; several OS counters report garbage on their first read.
    pub fn open(self: &Arc<Self>, path: CounterPath, scrap_first: bool) -> Result<CounterHandle> {
        let mut inner = self.inner.lock();

        let generation = match inner.counters.get(&path) {
            Some(registered) => registered.generation,
            None => {
                let mut counter = self.backend.open(&path)?;
                if scrap_first {
                    let _ = counter.next_value();
                }

                inner.next_generation += 1;
                let generation = inner.next_generation;
                inner.counters.insert(
                    path.clone(),
                    Registered {
                        counter,
                        generation,
                    },
                );
                log::debug!("Acquired counter {}", path);
                generation
            }
        };

        Ok(CounterHandle {
            registry: Arc::clone(self),
            path,
            generation,
            state: CounterState::Active,
            last_value: None,
        })
    }

    /// Instance names of a counter category, as reported by the backend.
    pub fn instances(&self, category: &str) -> Result<Vec<String>> {
        self.backend.instances(category)
    }

    pub fn contains(&self, path: &CounterPath) -> bool {
        self.inner.lock().counters.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every registered counter. Returns how many were released.
    ///
    /// Handles still alive afterwards read as invalidated.
    pub fn release_all(&self) -> usize {
        let drained: Vec<_> = self.inner.lock().counters.drain().collect();
        let count = drained.len();
        for (path, registered) in drained {
            log::debug!("Releasing counter {}", path);
            drop(registered);
        }
        count
    }
}

/// Read access to one registered counter.
pub struct CounterHandle {
    registry: Arc<CounterRegistry>,
    path: CounterPath,
    generation: u64,
    state: CounterState,
    last_value: Option<f64>,
}

impl CounterHandle {
    pub fn path(&self) -> &CounterPath {
        &self.path
    }

    pub fn state(&self) -> CounterState {
        self.state
    }

    /// Last value successfully read through this handle.
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    /// Read the next value. Never fails; see [`CounterRead`].
    pub fn read(&mut self) -> CounterRead {
        if self.state == CounterState::Invalid {
            return CounterRead::Invalidated;
        }

        let mut inner = self.registry.inner.lock();
        let generation = self.generation;
        let current = inner
            .counters
            .get_mut(&self.path)
            .filter(|registered| registered.generation == generation);

        // Released at shutdown, or invalidated through another handle.
        let Some(registered) = current else {
            self.state = CounterState::Invalid;
            return CounterRead::Invalidated;
        };

        match registered.counter.next_value() {
            Ok(value) => {
                self.last_value = Some(value);
                CounterRead::Ok(value)
            }
            Err(ReadFailure::Transient(reason)) => {
                log::trace!("Transient read failure on {}: {}", self.path, reason);
                CounterRead::TransientNaN
            }
            Err(ReadFailure::Vanished(reason)) => {
                let removed = inner.counters.remove(&self.path);
                drop(inner);
                drop(removed);
                self.state = CounterState::Invalid;
                log::warn!("Counter {} vanished: {}", self.path, reason);
                CounterRead::Invalidated
            }
        }
    }

    /// Reopen the same path, replacing this handle's registration.
    pub fn reacquire(&mut self, scrap_first: bool) -> Result<()> {
        let fresh = self.registry.open(self.path.clone(), scrap_first)?;
        *self = fresh;
        Ok(())
    }
}

impl fmt::Debug for CounterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterHandle")
            .field("path", &self.path.to_string())
            .field("state", &self.state)
            .field("last_value", &self.last_value)
            .finish()
    }
}
