use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
#[cfg(not(target_arch = "wasm32"))]
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

use log::error;
use parking_lot::{Condvar, Mutex};

use super::{LoadError, LoadedModel, MaybeSend};
use crate::environment::EnvironmentMap;
#[cfg(not(target_arch = "wasm32"))]
use crate::shell::panic_message;

/// Completion of a background load.
#[derive(Debug)]
pub enum LoadEvent {
    Environment(Result<EnvironmentMap, LoadError>),
    Model(Result<LoadedModel, LoadError>),
}

/// Which asset a background load produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    Environment,
    Model,
}

impl LoadKind {
    /// Failure event for this kind of load.
    pub fn failed(self, err: LoadError) -> LoadEvent {
        match self {
            Self::Environment => LoadEvent::Environment(Err(err)),
            Self::Model => LoadEvent::Model(Err(err)),
        }
    }
}

impl fmt::Display for LoadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment => f.write_str("environment"),
            Self::Model => f.write_str("model"),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<LoadEvent>,
    pending: usize,
}

/// Hands finished loads back to the thread that owns the scene.
///
/// Loader tasks only push events; the owner drains them between frames, so
/// scene mutation stays on one thread.
#[derive(Debug, Clone, Default)]
pub struct LoadQueue {
    state: Arc<Mutex<QueueState>>,
    idle: Arc<Condvar>,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` in the background and queues the event it resolves to.
    /// A panicking task is reported as a failed load of `kind`.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn spawn<F, Fut>(&self, kind: LoadKind, task: F)
    where
        F: FnOnce() -> Fut + MaybeSend + 'static,
        Fut: Future<Output = LoadEvent> + 'static,
    {
        self.state.lock().pending += 1;
        let queue = self.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("load-{kind}"))
            .spawn(move || {
                let event = panic::catch_unwind(AssertUnwindSafe(|| pollster::block_on(task())))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(payload);
                        error!("{kind} loader panicked: {message}");
                        kind.failed(LoadError::Panicked(message))
                    });
                queue.complete(event);
            });
        if let Err(err) = spawned {
            error!("failed to start {kind} loader: {err}");
            self.complete(kind.failed(LoadError::Read {
                path: kind.to_string(),
                message: err.to_string(),
            }));
        }
    }

    /// Runs `task` on the browser event loop and queues the event it resolves to.
    #[cfg(target_arch = "wasm32")]
    pub fn spawn<F, Fut>(&self, _kind: LoadKind, task: F)
    where
        F: FnOnce() -> Fut + MaybeSend + 'static,
        Fut: Future<Output = LoadEvent> + 'static,
    {
        self.state.lock().pending += 1;
        let queue = self.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let event = task().await;
            queue.complete(event);
        });
    }

    /// Queues an already finished event.
    pub fn push(&self, event: LoadEvent) {
        self.state.lock().ready.push_back(event);
        self.idle.notify_all();
    }

    fn complete(&self, event: LoadEvent) {
        let mut state = self.state.lock();
        state.ready.push_back(event);
        state.pending = state.pending.saturating_sub(1);
        drop(state);
        self.idle.notify_all();
    }

    /// Takes every queued event in completion order.
    pub fn drain(&self) -> Vec<LoadEvent> {
        self.state.lock().ready.drain(..).collect()
    }

    /// Loads still running.
    pub fn pending(&self) -> usize {
        self.state.lock().pending
    }

    /// Blocks until no loads are running or `timeout` elapses. Returns whether
    /// the queue went idle.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.pending > 0 {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return state.pending == 0;
            }
        }
        true
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn spawned_loads_arrive_in_the_queue() {
        let queue = LoadQueue::new();
        queue.spawn(LoadKind::Model, || async {
            LoadEvent::Model(Err(LoadError::MissingData("nothing here".into())))
        });
        assert!(queue.wait_idle(Duration::from_secs(5)));
        assert_eq!(queue.pending(), 0);
        let events = queue.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], LoadEvent::Model(Err(_))));
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn wait_idle_times_out_while_a_load_is_blocked() {
        let queue = LoadQueue::new();
        let (release, blocked) = std::sync::mpsc::channel::<()>();
        queue.spawn(LoadKind::Model, move || async move {
            let _ = blocked.recv();
            LoadEvent::Model(Err(LoadError::MissingData("late".into())))
        });
        assert!(!queue.wait_idle(Duration::from_millis(20)));
        assert_eq!(queue.pending(), 1);
        release.send(()).unwrap();
        assert!(queue.wait_idle(Duration::from_secs(5)));
        assert_eq!(queue.drain().len(), 1);
    }

    #[test]
    fn panicking_loads_become_failures() {
        let queue = LoadQueue::new();
        fn explode() -> LoadEvent {
            panic!("decoder blew up")
        }
        queue.spawn(LoadKind::Environment, || async { explode() });
        assert!(queue.wait_idle(Duration::from_secs(5)));
        assert_eq!(queue.pending(), 0);
        let events = queue.drain();
        assert_eq!(events.len(), 1);
        match &events[0] {
            LoadEvent::Environment(Err(LoadError::Panicked(message))) => {
                assert_eq!(message, "decoder blew up")
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn clones_share_one_queue() {
        let queue = LoadQueue::new();
        let producer = queue.clone();
        producer.push(LoadEvent::Model(Err(LoadError::Unsupported("x".into()))));
        assert_eq!(queue.drain().len(), 1);
    }
}
