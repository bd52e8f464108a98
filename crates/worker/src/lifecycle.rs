//! Worker lifecycle: states and the events dispatched to the cache manager.

use std::fmt;

use url::Url;

/// Phases a worker instance moves through.
///
/// Transitions are driven entirely by the hosting runtime; the cache
/// manager only supplies the side effects executed during `Installing`
/// (precache) and `Activating` (prune).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Waiting,
    Activating,
    Activated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
        };
        f.write_str(name)
    }
}

/// An intercepted request. Identity is the method plus the canonical URL.
#[derive(Debug, Clone)]
pub struct ShellRequest {
    pub method: String,
    pub url: Url,
}

impl ShellRequest {
    pub fn get(url: Url) -> Self {
        Self { method: "GET".to_string(), url }
    }
}

/// Events delivered by the hosting runtime.
///
/// The explicit enum doubles as the dispatch table: one `match` in the
/// worker routes each event to its handler.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Install,
    Fetch(ShellRequest),
    Activate,
}
