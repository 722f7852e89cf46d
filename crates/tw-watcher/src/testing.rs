//! In-memory backend for deterministic agent tests.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::backend::{BackendHandle, BackendMessage, BackendSink, WatchBackend};
use crate::error::WatchError;
use crate::events::Event;

#[derive(Debug, Default)]
struct Recorded {
    opens: usize,
    failing_opens: usize,
    rejected: FxHashSet<Utf8PathBuf>,
    registered: Vec<Utf8PathBuf>,
    unregistered: Vec<Utf8PathBuf>,
    sink: Option<BackendSink>,
}

/// Backend that records every call and lets tests inject messages.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingBackend {
    state: Arc<Mutex<Recorded>>,
}

impl RecordingBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` opens fail.
    pub(crate) fn fail_opens(&self, count: usize) {
        self.state.lock().failing_opens = count;
    }

    /// Makes every registration of `path` fail.
    pub(crate) fn reject(&self, path: &Utf8Path) {
        self.state.lock().rejected.insert(path.to_owned());
    }

    pub(crate) fn opens(&self) -> usize {
        self.state.lock().opens
    }

    /// Every successful registration, in call order.
    pub(crate) fn registered(&self) -> Vec<Utf8PathBuf> {
        self.state.lock().registered.clone()
    }

    pub(crate) fn registrations_of(&self, path: &Utf8Path) -> usize {
        self.state
            .lock()
            .registered
            .iter()
            .filter(|registered| registered.as_path() == path)
            .count()
    }

    pub(crate) fn unregistered(&self) -> Vec<Utf8PathBuf> {
        self.state.lock().unregistered.clone()
    }

    /// Delivers `event` as if the OS had reported it.
    pub(crate) async fn emit(&self, event: Event) -> bool {
        let sink = self.state.lock().sink.clone();
        match sink {
            Some(sink) => sink.send(BackendMessage::Event(event)).await,
            None => false,
        }
    }

    /// Closes the message stream of the open handle.
    pub(crate) fn crash(&self) {
        self.state.lock().sink = None;
    }
}

impl WatchBackend for RecordingBackend {
    type Handle = RecordingHandle;

    fn open(&self, sink: BackendSink) -> Result<Self::Handle, WatchError> {
        let mut state = self.state.lock();
        state.opens += 1;
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(WatchError::BackendClosed);
        }
        state.sink = Some(sink);
        Ok(RecordingHandle {
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub(crate) struct RecordingHandle {
    state: Arc<Mutex<Recorded>>,
}

impl BackendHandle for RecordingHandle {
    fn register(&mut self, path: &Utf8Path) -> Result<(), WatchError> {
        let mut state = self.state.lock();
        if state.rejected.contains(path) {
            return Err(WatchError::register(path, "rejected by test backend"));
        }
        state.registered.push(path.to_owned());
        Ok(())
    }

    fn unregister(&mut self, path: &Utf8Path) {
        self.state.lock().unregistered.push(path.to_owned());
    }
}
