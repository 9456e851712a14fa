//! One request attempt and its terminal transition.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use callflow_core::EndStatus;

use crate::error::RequestError;
use crate::options::RequestOptions;
use crate::response::Response;
use crate::transport::{EventSink, ReadyState, Transport, TransportEvent};

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The state of one transport attempt.
///
/// A lifecycle owns exactly one transport call. It becomes done at most
/// once; after a followed redirect it also owns the lifecycle of the next
/// attempt, reachable through [`Lifecycle::redirect`].
pub struct Lifecycle {
    options: RequestOptions,
    transport: Mutex<Box<dyn Transport>>,
    done: AtomicBool,
    aborted: AtomicBool,
    redirect: Mutex<Option<Arc<Lifecycle>>>,
    signals: EventSink,
}

impl Lifecycle {
    pub(crate) fn new(
        options: RequestOptions,
        transport: Box<dyn Transport>,
        signals: EventSink,
    ) -> Self {
        Self {
            options,
            transport: Mutex::new(transport),
            done: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            redirect: Mutex::new(None),
            signals,
        }
    }

    /// Options of this attempt, with effective headers applied.
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Returns true once the attempt has reached a terminal status.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Returns true if the attempt ended by abort, or an abort is pending.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// The lifecycle created by following a redirect from this one.
    pub fn redirect(&self) -> Option<Arc<Lifecycle>> {
        lock(&self.redirect).clone()
    }

    /// The lifecycle whose redirect created this one, while it is alive.
    pub fn original(&self) -> Option<Arc<Lifecycle>> {
        self.options.original()
    }

    /// HTTP status of this attempt, `0` when unavailable.
    pub fn status(&self) -> u16 {
        lock(&self.transport).status()
    }

    /// HTTP status text of this attempt.
    pub fn status_text(&self) -> String {
        lock(&self.transport).status_text()
    }

    /// Ready state of the transport call.
    pub fn ready_state(&self) -> ReadyState {
        lock(&self.transport).ready_state()
    }

    /// A response header of this attempt.
    pub fn response_header(&self, name: &str) -> Option<String> {
        lock(&self.transport).response_header(name)
    }

    /// Cancel the attempt and any redirect chain hanging off it.
    ///
    /// An abort requested before the attempt finishes ends it with `abort`,
    /// even when the transport has already completed the call. Calling
    /// `abort` more than once has no further effect. After the attempt has
    /// finished it only forwards to a followed redirect.
    pub fn abort(&self) {
        let child = self.redirect();
        if self.is_done() && child.is_none() {
            return;
        }
        if self.aborted.swap(true, Ordering::SeqCst) {
            return;
        }

        if !self.is_done() {
            tracing::debug!(url = %self.options.url(), "aborting request");
            lock(&self.transport).abort();
            self.signals.emit(TransportEvent::Abort(None));
        }

        if let Some(child) = child {
            child.abort();
        }
    }

    pub(crate) fn transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        lock(&self.transport)
    }

    pub(crate) fn set_redirect(&self, child: Arc<Lifecycle>) {
        *lock(&self.redirect) = Some(child);
    }

    /// Move into a terminal status.
    ///
    /// Returns false if the lifecycle was already done. Every status except
    /// `Redirect` settles the outcome through `settle`.
    pub(crate) fn end(
        self: &Arc<Self>,
        status: EndStatus,
        cause: Option<RequestError>,
        settle: &mut Option<oneshot::Sender<Response>>,
    ) -> bool {
        if self.done.swap(true, Ordering::SeqCst) {
            return false;
        }
        if status == EndStatus::Abort {
            self.aborted.store(true, Ordering::SeqCst);
        }

        match &cause {
            Some(err) => tracing::debug!(end_status = %status, error = %err, "request ended"),
            None => tracing::debug!(end_status = %status, "request ended"),
        }

        if status.settles() {
            if let Some(tx) = settle.take() {
                let _ = tx.send(Response::new(self.clone(), status, cause));
            }
        }
        true
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("method", self.options.get_method())
            .field("url", &self.options.url())
            .field("done", &self.is_done())
            .field("aborted", &self.is_aborted())
            .field("redirected", &lock(&self.redirect).is_some())
            .finish()
    }
}
