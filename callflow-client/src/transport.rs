//! Transport capability used by request lifecycles.
//!
//! A [`Transport`] is one in-flight call shaped like the browser's
//! `XMLHttpRequest`: it is opened, configured, sent, and reports progress
//! through a fixed set of [`TransportEvent`]s. The lifecycle never follows
//! redirects through the transport; it only reads status and headers once
//! the call has loaded.
//!
//! Events reach two audiences:
//!
//! - the owning lifecycle, through the [`EventSink`] installed with
//!   [`Transport::set_event_sink`]
//! - raw user listeners registered with [`Transport::add_event_listener`]
//!
//! [`EventTarget`] bundles both so implementations only need one
//! `dispatch` call per event, and one `dispatch_end` to close a call.
//!
//! # Bundled transport
//!
//! [`HyperConnector`] produces [`HyperCall`] transports backed by
//! hyper_util's legacy client, with rustls for HTTPS (feature-gated).

mod connector;
mod hyper;
#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderName, HeaderValue, Method};
use tokio::sync::mpsc;

use callflow_core::Body;

use crate::error::TransportError;
use crate::response::ResponseData;

pub use connector::{build_https_connector, default_tls_config, has_tls_support};
pub use self::hyper::{HyperCall, HyperConnector, HyperConnectorBuilder};

// Re-export rustls types that users might need for TLS configuration
pub use rustls::ClientConfig as TlsClientConfig;

/// Progress of a body transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Bytes transferred so far.
    pub loaded: u64,
    /// Total bytes expected, when known.
    pub total: Option<u64>,
}

impl ProgressEvent {
    /// Create a progress event.
    pub fn new(loaded: u64, total: Option<u64>) -> Self {
        Self { loaded, total }
    }

    /// Returns true when the total size is known.
    pub fn length_computable(&self) -> bool {
        self.total.is_some()
    }
}

/// Ready states of a transport call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// Created, not opened yet.
    #[default]
    Unsent = 0,
    /// `open` has been called.
    Opened = 1,
    /// Status and response headers are available.
    HeadersReceived = 2,
    /// The response body is arriving.
    Loading = 3,
    /// The call is complete, successfully or not.
    Done = 4,
}

/// Hint for how a transport should expose the response body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResponseType {
    /// Text, with content sniffing left to the caller.
    #[default]
    Default,
    ArrayBuffer,
    Blob,
    Document,
    Json,
    Text,
}

impl ResponseType {
    /// The name used by the browser transport.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Default => "",
            ResponseType::ArrayBuffer => "arraybuffer",
            ResponseType::Blob => "blob",
            ResponseType::Document => "document",
            ResponseType::Json => "json",
            ResponseType::Text => "text",
        }
    }
}

/// Names of the events a transport emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    LoadStart,
    Progress,
    LoadEnd,
    Load,
    Error,
    Abort,
    Timeout,
    ReadyStateChange,
    /// `progress` on the upload side of the call.
    UploadProgress,
}

impl EventKind {
    /// The raw event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LoadStart => "loadstart",
            EventKind::Progress => "progress",
            EventKind::LoadEnd => "loadend",
            EventKind::Load => "load",
            EventKind::Error => "error",
            EventKind::Abort => "abort",
            EventKind::Timeout => "timeout",
            EventKind::ReadyStateChange => "readystatechange",
            EventKind::UploadProgress => "upload.progress",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown event name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown event: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for EventKind {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loadstart" => Ok(EventKind::LoadStart),
            "progress" => Ok(EventKind::Progress),
            "loadend" => Ok(EventKind::LoadEnd),
            "load" => Ok(EventKind::Load),
            "error" => Ok(EventKind::Error),
            "abort" => Ok(EventKind::Abort),
            "timeout" => Ok(EventKind::Timeout),
            "readystatechange" => Ok(EventKind::ReadyStateChange),
            "upload.progress" => Ok(EventKind::UploadProgress),
            other => Err(UnknownEvent(other.to_string())),
        }
    }
}

/// An event emitted by a transport call.
///
/// Failure events may carry the error the transport observed.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    LoadStart(ProgressEvent),
    Progress(ProgressEvent),
    LoadEnd(ProgressEvent),
    UploadProgress(ProgressEvent),
    ReadyStateChange(ReadyState),
    Load,
    Error(Option<TransportError>),
    Abort(Option<TransportError>),
    Timeout(Option<TransportError>),
}

impl TransportEvent {
    /// The kind of this event, used to match listeners.
    pub fn kind(&self) -> EventKind {
        match self {
            TransportEvent::LoadStart(_) => EventKind::LoadStart,
            TransportEvent::Progress(_) => EventKind::Progress,
            TransportEvent::LoadEnd(_) => EventKind::LoadEnd,
            TransportEvent::UploadProgress(_) => EventKind::UploadProgress,
            TransportEvent::ReadyStateChange(_) => EventKind::ReadyStateChange,
            TransportEvent::Load => EventKind::Load,
            TransportEvent::Error(_) => EventKind::Error,
            TransportEvent::Abort(_) => EventKind::Abort,
            TransportEvent::Timeout(_) => EventKind::Timeout,
        }
    }
}

/// A raw event listener attached directly to a transport.
pub type Listener = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

/// Delivers transport events to the owning lifecycle.
///
/// Emitting never blocks. Events emitted after the lifecycle has finished
/// are discarded.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver an event.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send(event);
    }
}

/// Listener registry plus the lifecycle sink.
///
/// Cloning is cheap; implementations typically clone the target out of
/// their locked state and dispatch without holding the lock.
#[derive(Clone, Default)]
pub struct EventTarget {
    listeners: Vec<(EventKind, Listener)>,
    sink: Option<EventSink>,
}

impl EventTarget {
    /// Create an empty target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the lifecycle sink, replacing any previous one.
    pub fn set_sink(&mut self, sink: EventSink) {
        self.sink = Some(sink);
    }

    /// Register a listener for one event kind.
    pub fn add(&mut self, kind: EventKind, listener: Listener) {
        self.listeners.push((kind, listener));
    }

    /// Remove a listener previously registered for `kind`.
    ///
    /// Listeners are matched by identity, not by behaviour.
    pub fn remove(&mut self, kind: EventKind, listener: &Listener) {
        self.listeners
            .retain(|(k, l)| !(*k == kind && Arc::ptr_eq(l, listener)));
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver an event to matching listeners, then to the sink.
    pub fn dispatch(&self, event: TransportEvent) {
        self.notify(&event);
        if let Some(sink) = &self.sink {
            sink.emit(event);
        }
    }

    /// Deliver the closing sequence of a call: `readystatechange` to DONE,
    /// `terminal`, then `loadend`.
    ///
    /// Listeners see that order. The sink receives `terminal` first, so the
    /// lifecycle settles on the reported outcome without waiting on the
    /// readystate fallback.
    pub fn dispatch_end(&self, terminal: TransportEvent, progress: ProgressEvent) {
        let done = TransportEvent::ReadyStateChange(ReadyState::Done);
        let end = TransportEvent::LoadEnd(progress);
        self.notify(&done);
        self.notify(&terminal);
        self.notify(&end);
        if let Some(sink) = &self.sink {
            sink.emit(terminal);
            sink.emit(done);
            sink.emit(end);
        }
    }

    fn notify(&self, event: &TransportEvent) {
        let kind = event.kind();
        for (k, listener) in &self.listeners {
            if *k == kind {
                listener(event);
            }
        }
    }
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("listeners", &self.listeners.len())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// One transport call.
///
/// Methods are called by the lifecycle in this order: `set_event_sink`,
/// `add_event_listener`, `open`, `set_with_credentials`, `set_timeout`,
/// `set_request_header`, `set_response_type`, `send`. `abort` may be called
/// at any time. Read accessors may be called at any time and report
/// whatever the call has received so far.
///
/// Implementations may dispatch events synchronously from inside `abort`.
/// Listeners must not call back into the lifecycle that owns the transport
/// while handling such an event.
pub trait Transport: Send + 'static {
    /// Prepare the call. Requests are always asynchronous.
    fn open(&mut self, method: &Method, url: &str) -> Result<(), TransportError>;

    /// Include credentials (cookies, auth) with the call. Only valid after `open`.
    fn set_with_credentials(&mut self, enabled: bool) -> Result<(), TransportError>;

    /// Arm the transport's own timeout.
    fn set_timeout(&mut self, timeout: Duration);

    /// Choose how the response body is exposed through [`Transport::response`].
    fn set_response_type(&mut self, response_type: ResponseType);

    /// Add a request header. Only valid after `open`.
    fn set_request_header(
        &mut self,
        name: &HeaderName,
        value: &HeaderValue,
    ) -> Result<(), TransportError>;

    /// Install the sink that receives every event of this call.
    fn set_event_sink(&mut self, sink: EventSink);

    /// Attach a raw listener.
    fn add_event_listener(&mut self, kind: EventKind, listener: Listener);

    /// Detach a raw listener.
    fn remove_event_listener(&mut self, kind: EventKind, listener: &Listener);

    /// Start the call.
    fn send(&mut self, body: Option<Body>) -> Result<(), TransportError>;

    /// Cancel the call.
    fn abort(&mut self);

    /// Current ready state.
    fn ready_state(&self) -> ReadyState;

    /// Response status, `0` when unavailable.
    fn status(&self) -> u16;

    /// Response status text, empty when unavailable.
    fn status_text(&self) -> String;

    /// Response body as text, if any has been received.
    fn response_text(&self) -> Option<String>;

    /// Response body shaped by the response type, if the transport provides one.
    fn response(&self) -> Option<ResponseData>;

    /// A response header value.
    fn response_header(&self, name: &str) -> Option<String>;
}

/// Produces a fresh transport for every attempt.
pub trait Connect: Send + Sync + 'static {
    /// Create a transport for one call.
    fn connect(&self) -> Box<dyn Transport>;
}

impl<F> Connect for F
where
    F: Fn() -> Box<dyn Transport> + Send + Sync + 'static,
{
    fn connect(&self) -> Box<dyn Transport> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener(counter: &Arc<AtomicUsize>) -> Listener {
        let counter = counter.clone();
        Arc::new(move |_event: &TransportEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_event_kind_round_trip_names() {
        assert_eq!("loadstart".parse::<EventKind>(), Ok(EventKind::LoadStart));
        assert_eq!(
            "upload.progress".parse::<EventKind>(),
            Ok(EventKind::UploadProgress)
        );
        assert_eq!(
            "unload".parse::<EventKind>(),
            Err(UnknownEvent("unload".into()))
        );
        assert_eq!(EventKind::ReadyStateChange.to_string(), "readystatechange");
    }

    #[test]
    fn test_event_kind_of_event() {
        assert_eq!(TransportEvent::Load.kind(), EventKind::Load);
        assert_eq!(
            TransportEvent::UploadProgress(ProgressEvent::default()).kind(),
            EventKind::UploadProgress
        );
        assert_eq!(TransportEvent::Timeout(None).kind(), EventKind::Timeout);
    }

    #[test]
    fn test_ready_state_ordering() {
        assert!(ReadyState::Unsent < ReadyState::Opened);
        assert!(ReadyState::Loading < ReadyState::Done);
        assert_eq!(ReadyState::Done as u8, 4);
    }

    #[test]
    fn test_event_target_dispatches_by_kind() {
        let loads = Arc::new(AtomicUsize::new(0));
        let mut target = EventTarget::new();
        target.add(EventKind::Load, counting_listener(&loads));

        target.dispatch(TransportEvent::Load);
        target.dispatch(TransportEvent::Error(None));

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_target_dispatch_end_sends_outcome_first() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut target = EventTarget::new();
        for kind in [EventKind::ReadyStateChange, EventKind::Load, EventKind::LoadEnd] {
            let seen = seen.clone();
            target.add(
                kind,
                Arc::new(move |event: &TransportEvent| {
                    seen.lock().unwrap().push(event.kind());
                }),
            );
        }
        let (sink, mut rx) = EventSink::channel();
        target.set_sink(sink);

        target.dispatch_end(TransportEvent::Load, ProgressEvent::new(3, Some(3)));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::ReadyStateChange, EventKind::Load, EventKind::LoadEnd]
        );
        assert_eq!(rx.try_recv().unwrap(), TransportEvent::Load);
        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::ReadyStateChange(ReadyState::Done)
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::LoadEnd(ProgressEvent::new(3, Some(3)))
        );
    }

    #[test]
    fn test_event_target_remove_by_identity() {
        let counter = Arc::new(AtomicUsize::new(0));
        let kept = counting_listener(&counter);
        let removed = counting_listener(&counter);

        let mut target = EventTarget::new();
        target.add(EventKind::Load, kept.clone());
        target.add(EventKind::Load, removed.clone());
        target.remove(EventKind::Load, &removed);
        // Same listener, different kind: nothing to remove.
        target.remove(EventKind::Error, &kept);

        assert_eq!(target.listener_count(), 1);
        target.dispatch(TransportEvent::Load);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_target_forwards_to_sink() {
        let (sink, mut rx) = EventSink::channel();
        let mut target = EventTarget::new();
        target.set_sink(sink);

        target.dispatch(TransportEvent::ReadyStateChange(ReadyState::Done));

        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::ReadyStateChange(ReadyState::Done)
        );
    }

    #[test]
    fn test_event_sink_ignores_closed_channel() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(TransportEvent::Load);
    }

    #[test]
    fn test_progress_event_length_computable() {
        assert!(ProgressEvent::new(10, Some(20)).length_computable());
        assert!(!ProgressEvent::new(10, None).length_computable());
    }
}
