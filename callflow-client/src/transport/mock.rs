//! Scripted in-memory transport for tests.
//!
//! [`MockHandle`] is the test's view of one call: it records everything the
//! lifecycle asked of the transport and lets the test emit events in any
//! order. [`MockConnector`] hands out one handle per attempt and can script
//! what each call does once it is sent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue, Method};

use callflow_core::Body;

use super::{
    Connect, EventKind, EventSink, EventTarget, Listener, ProgressEvent, ReadyState,
    ResponseType, Transport, TransportEvent,
};
use crate::error::TransportError;
use crate::response::ResponseData;

/// What a scripted call does when it is sent.
#[derive(Clone, Debug)]
pub(crate) enum Reply {
    /// Complete with a response: `readystatechange(4)`, `load`, `loadend`.
    Respond {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static str,
    },
    /// Fail: `readystatechange(4)`, `error`, `loadend`.
    Fail(Option<TransportError>),
    /// Native timeout: `readystatechange(4)`, `timeout`, `loadend`.
    TimeOut,
    /// Reject `send` synchronously.
    Reject(TransportError),
    /// Accept the call and never report anything.
    Hang,
}

impl Reply {
    pub(crate) fn ok(body: &'static str) -> Self {
        Reply::Respond {
            status: 200,
            headers: vec![("content-type", "application/json")],
            body,
        }
    }

    pub(crate) fn redirect(status: u16, location: &'static str) -> Self {
        Reply::Respond {
            status,
            headers: vec![("location", location)],
            body: "",
        }
    }
}

fn status_text(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

#[derive(Default)]
pub(crate) struct MockState {
    opened: Option<(Method, String)>,
    with_credentials: bool,
    timeout: Option<Duration>,
    response_type: Option<ResponseType>,
    request_headers: HeaderMap,
    body: Option<Body>,
    sends: usize,
    aborts: usize,
    ready_state: ReadyState,
    status: u16,
    status_text: String,
    text: Option<String>,
    value: Option<ResponseData>,
    response_headers: Vec<(String, String)>,
    target: EventTarget,
    reply: Option<Reply>,
}

/// Shared view of one mock call.
#[derive(Clone, Default)]
pub(crate) struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A transport driving this handle.
    pub(crate) fn transport(&self) -> MockTransport {
        MockTransport(self.clone())
    }

    pub(crate) fn set_reply(&self, reply: Reply) {
        self.state().reply = Some(reply);
    }

    pub(crate) fn set_response(&self, status: u16, status_text: &str, text: &str) {
        let mut state = self.state();
        state.status = status;
        state.status_text = status_text.to_string();
        state.text = Some(text.to_string());
    }

    pub(crate) fn set_response_value(&self, value: ResponseData) {
        self.state().value = Some(value);
    }

    pub(crate) fn set_response_header(&self, name: &str, value: &str) {
        self.state()
            .response_headers
            .push((name.to_string(), value.to_string()));
    }

    /// Dispatch an event to listeners and the lifecycle, outside the lock.
    pub(crate) fn emit(&self, event: TransportEvent) {
        let target = {
            let mut state = self.state();
            if let TransportEvent::ReadyStateChange(ready_state) = event {
                state.ready_state = ready_state;
            }
            state.target.clone()
        };
        target.dispatch(event);
    }

    /// Emit the events of a completed call.
    pub(crate) fn complete(&self) {
        self.emit(TransportEvent::ReadyStateChange(ReadyState::Done));
        self.emit(TransportEvent::Load);
        self.emit(TransportEvent::LoadEnd(ProgressEvent::default()));
    }

    pub(crate) fn opened(&self) -> Option<(Method, String)> {
        self.state().opened.clone()
    }

    pub(crate) fn with_credentials(&self) -> bool {
        self.state().with_credentials
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.state().timeout
    }

    pub(crate) fn response_type(&self) -> Option<ResponseType> {
        self.state().response_type
    }

    pub(crate) fn request_header(&self, name: &str) -> Option<String> {
        self.state()
            .request_headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub(crate) fn body(&self) -> Option<Body> {
        self.state().body.clone()
    }

    pub(crate) fn send_count(&self) -> usize {
        self.state().sends
    }

    pub(crate) fn abort_count(&self) -> usize {
        self.state().aborts
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.state().target.listener_count()
    }

    fn run_reply(&self, reply: Reply) {
        match reply {
            Reply::Respond {
                status,
                headers,
                body,
            } => {
                self.set_response(status, status_text(status), body);
                for (name, value) in headers {
                    self.set_response_header(name, value);
                }
                self.emit(TransportEvent::LoadStart(ProgressEvent::default()));
                self.complete();
            }
            Reply::Fail(err) => {
                self.emit(TransportEvent::ReadyStateChange(ReadyState::Done));
                self.emit(TransportEvent::Error(err));
                self.emit(TransportEvent::LoadEnd(ProgressEvent::default()));
            }
            Reply::TimeOut => {
                self.emit(TransportEvent::ReadyStateChange(ReadyState::Done));
                self.emit(TransportEvent::Timeout(Some(TransportError::TimedOut)));
                self.emit(TransportEvent::LoadEnd(ProgressEvent::default()));
            }
            Reply::Reject(_) | Reply::Hang => {}
        }
    }
}

/// [`Transport`] over a [`MockHandle`].
pub(crate) struct MockTransport(MockHandle);

impl Transport for MockTransport {
    fn open(&mut self, method: &Method, url: &str) -> Result<(), TransportError> {
        let mut state = self.0.state();
        state.opened = Some((method.clone(), url.to_string()));
        state.ready_state = ReadyState::Opened;
        Ok(())
    }

    fn set_with_credentials(&mut self, enabled: bool) -> Result<(), TransportError> {
        let mut state = self.0.state();
        if state.opened.is_none() {
            return Err(TransportError::InvalidState("not opened".into()));
        }
        state.with_credentials = enabled;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.0.state().timeout = Some(timeout);
    }

    fn set_response_type(&mut self, response_type: ResponseType) {
        self.0.state().response_type = Some(response_type);
    }

    fn set_request_header(
        &mut self,
        name: &HeaderName,
        value: &HeaderValue,
    ) -> Result<(), TransportError> {
        let mut state = self.0.state();
        if state.opened.is_none() {
            return Err(TransportError::InvalidState("not opened".into()));
        }
        state.request_headers.append(name.clone(), value.clone());
        Ok(())
    }

    fn set_event_sink(&mut self, sink: EventSink) {
        self.0.state().target.set_sink(sink);
    }

    fn add_event_listener(&mut self, kind: EventKind, listener: Listener) {
        self.0.state().target.add(kind, listener);
    }

    fn remove_event_listener(&mut self, kind: EventKind, listener: &Listener) {
        self.0.state().target.remove(kind, listener);
    }

    fn send(&mut self, body: Option<Body>) -> Result<(), TransportError> {
        let reply = {
            let mut state = self.0.state();
            state.sends += 1;
            state.body = body;
            state.reply.take()
        };
        match reply {
            Some(Reply::Reject(err)) => Err(err),
            Some(reply) => {
                self.0.run_reply(reply);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn abort(&mut self) {
        let in_flight = {
            let mut state = self.0.state();
            state.aborts += 1;
            state.sends > 0 && state.ready_state != ReadyState::Done
        };
        if in_flight {
            self.0.emit(TransportEvent::ReadyStateChange(ReadyState::Done));
            self.0.emit(TransportEvent::Abort(None));
            self.0.emit(TransportEvent::LoadEnd(ProgressEvent::default()));
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.0.state().ready_state
    }

    fn status(&self) -> u16 {
        self.0.state().status
    }

    fn status_text(&self) -> String {
        self.0.state().status_text.clone()
    }

    fn response_text(&self) -> Option<String> {
        self.0.state().text.clone()
    }

    fn response(&self) -> Option<ResponseData> {
        self.0.state().value.clone()
    }

    fn response_header(&self, name: &str) -> Option<String> {
        self.0
            .state()
            .response_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }
}

#[derive(Default)]
struct ConnectorState {
    replies: VecDeque<Reply>,
    handles: Vec<MockHandle>,
}

/// Hands out scripted mock calls, one per attempt.
///
/// Attempts beyond the scripted replies hang.
#[derive(Clone, Default)]
pub(crate) struct MockConnector(Arc<Mutex<ConnectorState>>);

impl MockConnector {
    pub(crate) fn new<I: IntoIterator<Item = Reply>>(replies: I) -> Self {
        let state = ConnectorState {
            replies: replies.into_iter().collect(),
            handles: Vec::new(),
        };
        Self(Arc::new(Mutex::new(state)))
    }

    fn state(&self) -> MutexGuard<'_, ConnectorState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle for the `index`th attempt.
    pub(crate) fn handle(&self, index: usize) -> MockHandle {
        self.state().handles[index].clone()
    }

    /// Number of attempts made so far.
    pub(crate) fn count(&self) -> usize {
        self.state().handles.len()
    }
}

impl Connect for MockConnector {
    fn connect(&self) -> Box<dyn Transport> {
        let handle = MockHandle::default();
        let mut state = self.state();
        if let Some(reply) = state.replies.pop_front() {
            handle.set_reply(reply);
        }
        state.handles.push(handle.clone());
        Box::new(handle.transport())
    }
}
