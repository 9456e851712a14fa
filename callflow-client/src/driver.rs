//! Event-driven state machine of one attempt.
//!
//! The driver is the only place a running lifecycle is ended. It waits on,
//! in priority order, transport events, the readystate fallback and the
//! timeout fallback. Whichever terminal signal is seen first decides the
//! outcome, unless an abort was requested before it; later signals are
//! dropped.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Sleep, sleep};

use callflow_core::EndStatus;

use crate::builder::defaults;
use crate::client::Client;
use crate::error::{RequestError, TransportError, classify};
use crate::lifecycle::Lifecycle;
use crate::redirect;
use crate::request::Request;
use crate::response::Response;
use crate::transport::{ReadyState, TransportEvent};

type Timer = Option<Pin<Box<Sleep>>>;

async fn elapsed(timer: &mut Timer) {
    match timer {
        Some(delay) => delay.as_mut().await,
        None => pending().await,
    }
}

pub(crate) struct Driver {
    client: Client,
    lifecycle: Arc<Lifecycle>,
    settle: Option<oneshot::Sender<Response>>,
    grace: Timer,
    child: Option<Request>,
}

impl Driver {
    pub(crate) fn new(
        client: Client,
        lifecycle: Arc<Lifecycle>,
        settle: oneshot::Sender<Response>,
    ) -> Self {
        Self {
            client,
            lifecycle,
            settle: Some(settle),
            grace: None,
            child: None,
        }
    }

    pub(crate) async fn run(mut self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let mut deadline: Timer = self
            .lifecycle
            .options()
            .get_timeout()
            .map(|timeout| Box::pin(sleep(timeout)));

        while !self.lifecycle.is_done() {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => self.fail(EndStatus::Error, "request failed", None),
                },
                () = elapsed(&mut self.grace) => {
                    self.end(EndStatus::Success, None);
                }
                () = elapsed(&mut deadline) => {
                    self.fail(EndStatus::Timeout, "request timed out", None);
                }
            }
        }

        let mut dropped = 0usize;
        while events.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, "dropped events after termination");
        }
        drop(events);

        if let Some(child) = self.child.take() {
            let response = child.response().await;
            if let Some(tx) = self.settle.take() {
                let _ = tx.send(response);
            }
        }
    }

    fn handle(&mut self, event: TransportEvent) {
        tracing::trace!(event = %event.kind(), "transport event");

        let options = self.lifecycle.options();
        match event {
            TransportEvent::LoadStart(progress)
            | TransportEvent::Progress(progress)
            | TransportEvent::LoadEnd(progress) => {
                if let Some(callback) = options.progress_callback() {
                    callback(&progress);
                }
            }
            TransportEvent::UploadProgress(progress) => {
                if let Some(callback) = options.upload_progress_callback() {
                    callback(&progress);
                }
            }
            TransportEvent::ReadyStateChange(ReadyState::Done) => {
                if self.grace.is_none() {
                    self.grace = Some(Box::pin(sleep(defaults::READY_STATE_GRACE)));
                }
            }
            TransportEvent::ReadyStateChange(_) => {}
            TransportEvent::Load => self.on_load(),
            TransportEvent::Error(err) => self.fail(EndStatus::Error, "request failed", err),
            TransportEvent::Abort(err) => self.fail(EndStatus::Abort, "request aborted", err),
            TransportEvent::Timeout(err) => {
                self.fail(EndStatus::Timeout, "request timed out", err)
            }
        }
    }

    fn on_load(&mut self) {
        if self.lifecycle.is_aborted() {
            self.fail(EndStatus::Abort, "request aborted", None);
            return;
        }

        let Some(next) = redirect::plan(&self.lifecycle) else {
            self.end(EndStatus::Success, None);
            return;
        };

        if let Some(decide) = self.lifecycle.options().redirect_callback().cloned() {
            if !decide(&next, self.lifecycle.as_ref()) {
                tracing::debug!(to = %next.url(), "redirect vetoed");
                self.end(EndStatus::Success, None);
                return;
            }
        }

        tracing::debug!(
            from = %self.lifecycle.options().url(),
            to = %next.url(),
            "following redirect"
        );

        {
            let mut transport = self.lifecycle.transport();
            for (kind, listener) in self.lifecycle.options().listeners() {
                transport.remove_event_listener(*kind, listener);
            }
        }

        let child = self.client.request(next);
        self.lifecycle.set_redirect(child.lifecycle().clone());
        if self.lifecycle.is_aborted() {
            child.abort();
        }
        self.child = Some(child);
        self.end(EndStatus::Redirect, None);
    }

    fn fail(&mut self, status: EndStatus, fallback: &str, err: Option<TransportError>) {
        let cause = self.classify(fallback, err);
        self.end(status, Some(cause));
    }

    /// End the lifecycle. An abort requested before termination overrides
    /// any other settling status.
    fn end(&mut self, status: EndStatus, cause: Option<RequestError>) -> bool {
        let (status, cause) =
            if status.settles() && status != EndStatus::Abort && self.lifecycle.is_aborted() {
                (EndStatus::Abort, Some(self.classify("request aborted", None)))
            } else {
                (status, cause)
            };
        self.lifecycle.end(status, cause, &mut self.settle)
    }

    fn classify(&self, fallback: &str, err: Option<TransportError>) -> RequestError {
        classify(
            &**self.lifecycle.transport(),
            fallback,
            err.map(RequestError::from),
        )
    }
}
