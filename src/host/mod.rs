//! The page the workbook renders into: a single-threaded cooperative event
//! loop around a live [`Dom`].
//!
//! Work resumes at exactly two points: frame callbacks queued with
//! [`FrameQueue::request_frame`], and HTTP completions delivered with
//! [`Page::deliver`]. Nothing here runs concurrently.

pub mod chart;
pub mod frame;
pub mod http;
pub mod markdown;

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::embed::error::EmbedError;
use crate::model::dom::{Dom, NodeId};
use chart::{ChartHandle, ChartRenderer};
use frame::FrameQueue;
use http::{HttpClient, HttpResponse, RequestId, TransportError};

pub type OnLoad = Box<dyn FnOnce(&mut Page, HttpResponse) -> Result<(), EmbedError>>;
pub type OnError = Box<dyn FnOnce(&mut Page, TransportError)>;

struct PendingRequest {
    url: String,
    on_load: OnLoad,
    on_error: OnError,
}

pub struct Page {
    pub dom: Dom,
    frames: FrameQueue,
    requests: HashMap<RequestId, PendingRequest>,
    next_request: u64,
    http: Rc<dyn HttpClient>,
    charts: Box<dyn ChartRenderer>,
}

impl Page {
    pub fn new(
        frames: FrameQueue,
        http: Rc<dyn HttpClient>,
        charts: Box<dyn ChartRenderer>,
    ) -> Self {
        Self {
            dom: Dom::new(),
            frames,
            requests: HashMap::new(),
            next_request: 0,
            http,
            charts,
        }
    }

    #[cfg(test)]
    pub fn frames(&self) -> &FrameQueue {
        &self.frames
    }

    /// Run one paint pass: every callback queued before it started.
    pub fn run_frame(&mut self) -> usize {
        let callbacks = self.frames.take_frame();
        let count = callbacks.len();
        for callback in callbacks {
            callback(self);
        }
        count
    }

    /// Run frames until none are queued.
    pub fn settle_frames(&mut self) {
        while !self.frames.is_empty() {
            self.run_frame();
        }
    }

    pub fn fetch(&mut self, url: &str, on_load: OnLoad, on_error: OnError) -> RequestId {
        self.next_request += 1;
        let request = RequestId(self.next_request);
        self.requests.insert(
            request,
            PendingRequest {
                url: url.to_string(),
                on_load,
                on_error,
            },
        );
        self.http.get(request, url);
        request
    }

    /// Resume the continuation waiting on `request`. Errors from the
    /// continuation are reported and contained here.
    pub fn deliver(&mut self, request: RequestId, result: Result<HttpResponse, TransportError>) {
        let Some(pending) = self.requests.remove(&request) else {
            tracing::debug!(%request, "response for unknown request ignored");
            return;
        };

        match result {
            Ok(response) => {
                tracing::debug!(%request, url = %pending.url, status = response.status, "response");
                if let Err(err) = (pending.on_load)(self, response) {
                    tracing::error!(%request, url = %pending.url, "{err}");
                }
            }
            Err(err) => (pending.on_error)(self, err),
        }
    }

    pub fn render_chart(
        &mut self,
        node: NodeId,
        series: &Value,
        config: &Value,
    ) -> Result<ChartHandle, EmbedError> {
        self.charts.render(&mut self.dom, node, series, config)
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    #[cfg(test)]
    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn is_idle(&self) -> bool {
        self.requests.is_empty() && self.frames.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn callbacks_requested_during_a_frame_wait_for_the_next() {
        let mut t = testing::page();
        let ran = Rc::new(Cell::new(0));

        let outer = ran.clone();
        t.page.frames().request_frame(Box::new(move |page: &mut Page| {
            outer.set(outer.get() + 1);
            let inner = outer.clone();
            page.frames()
                .request_frame(Box::new(move |_: &mut Page| inner.set(inner.get() + 10)));
        }));

        assert_eq!(t.page.run_frame(), 1);
        assert_eq!(ran.get(), 1);
        assert_eq!(t.page.pending_frames(), 1);

        t.page.settle_frames();
        assert_eq!(ran.get(), 11);
        assert!(t.page.is_idle());
    }

    #[test]
    fn deliver_routes_success_and_failure() {
        let mut t = testing::page();
        let loaded = Rc::new(Cell::new(false));
        let failed = Rc::new(Cell::new(false));

        let l = loaded.clone();
        let ok = t.page.fetch(
            "https://cdn/a",
            Box::new(move |_: &mut Page, response: HttpResponse| {
                assert_eq!(response.body, "{}");
                l.set(true);
                Ok(())
            }),
            Box::new(|_: &mut Page, _: TransportError| panic!("unexpected failure")),
        );
        let f = failed.clone();
        let bad = t.page.fetch(
            "https://cdn/b",
            Box::new(|_: &mut Page, _: HttpResponse| panic!("unexpected load")),
            Box::new(move |_: &mut Page, _: TransportError| f.set(true)),
        );

        assert_eq!(t.http.urls(), vec!["https://cdn/a", "https://cdn/b"]);
        assert_eq!(t.page.pending_requests(), 2);

        t.page.deliver(ok, Ok(HttpResponse::ok("{}")));
        t.page.deliver(
            bad,
            Err(TransportError::Failed {
                url: "https://cdn/b".to_string(),
                reason: "refused".to_string(),
            }),
        );

        assert!(loaded.get());
        assert!(failed.get());
        assert!(t.page.is_idle());

        // Late or duplicate deliveries are ignored.
        t.page.deliver(ok, Ok(HttpResponse::ok("{}")));
    }

    #[test]
    fn continuation_errors_are_contained() {
        let mut t = testing::page();
        let request = t.page.fetch(
            "https://cdn/c",
            Box::new(|_: &mut Page, _: HttpResponse| Err(EmbedError::Chart("boom".to_string()))),
            Box::new(|_: &mut Page, _: TransportError| {}),
        );
        t.page.deliver(request, Ok(HttpResponse::ok("")));
        assert!(t.page.is_idle());
    }
}
