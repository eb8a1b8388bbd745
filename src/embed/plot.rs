use std::rc::Rc;

use crate::host::Page;
use crate::host::chart::ChartHandle;
use crate::host::frame::FrameQueue;
use crate::host::http::{HttpResponse, TransportError};
use crate::model::dom::{Listener, NodeId};

use super::artifact::ArtifactRegistry;
use super::deferred::{ContentSlot, DeferredContent, DeferredElement, Placement};
use super::error::EmbedError;
use super::id::IdGenerator;

/// Fetches chart data from the marker URL and draws it once it arrives.
/// The payload goes through the artifact processors first; JSON payloads
/// carry the data series in `file` and are the chart configuration whole.
pub struct PlotContent {
    url: String,
    artifacts: Rc<ArtifactRegistry>,
}

impl PlotContent {
    pub fn new(url: impl Into<String>, artifacts: Rc<ArtifactRegistry>) -> Self {
        Self {
            url: url.into(),
            artifacts,
        }
    }

    pub fn place(
        url: impl Into<String>,
        artifacts: &Rc<ArtifactRegistry>,
        ids: &IdGenerator,
        frames: &FrameQueue,
    ) -> Placement {
        DeferredElement::place(Self::new(url, artifacts.clone()), ids, frames)
    }

    fn on_load(
        self,
        node: NodeId,
        page: &mut Page,
        response: HttpResponse,
    ) -> Result<ChartHandle, EmbedError> {
        // Keep chart interaction away from the host's click handling.
        page.dom.add_listener(node, Listener::StopClickPropagation);

        let bytes = response.body.len();
        let (series, config) = self
            .artifacts
            .process(&self.url, response.body)?
            .into_chart_input();
        let chart = page.render_chart(node, &series, &config)?;

        tracing::debug!(url = %self.url, bytes, ?chart, "plot rendered");
        Ok(chart)
    }
}

impl DeferredContent for PlotContent {
    fn kind(&self) -> &'static str {
        "plot"
    }

    fn source_url(&self) -> &str {
        &self.url
    }

    fn populate(self, node: NodeId, page: &mut Page, slot: ContentSlot) {
        let url = self.url.clone();
        let failure = slot.clone();

        page.fetch(
            &url,
            Box::new(move |page: &mut Page, response: HttpResponse| {
                match self.on_load(node, page, response) {
                    Ok(chart) => {
                        slot.ready(Some(chart));
                        Ok(())
                    }
                    Err(err) => {
                        slot.fail(err.to_string());
                        Err(err)
                    }
                }
            }),
            Box::new(move |_page: &mut Page, err: TransportError| {
                tracing::warn!("plot data unavailable: {err}");
                failure.fail(err.to_string());
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::embed::deferred::{BindState, ContentState};
    use crate::host::chart::testing::ChartCall;
    use crate::host::testing::{self, TestPage};

    fn place(t: &TestPage, url: &str) -> Placement {
        let artifacts = Rc::new(ArtifactRegistry::default());
        PlotContent::place(url, &artifacts, &IdGenerator::default(), t.page.frames())
    }

    fn bound_plot(t: &mut TestPage, url: &str) -> (Placement, NodeId) {
        let placement = place(t, url);
        let body = t.page.dom.body();
        let node = t.page.dom.mount_fragment(body, &placement.markup);
        t.page.run_frame();
        (placement, node)
    }

    #[test]
    fn bind_issues_one_get_to_the_marker_url() {
        let mut t = testing::page();
        let url = "https://cdn/x?WORKBOOK_PLOT=1";
        let (placement, node) = bound_plot(&mut t, url);

        assert_eq!(t.http.urls(), vec![url]);
        assert_eq!(
            placement.binding.state(),
            BindState::Bound {
                node,
                content: ContentState::Loading
            }
        );
        assert!(t.charts.calls.borrow().is_empty());
    }

    #[test]
    fn successful_payload_invokes_renderer_with_file_series_and_full_config() {
        let mut t = testing::page();
        let (placement, node) = bound_plot(&mut t, "https://cdn/p?WORKBOOK_PLOT");
        let request = t.http.last_request().unwrap();

        t.page.deliver(
            request,
            Ok(HttpResponse::ok(r#"{"file": [[0,1],[1,2]], "title": "t"}"#)),
        );

        assert_eq!(
            *t.charts.calls.borrow(),
            vec![ChartCall {
                node,
                series: json!([[0, 1], [1, 2]]),
                config: json!({"file": [[0, 1], [1, 2]], "title": "t"}),
            }]
        );
        assert_eq!(t.page.dom.listeners(node), &[Listener::StopClickPropagation]);
        assert_eq!(
            placement.binding.content(),
            Some(ContentState::Ready(Some(ChartHandle(1))))
        );
    }

    #[test]
    fn flat_series_is_passed_through() {
        let mut t = testing::page();
        let (_placement, _node) = bound_plot(&mut t, "https://cdn/x?WORKBOOK_PLOT=1");
        let request = t.http.last_request().unwrap();

        t.page.deliver(request, Ok(HttpResponse::ok(r#"{"file":[1,2,3]}"#)));

        let calls = t.charts.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].series, json!([1, 2, 3]));
    }

    #[test]
    fn malformed_payload_skips_renderer_and_spares_other_plots() {
        let mut t = testing::page();
        let (broken, _) = bound_plot(&mut t, "https://cdn/bad?WORKBOOK_PLOT");
        let broken_request = t.http.last_request().unwrap();
        let (healthy, _) = bound_plot(&mut t, "https://cdn/good?WORKBOOK_PLOT");
        let healthy_request = t.http.last_request().unwrap();

        t.page.deliver(broken_request, Ok(HttpResponse::ok("not json")));
        assert!(t.charts.calls.borrow().is_empty());
        assert!(matches!(
            broken.binding.content(),
            Some(ContentState::Failed(reason)) if reason.contains("malformed plot payload")
        ));

        t.page.deliver(healthy_request, Ok(HttpResponse::ok(r#"{"file":[1]}"#)));
        assert_eq!(t.charts.calls.borrow().len(), 1);
        assert_eq!(
            healthy.binding.content(),
            Some(ContentState::Ready(Some(ChartHandle(1))))
        );
    }

    #[test]
    fn transport_failure_leaves_node_empty_and_marks_failure() {
        let mut t = testing::page();
        let (placement, node) = bound_plot(&mut t, "https://cdn/gone?WORKBOOK_PLOT");
        let request = t.http.last_request().unwrap();

        t.page.deliver(
            request,
            Err(TransportError::Status {
                url: "https://cdn/gone?WORKBOOK_PLOT".to_string(),
                status: 404,
            }),
        );

        assert!(t.page.dom.children(node).is_empty());
        assert!(t.page.dom.listeners(node).is_empty());
        assert!(t.charts.calls.borrow().is_empty());
        assert!(matches!(
            placement.binding.content(),
            Some(ContentState::Failed(reason)) if reason.contains("404")
        ));
        assert!(t.page.is_idle());
    }

    #[test]
    fn unmounted_plot_never_fetches() {
        let mut t = testing::page();
        let placement = place(&t, "https://cdn/p?WORKBOOK_PLOT");
        t.page.run_frame();
        assert_eq!(placement.binding.state(), BindState::Abandoned);
        assert!(t.http.urls().is_empty());
    }

    #[test]
    fn csv_payload_is_drawn_as_a_table() {
        let mut t = testing::page();
        let (placement, node) = bound_plot(&mut t, "https://cdn/runs/loss.csv?WORKBOOK_PLOT");
        let request = t.http.last_request().unwrap();

        t.page.deliver(request, Ok(HttpResponse::ok("step,loss\n0,nil\n1,0.5")));

        assert_eq!(
            *t.charts.calls.borrow(),
            vec![ChartCall {
                node,
                series: json!("step,loss\n0,\n1,0.5"),
                config: json!({}),
            }]
        );
        assert_eq!(
            placement.binding.content(),
            Some(ContentState::Ready(Some(ChartHandle(1))))
        );
    }
}
