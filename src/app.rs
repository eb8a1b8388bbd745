use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc;

use anyhow::{Context, Result};
use ignore::WalkBuilder;

use crate::embed::deferred::ContentState;
use crate::embed::id::IdGenerator;
use crate::embed::{BindingSummary, Installation, Interceptor};
use crate::host::Page;
use crate::host::chart::{ChartRenderer, DygraphRenderer};
use crate::host::frame::FrameQueue;
use crate::host::http::{HttpClient, HttpResponse, RequestId, TransportError, UreqClient};
use crate::host::markdown::MarkdownRenderer;
use crate::model::config::AppConfig;
use crate::model::markup::Attrs;
use crate::msg::Msg;

pub type ChartFactory = Box<dyn Fn() -> Box<dyn ChartRenderer>>;

/// A path given on the command line, and where its output goes.
#[derive(Debug, Clone)]
struct RenderRoot {
    input: PathBuf,
    output: PathBuf,
    is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RenderJob {
    input: PathBuf,
    output: PathBuf,
}

struct ActiveRender {
    job: RenderJob,
    page: Page,
}

pub struct App {
    pub config: AppConfig,
    renderer: MarkdownRenderer,
    installation: Installation,
    frames: FrameQueue,
    http: Rc<dyn HttpClient>,
    charts: ChartFactory,
    roots: Vec<RenderRoot>,
    queue: VecDeque<RenderJob>,
    active: Option<ActiveRender>,
    written: Vec<PathBuf>,
    failures: usize,
    pub should_quit: bool,
}

impl App {
    pub fn new(config: AppConfig, event_tx: mpsc::Sender<Msg>) -> Result<Self> {
        let http = Rc::new(UreqClient::new(config.http_timeout(), event_tx));
        Self::with_services(
            config,
            http,
            Box::new(|| Box::new(DygraphRenderer::default()) as Box<dyn ChartRenderer>),
        )
    }

    pub fn with_services(
        config: AppConfig,
        http: Rc<dyn HttpClient>,
        charts: ChartFactory,
    ) -> Result<Self> {
        let frames = FrameQueue::new();
        let ids = IdGenerator::new(&config.placeholder.prefix, config.placeholder.suffix_len);
        let interceptor = Interceptor::new(&config.markers, ids, frames.clone())?;

        let mut renderer = MarkdownRenderer::new();
        let installation =
            Installation::install(&mut renderer, interceptor, &config.charting.library_url)?;

        Ok(Self {
            config,
            renderer,
            installation,
            frames,
            http,
            charts,
            roots: Vec::new(),
            queue: VecDeque::new(),
            active: None,
            written: Vec::new(),
            failures: 0,
            should_quit: false,
        })
    }

    // ── Update ───────────────────────────────────────────────────

    pub fn update(&mut self, msg: Msg) {
        match msg {
            Msg::RenderPath(path) => self.add_root(path),
            Msg::FileChanged(path) => self.handle_file_changed(path),
            Msg::HttpResponse { request, result } => self.handle_response(request, result),
            Msg::Quit => self.should_quit = true,
        }
        self.pump();
    }

    /// Nothing rendering and nothing queued.
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.queue.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn take_written(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.written)
    }

    fn add_root(&mut self, path: PathBuf) {
        let input = match std::fs::canonicalize(&path) {
            Ok(input) => input,
            Err(err) => {
                tracing::error!("cannot render {}: {err}", path.display());
                self.failures += 1;
                return;
            }
        };

        let is_dir = input.is_dir();
        let output = match (self.config.output_dir(), is_dir) {
            (Some(dir), _) => dir,
            (None, true) => input.clone(),
            (None, false) => input
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
        };
        let root = RenderRoot {
            input,
            output,
            is_dir,
        };

        let files = if root.is_dir {
            markdown_files(&root.input)
        } else {
            vec![root.input.clone()]
        };
        if files.is_empty() {
            tracing::warn!("no markdown files under {}", root.input.display());
        }

        self.roots.push(root);
        for file in files {
            self.enqueue(&file);
        }
    }

    fn handle_file_changed(&mut self, path: PathBuf) {
        if !is_markdown(&path) || !path.is_file() {
            return;
        }
        let path = std::fs::canonicalize(&path).unwrap_or(path);
        tracing::debug!("changed: {}", path.display());
        self.enqueue(&path);
    }

    fn handle_response(
        &mut self,
        request: RequestId,
        result: Result<HttpResponse, TransportError>,
    ) {
        let Some(active) = self.active.as_mut() else {
            tracing::debug!(%request, "response arrived with no active render");
            return;
        };
        active.page.deliver(request, result);
        active.page.settle_frames();
    }

    fn enqueue(&mut self, input: &Path) {
        let Some(job) = self.job_for(input) else {
            return;
        };
        if !self.queue.contains(&job) {
            self.queue.push_back(job);
        }
    }

    fn job_for(&self, input: &Path) -> Option<RenderJob> {
        let root = self.roots.iter().rev().find(|root| {
            if root.is_dir {
                input.starts_with(&root.input)
            } else {
                input == root.input
            }
        })?;

        let relative = if root.is_dir {
            input.strip_prefix(&root.input).ok()?.to_path_buf()
        } else {
            PathBuf::from(input.file_name()?)
        };

        Some(RenderJob {
            input: input.to_path_buf(),
            output: root.output.join(relative).with_extension("html"),
        })
    }

    /// Finish whatever has gone idle and start queued work.
    fn pump(&mut self) {
        loop {
            if let Some(active) = &self.active {
                if !active.page.is_idle() {
                    return;
                }
                if let Some(done) = self.active.take() {
                    self.finish(done);
                }
            }

            let Some(job) = self.queue.pop_front() else {
                return;
            };

            match self.start(job.clone()) {
                Ok(active) => self.active = Some(active),
                Err(err) => {
                    tracing::error!("render of {} failed: {err:#}", job.input.display());
                    self.failures += 1;
                }
            }
        }
    }

    fn start(&mut self, job: RenderJob) -> Result<ActiveRender> {
        let source = std::fs::read_to_string(&job.input)
            .with_context(|| format!("reading {}", job.input.display()))?;

        let mut page = Page::new(self.frames.clone(), self.http.clone(), (self.charts)());
        self.write_head(&mut page, &job.input);
        self.installation.load_chart_library(&mut page);

        let document = self.renderer.render(&source);
        let body = page.dom.body();
        page.dom.mount(body, &document);
        page.settle_frames();

        tracing::info!(
            input = %job.input.display(),
            embeds = document.elements().count(),
            pending_requests = page.pending_requests(),
            "rendered"
        );
        Ok(ActiveRender { job, page })
    }

    fn finish(&mut self, active: ActiveRender) {
        let ActiveRender { job, page } = active;
        let bindings = self.installation.bindings().drain();
        for binding in &bindings {
            if let Some(ContentState::Failed(reason)) = binding.content() {
                tracing::warn!(
                    id = %binding.id(),
                    kind = binding.kind(),
                    url = binding.source_url(),
                    %reason,
                    "embed failed"
                );
            }
        }
        let summary = BindingSummary::of(&bindings);

        let result = (|| -> Result<()> {
            if let Some(parent) = job.output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&job.output, page.dom.to_html())?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                tracing::info!(
                    output = %job.output.display(),
                    ready = summary.ready,
                    failed = summary.failed,
                    abandoned = summary.abandoned,
                    unsettled = summary.loading + summary.pending,
                    "wrote page"
                );
                self.written.push(job.output);
            }
            Err(err) => {
                tracing::error!("write of {} failed: {err}", job.output.display());
                self.failures += 1;
            }
        }
    }

    fn write_head(&self, page: &mut Page, input: &Path) {
        let head = page.dom.head();
        let mut charset = Attrs::new();
        charset.push(("charset".to_string(), "utf-8".to_string()));
        page.dom.append_element(head, "meta", charset);

        let title = page.dom.append_element(head, "title", Attrs::new());
        let text = match input.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => format!("{} - {stem}", self.config.general.page_title),
            None => self.config.general.page_title.clone(),
        };
        page.dom.append_text(title, text);
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown"))
}

fn markdown_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkBuilder::new(dir)
        .hidden(false)
        .build()
        .flatten()
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            let path = entry.path();
            if metadata.is_file() && is_markdown(path) {
                Some(path.to_path_buf())
            } else {
                None
            }
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::http::testing::RecordingHttp;

    struct Harness {
        app: App,
        http: RecordingHttp,
        dir: tempfile::TempDir,
    }

    fn harness(overrides: &str) -> Harness {
        let config = AppConfig::from_overrides(overrides).unwrap();
        let http = RecordingHttp::default();
        let app = App::with_services(
            config,
            Rc::new(http.clone()),
            Box::new(|| Box::new(DygraphRenderer::default()) as Box<dyn ChartRenderer>),
        )
        .unwrap();
        Harness {
            app,
            http,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn image_marker_renders_img_inside_placeholder() {
        let mut h = harness("");
        let url = "https://cdn/x?WORKBOOK_IMAGE=1";
        let input = write(h.dir.path(), "note.md", &format!("# Run 4\n\n[loss]({url})\n"));

        h.app.update(Msg::RenderPath(input));

        assert!(h.app.is_idle());
        let written = h.app.take_written();
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with("note.html"));

        let html = std::fs::read_to_string(&written[0]).unwrap();
        assert!(html.contains("<title>Lab Workbook - note</title>"));
        let library = "//cdnjs.cloudflare.com/ajax/libs/dygraph/1.1.1/dygraph-combined.js";
        assert!(html.contains(&format!(r#"<script src="{library}"></script>"#)));
        assert!(html.contains(r#"<div id="workbook-"#));
        assert!(html.contains(r#"<img src="https://cdn/x?WORKBOOK_IMAGE=1">"#));
        assert!(!html.contains("<a href"));
        assert!(h.http.urls().is_empty());
    }

    #[test]
    fn plot_page_is_written_after_response() {
        let mut h = harness("");
        let url = "https://cdn/x?WORKBOOK_PLOT=1";
        let input = write(h.dir.path(), "plot.md", &format!("[curve]({url})\n"));

        h.app.update(Msg::RenderPath(input));
        assert!(!h.app.is_idle());
        assert!(h.app.take_written().is_empty());
        assert_eq!(h.http.urls(), vec![url]);

        let request = h.http.last_request().unwrap();
        h.app.update(Msg::HttpResponse {
            request,
            result: Ok(HttpResponse::ok(r#"{"file":[1,2,3],"title":"t"}"#)),
        });

        assert!(h.app.is_idle());
        let written = h.app.take_written();
        let html = std::fs::read_to_string(&written[0]).unwrap();
        assert!(html.contains(r#"onclick="event.stopPropagation()""#));
        assert!(html.contains("new Dygraph(document.getElementById(\"workbook-"));
        assert!(html.contains("[1,2,3]"));
    }

    #[test]
    fn failed_plot_fetch_still_writes_the_page() {
        let mut h = harness("");
        let input = write(h.dir.path(), "p.md", "[c](https://cdn/gone?WORKBOOK_PLOT)\n");

        h.app.update(Msg::RenderPath(input));
        let request = h.http.last_request().unwrap();
        h.app.update(Msg::HttpResponse {
            request,
            result: Err(TransportError::Failed {
                url: "https://cdn/gone?WORKBOOK_PLOT".to_string(),
                reason: "connection refused".to_string(),
            }),
        });

        assert!(h.app.is_idle());
        assert_eq!(h.app.failures(), 0);
        let html = std::fs::read_to_string(&h.app.take_written()[0]).unwrap();
        assert!(!html.contains("new Dygraph"));
    }

    #[test]
    fn plain_links_render_as_anchors() {
        let mut h = harness("");
        let input = write(h.dir.path(), "plain.md", "[home](https://example.com/plain)\n");

        h.app.update(Msg::RenderPath(input));

        let html = std::fs::read_to_string(&h.app.take_written()[0]).unwrap();
        assert!(html.contains(r#"<p><a href="https://example.com/plain">home</a></p>"#));
    }

    #[test]
    fn directory_input_mirrors_tree_into_output_dir() {
        let out = tempfile::tempdir().unwrap();
        let out_path = out.path().to_string_lossy().replace('\\', "/");
        let mut h = harness(&format!("[general]\noutput_dir = \"{out_path}\"\n"));
        write(h.dir.path(), "a.md", "# a\n");
        write(h.dir.path(), "runs/b.md", "# b\n");
        write(h.dir.path(), "runs/notes.txt", "skip me\n");

        h.app.update(Msg::RenderPath(h.dir.path().to_path_buf()));

        let mut written = h.app.take_written();
        written.sort();
        let out_root = std::fs::canonicalize(out.path()).unwrap_or(out.path().to_path_buf());
        let rel: Vec<_> = written
            .iter()
            .map(|p| {
                let p = std::fs::canonicalize(p).unwrap();
                p.strip_prefix(&out_root).unwrap().to_path_buf()
            })
            .collect();
        assert_eq!(rel, vec![PathBuf::from("a.html"), PathBuf::from("runs/b.html")]);
    }

    #[test]
    fn file_changes_under_a_root_rerender() {
        let mut h = harness("");
        let input = write(h.dir.path(), "live.md", "one\n");
        h.app.update(Msg::RenderPath(input.clone()));
        assert_eq!(h.app.take_written().len(), 1);

        std::fs::write(&input, "[img](https://cdn/i?WORKBOOK_IMAGE)\n").unwrap();
        h.app.update(Msg::FileChanged(input.clone()));
        let written = h.app.take_written();
        assert_eq!(written.len(), 1);
        assert!(std::fs::read_to_string(&written[0]).unwrap().contains("<img"));

        // Unrelated files are ignored.
        let other = write(h.dir.path(), "other.txt", "x");
        h.app.update(Msg::FileChanged(other));
        assert!(h.app.take_written().is_empty());
    }

    #[test]
    fn missing_input_counts_as_failure() {
        let mut h = harness("");
        h.app.update(Msg::RenderPath(h.dir.path().join("absent.md")));
        assert!(h.app.is_idle());
        assert_eq!(h.app.failures(), 1);
    }

    #[test]
    fn quit_sets_flag() {
        let mut h = harness("");
        h.app.update(Msg::Quit);
        assert!(h.app.should_quit);
    }
}
