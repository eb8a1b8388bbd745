//! Markdown to HTML with a replaceable link-rendering extension point.
//!
//! Every link in the source is handed to the current [`LinkHandler`]. Raw HTML
//! from the handler is spliced into the output verbatim; structured elements
//! are kept as separate [`MarkupFragment`]s so the page can address them once
//! mounted.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd, html};
use uuid::Uuid;

use crate::model::markup::{MarkupFragment, RenderedDocument, escape_attr};

/// A parsed link token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub title: String,
    /// Rendered inner HTML.
    pub text: String,
}

pub type LinkHandler = Box<dyn Fn(&Link) -> MarkupFragment>;

/// The stock link renderer: a plain anchor.
pub fn default_link_html(link: &Link) -> MarkupFragment {
    let mut out = format!("<a href=\"{}\"", escape_attr(&link.url));
    if !link.title.is_empty() {
        out.push_str(&format!(" title=\"{}\"", escape_attr(&link.title)));
    }
    out.push('>');
    out.push_str(&link.text);
    out.push_str("</a>");
    MarkupFragment::Html(out)
}

const SLOT_OPEN: &str = "\u{1}wb-slot-";
const SLOT_CLOSE: char = '\u{2}';

pub struct MarkdownRenderer {
    options: Options,
    link: LinkHandler,
    wrappers: Vec<&'static str>,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_TASKLISTS);

        Self {
            options,
            link: Box::new(default_link_html),
            wrappers: Vec::new(),
        }
    }

    /// Replace the link handler with `wrap(current)`. A given wrapper name
    /// can only be applied once; returns `false` if it already was.
    pub fn wrap_link_handler(
        &mut self,
        name: &'static str,
        wrap: impl FnOnce(LinkHandler) -> LinkHandler,
    ) -> bool {
        if self.wrappers.contains(&name) {
            return false;
        }
        let current = std::mem::replace(&mut self.link, Box::new(default_link_html));
        self.link = wrap(current);
        self.wrappers.push(name);
        true
    }

    pub fn is_wrapped_by(&self, name: &str) -> bool {
        self.wrappers.iter().any(|w| *w == name)
    }

    pub fn render_link(&self, link: &Link) -> MarkupFragment {
        (self.link)(link)
    }

    pub fn render(&self, source: &str) -> RenderedDocument {
        let parser = Parser::new_ext(source, self.options);
        let slots = SlotMarker::new();
        let mut events: Vec<Event<'_>> = Vec::new();
        let mut elements: Vec<MarkupFragment> = Vec::new();
        let mut pending: Option<PendingLink<'_>> = None;
        // Image descriptions render as alt text, so links inside them stay plain.
        let mut image_depth = 0usize;

        for event in parser {
            match pending.take() {
                Some(link) if matches!(event, Event::End(TagEnd::Link)) => {
                    match self.render_link(&link.finish()) {
                        MarkupFragment::Html(raw) => events.push(Event::InlineHtml(raw.into())),
                        element @ MarkupFragment::Element { .. } => {
                            events.push(Event::InlineHtml(slots.marker(elements.len()).into()));
                            elements.push(element);
                        }
                    }
                }
                Some(mut link) => {
                    link.inner.push(event);
                    pending = Some(link);
                }
                None => match event {
                    Event::Start(Tag::Link {
                        dest_url, title, ..
                    }) if image_depth == 0 => {
                        pending = Some(PendingLink {
                            url: dest_url.to_string(),
                            title: title.to_string(),
                            inner: Vec::new(),
                        });
                    }
                    event => {
                        match &event {
                            Event::Start(Tag::Image { .. }) => image_depth += 1,
                            Event::End(TagEnd::Image) => {
                                image_depth = image_depth.saturating_sub(1)
                            }
                            _ => {}
                        }
                        events.push(event);
                    }
                },
            }
        }

        // Unterminated link: render its contents as plain output.
        if let Some(link) = pending {
            events.extend(link.inner);
        }

        let mut out = String::new();
        html::push_html(&mut out, events.into_iter());
        slots.splice(&out, elements)
    }
}

struct PendingLink<'a> {
    url: String,
    title: String,
    inner: Vec<Event<'a>>,
}

impl PendingLink<'_> {
    fn finish(self) -> Link {
        let mut text = String::new();
        html::push_html(&mut text, self.inner.into_iter());
        Link {
            url: self.url,
            title: self.title,
            text,
        }
    }
}

/// Stand-in text for element fragments while pulldown-cmark writes the HTML.
/// The nonce is fresh per render so source text cannot forge a slot.
struct SlotMarker {
    open: String,
}

impl SlotMarker {
    fn new() -> Self {
        let nonce = Uuid::new_v4().simple().to_string();
        Self {
            open: format!("{SLOT_OPEN}{nonce}:"),
        }
    }

    fn marker(&self, index: usize) -> String {
        format!("{}{index}{SLOT_CLOSE}", self.open)
    }

    /// Split rendered HTML at slot markers and put each element in its place.
    fn splice(&self, html: &str, elements: Vec<MarkupFragment>) -> RenderedDocument {
        let open = self.open.as_str();
        let mut slots: Vec<Option<MarkupFragment>> = elements.into_iter().map(Some).collect();
        let mut doc = RenderedDocument::default();
        let mut rest = html;

        while let Some(start) = rest.find(open) {
            let after = &rest[start + open.len()..];
            let element = after.find(SLOT_CLOSE).and_then(|end| {
                let index: usize = after[..end].parse().ok()?;
                let fragment = slots.get_mut(index)?.take()?;
                Some((fragment, end))
            });

            match element {
                Some((fragment, end)) => {
                    doc.push(MarkupFragment::Html(rest[..start].to_string()));
                    doc.push(fragment);
                    rest = &after[end + SLOT_CLOSE.len_utf8()..];
                }
                None => {
                    doc.push(MarkupFragment::Html(rest[..start + open.len()].to_string()));
                    rest = after;
                }
            }
        }

        doc.push(MarkupFragment::Html(rest.to_string()));
        doc
    }
}
