use crate::host::Page;
use crate::host::frame::FrameQueue;
use crate::model::dom::NodeId;
use crate::model::markup::Attrs;

use super::deferred::{ContentSlot, DeferredContent, DeferredElement, Placement};
use super::id::IdGenerator;

/// Shows the marker URL itself as an image.
#[derive(Debug, Clone)]
pub struct ImageContent {
    url: String,
}

impl ImageContent {
    pub fn place(url: impl Into<String>, ids: &IdGenerator, frames: &FrameQueue) -> Placement {
        DeferredElement::place(Self { url: url.into() }, ids, frames)
    }
}

impl DeferredContent for ImageContent {
    fn kind(&self) -> &'static str {
        "image"
    }

    fn source_url(&self) -> &str {
        &self.url
    }

    // Load failures are left to the browser.
    fn populate(self, node: NodeId, page: &mut Page, slot: ContentSlot) {
        let mut attrs = Attrs::new();
        attrs.push(("src".to_string(), self.url));
        page.dom.append_element(node, "img", attrs);
        slot.ready(None);
    }
}
