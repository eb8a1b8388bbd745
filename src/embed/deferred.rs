//! Deferred binding between emitted placeholder markup and a live node.
//!
//! A [`DeferredElement`] hands back an empty container synchronously and
//! schedules a bind attempt for the next frame, by which point the host has
//! had its chance to mount the markup. The attempt either finds the node
//! (Bound, content populated exactly once) or does not (Abandoned). There is
//! no retry.

use std::cell::RefCell;
use std::rc::Rc;

use crate::host::Page;
use crate::host::chart::ChartHandle;
use crate::host::frame::FrameQueue;
use crate::model::dom::NodeId;
use crate::model::markup::MarkupFragment;

use super::id::{IdGenerator, PlaceholderId};

/// Content that is filled in once its placeholder is live.
pub trait DeferredContent: 'static {
    /// Short label for logs.
    fn kind(&self) -> &'static str;

    fn source_url(&self) -> &str;

    /// Called exactly once, with the bound node, after binding succeeds.
    fn populate(self, node: NodeId, page: &mut Page, slot: ContentSlot);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentState {
    Loading,
    Ready(Option<ChartHandle>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindState {
    Pending,
    Bound { node: NodeId, content: ContentState },
    Abandoned,
}

/// Observer for one element's binding outcome.
#[derive(Debug, Clone)]
pub struct BindingHandle {
    id: PlaceholderId,
    kind: &'static str,
    url: String,
    state: Rc<RefCell<BindState>>,
}

impl BindingHandle {
    pub fn id(&self) -> &PlaceholderId {
        &self.id
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn source_url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> BindState {
        self.state.borrow().clone()
    }

    #[cfg(test)]
    pub fn node(&self) -> Option<NodeId> {
        match &*self.state.borrow() {
            BindState::Bound { node, .. } => Some(*node),
            _ => None,
        }
    }

    pub fn content(&self) -> Option<ContentState> {
        match &*self.state.borrow() {
            BindState::Bound { content, .. } => Some(content.clone()),
            _ => None,
        }
    }
}

/// Write access to the content half of a bound element's state.
#[derive(Debug, Clone)]
pub struct ContentSlot {
    state: Rc<RefCell<BindState>>,
}

impl ContentSlot {
    pub fn ready(&self, chart: Option<ChartHandle>) {
        self.set(ContentState::Ready(chart));
    }

    pub fn fail(&self, reason: impl Into<String>) {
        self.set(ContentState::Failed(reason.into()));
    }

    fn set(&self, next: ContentState) {
        if let BindState::Bound { content, .. } = &mut *self.state.borrow_mut() {
            *content = next;
        }
    }
}

/// What a variant hands back to the host: the markup to emit now, and a
/// handle to watch what happens to it.
#[derive(Debug, Clone)]
pub struct Placement {
    pub markup: MarkupFragment,
    pub binding: BindingHandle,
}

pub struct DeferredElement<C> {
    id: PlaceholderId,
    content: C,
    state: Rc<RefCell<BindState>>,
}

impl<C: DeferredContent> DeferredElement<C> {
    /// Create the element and its placeholder in one step.
    pub fn place(content: C, ids: &IdGenerator, frames: &FrameQueue) -> Placement {
        let element = Self {
            id: ids.generate(),
            content,
            state: Rc::new(RefCell::new(BindState::Pending)),
        };
        element.create_placeholder(frames)
    }

    fn create_placeholder(self, frames: &FrameQueue) -> Placement {
        let markup = MarkupFragment::container(self.id.as_str());
        let binding = BindingHandle {
            id: self.id.clone(),
            kind: self.content.kind(),
            url: self.content.source_url().to_string(),
            state: self.state.clone(),
        };

        frames.request_frame(Box::new(move |page: &mut Page| self.bind(page)));

        Placement { markup, binding }
    }

    fn bind(self, page: &mut Page) {
        let Some(node) = page.dom.get_element_by_id(self.id.as_str()) else {
            tracing::debug!(id = %self.id, kind = self.content.kind(), "placeholder never mounted");
            *self.state.borrow_mut() = BindState::Abandoned;
            return;
        };

        *self.state.borrow_mut() = BindState::Bound {
            node,
            content: ContentState::Loading,
        };
        tracing::debug!(id = %self.id, kind = self.content.kind(), "bound");

        let slot = ContentSlot { state: self.state };
        self.content.populate(node, page, slot);
    }
}
