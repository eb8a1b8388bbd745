use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use super::markup::{self, Attrs, MarkupFragment, RenderedDocument};

new_key_type! {
    /// Handle to a node in a [`Dom`].
    pub struct NodeId;
}

/// Event listeners a node can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listener {
    /// Stops click events from reaching the host's handlers.
    StopClickPropagation,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Element { tag: String, attrs: Attrs },
    Text(String),
    /// Host HTML mounted verbatim.
    Raw(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub listeners: SmallVec<[Listener; 1]>,
}

/// In-memory live document.
///
/// Nodes are created detached; only nodes reachable from the root are part of
/// the live document and visible to [`Dom::get_element_by_id`].
pub struct Dom {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(element_node("html", Attrs::new()));
        let mut dom = Self {
            nodes,
            root,
            head: root,
            body: root,
        };
        dom.head = dom.append_element(root, "head", Attrs::new());
        dom.body = dom.append_element(root, "body", Attrs::new());
        dom
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn listeners(&self, id: NodeId) -> &[Listener] {
        self.nodes
            .get(id)
            .map(|node| node.listeners.as_slice())
            .unwrap_or_default()
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str, attrs: Attrs) -> NodeId {
        self.nodes.insert(element_node(tag, attrs))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            return;
        }
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    pub fn append_element(&mut self, parent: NodeId, tag: &str, attrs: Attrs) -> NodeId {
        let child = self.create_element(tag, attrs);
        self.append_child(parent, child);
        child
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        let child = self.nodes.insert(leaf_node(NodeKind::Text(text.into())));
        self.append_child(parent, child);
        child
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let Some(Node {
            kind: NodeKind::Element { attrs, .. },
            ..
        }) = self.nodes.get_mut(id)
        else {
            return;
        };

        let value = value.into();
        match attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => attrs.push((name.to_string(), value)),
        }
    }

    pub fn add_listener(&mut self, id: NodeId, listener: Listener) {
        if let Some(node) = self.nodes.get_mut(id)
            && !node.listeners.contains(&listener)
        {
            node.listeners.push(listener);
        }
    }

    /// Remove a node (and its subtree) from its parent. The subtree stays
    /// allocated but is no longer part of the live document.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get_mut(id).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|child| *child != id);
        }
    }

    #[cfg(test)]
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == self.root {
                return true;
            }
            current = self.nodes.get(node_id).and_then(|node| node.parent);
        }
        false
    }

    /// Look up an element in the live document by its `id` attribute.
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.find_in(self.root, id)
    }

    fn find_in(&self, node_id: NodeId, id: &str) -> Option<NodeId> {
        if self.attribute(node_id, "id") == Some(id) {
            return Some(node_id);
        }
        self.children(node_id)
            .iter()
            .find_map(|child| self.find_in(*child, id))
    }

    /// Insert a rendered document under `parent`, in order.
    pub fn mount(&mut self, parent: NodeId, document: &RenderedDocument) -> Vec<NodeId> {
        document
            .fragments
            .iter()
            .map(|fragment| self.mount_fragment(parent, fragment))
            .collect()
    }

    pub fn mount_fragment(&mut self, parent: NodeId, fragment: &MarkupFragment) -> NodeId {
        match fragment {
            MarkupFragment::Html(html) => {
                let node = self.nodes.insert(leaf_node(NodeKind::Raw(html.clone())));
                self.append_child(parent, node);
                node
            }
            MarkupFragment::Element {
                tag,
                attrs,
                children,
            } => {
                let node = self.append_element(parent, tag, attrs.clone());
                for child in children {
                    self.mount_fragment(node, child);
                }
                node
            }
        }
    }

    /// Serialize the whole page.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<!DOCTYPE html>\n");
        self.write_node(self.root, &mut out);
        out.push('\n');
        out
    }

    /// Serialize the children of a single node.
    #[cfg(test)]
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_node(*child, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };

        match &node.kind {
            NodeKind::Raw(html) => out.push_str(html),
            NodeKind::Text(text) => {
                let in_script = node
                    .parent
                    .and_then(|parent| self.tag(parent))
                    .is_some_and(|tag| tag == "script");
                if in_script {
                    out.push_str(text);
                } else {
                    out.push_str(&markup::escape_html(text));
                }
            }
            NodeKind::Element { tag, attrs } => {
                let handlers = node.listeners.iter().map(|listener| match listener {
                    Listener::StopClickPropagation => ("onclick", "event.stopPropagation()"),
                });
                markup::write_open_tag(
                    out,
                    tag,
                    attrs
                        .iter()
                        .map(|(k, v)| (k.as_str(), v.as_str()))
                        .chain(handlers),
                );
                if markup::is_void(tag) {
                    return;
                }
                for child in &node.children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

fn element_node(tag: &str, attrs: Attrs) -> Node {
    leaf_node(NodeKind::Element {
        tag: tag.to_string(),
        attrs,
    })
}

fn leaf_node(kind: NodeKind) -> Node {
    Node {
        kind,
        parent: None,
        children: Vec::new(),
        listeners: SmallVec::new(),
    }
}
