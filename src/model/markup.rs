use smallvec::SmallVec;

pub type Attrs = SmallVec<[(String, String); 2]>;

/// A piece of rendered output handed back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupFragment {
    /// Opaque HTML produced by the host renderer.
    Html(String),
    /// Structured element the document can address once mounted.
    Element {
        tag: String,
        attrs: Attrs,
        children: Vec<MarkupFragment>,
    },
}

impl MarkupFragment {
    /// An empty block-level container carrying only an id.
    pub fn container(id: &str) -> Self {
        let mut attrs = Attrs::new();
        attrs.push(("id".to_string(), id.to_string()));
        MarkupFragment::Element {
            tag: "div".to_string(),
            attrs,
            children: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            MarkupFragment::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            MarkupFragment::Html(_) => None,
        }
    }

    #[cfg(test)]
    pub fn write_html(&self, out: &mut String) {
        match self {
            MarkupFragment::Html(html) => out.push_str(html),
            MarkupFragment::Element {
                tag,
                attrs,
                children,
            } => {
                write_open_tag(out, tag, attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                if is_void(tag) {
                    return;
                }
                for child in children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    #[cfg(test)]
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }
}

/// Ordered output of one host render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDocument {
    pub fragments: Vec<MarkupFragment>,
}

impl RenderedDocument {
    /// Append a fragment, coalescing adjacent raw HTML.
    pub fn push(&mut self, fragment: MarkupFragment) {
        if let MarkupFragment::Html(next) = &fragment {
            if next.is_empty() {
                return;
            }
            if let Some(MarkupFragment::Html(prev)) = self.fragments.last_mut() {
                prev.push_str(next);
                return;
            }
        }
        self.fragments.push(fragment);
    }

    pub fn elements(&self) -> impl Iterator<Item = &MarkupFragment> {
        self.fragments
            .iter()
            .filter(|f| matches!(f, MarkupFragment::Element { .. }))
    }

    #[cfg(test)]
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            fragment.write_html(&mut out);
        }
        out
    }
}

pub(crate) fn write_open_tag<'a>(
    out: &mut String,
    tag: &str,
    attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
) {
    out.push('<');
    out.push_str(tag);
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');
}

pub(crate) fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "img" | "br" | "hr" | "meta" | "link" | "input" | "source" | "wbr"
    )
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(s: &str) -> String {
    escape_html(s).replace('"', "&quot;")
}
