use crate::host::Page;
use crate::host::markdown::MarkdownRenderer;
use crate::model::markup::Attrs;

use super::error::EmbedError;
use super::interceptor::{BindingLog, Interceptor};

const WRAPPER_NAME: &str = "workbook";

/// Result of installing the interceptor on a renderer.
#[derive(Debug, Clone)]
pub struct Installation {
    library_url: String,
    bindings: BindingLog,
}

impl Installation {
    /// Wrap the renderer's link handler with `interceptor`. Happens at most
    /// once per renderer.
    pub fn install(
        renderer: &mut MarkdownRenderer,
        interceptor: Interceptor,
        library_url: impl Into<String>,
    ) -> Result<Self, EmbedError> {
        if renderer.is_wrapped_by(WRAPPER_NAME) {
            return Err(EmbedError::AlreadyInstalled);
        }

        let bindings = interceptor.binding_log();
        renderer.wrap_link_handler(WRAPPER_NAME, |original| interceptor.wrap(original));

        let library_url = library_url.into();
        tracing::info!(%library_url, "link interceptor installed");
        Ok(Self {
            library_url,
            bindings,
        })
    }

    pub fn bindings(&self) -> &BindingLog {
        &self.bindings
    }

    /// Add the charting library to the page head. Nothing waits on it.
    pub fn load_chart_library(&self, page: &mut Page) {
        let mut attrs = Attrs::new();
        attrs.push(("src".to_string(), self.library_url.clone()));
        let head = page.dom.head();
        page.dom.append_element(head, "script", attrs);
        tracing::debug!(url = %self.library_url, "chart library requested");
    }
}
