use std::cell::RefCell;
use std::rc::Rc;

use regex::Regex;

use crate::host::frame::FrameQueue;
use crate::host::markdown::{Link, LinkHandler};
use crate::model::config::MarkerConfig;

use super::artifact::ArtifactRegistry;
use super::deferred::{BindState, BindingHandle, ContentState, Placement};
use super::error::EmbedError;
use super::id::IdGenerator;
use super::image::ImageContent;
use super::plot::PlotContent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Image,
    Plot,
}

/// Every binding created through one interceptor, in creation order.
#[derive(Debug, Clone, Default)]
pub struct BindingLog {
    inner: Rc<RefCell<Vec<BindingHandle>>>,
}

impl BindingLog {
    fn record(&self, binding: BindingHandle) {
        self.inner.borrow_mut().push(binding);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<BindingHandle> {
        self.inner.borrow().clone()
    }

    pub fn drain(&self) -> Vec<BindingHandle> {
        self.inner.borrow_mut().drain(..).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }
}

/// Outcome counts for a set of bindings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingSummary {
    pub ready: usize,
    pub loading: usize,
    pub failed: usize,
    pub pending: usize,
    pub abandoned: usize,
}

impl BindingSummary {
    pub fn of(bindings: &[BindingHandle]) -> Self {
        bindings
            .iter()
            .fold(Self::default(), |mut summary, binding| {
                match binding.state() {
                    BindState::Pending => summary.pending += 1,
                    BindState::Abandoned => summary.abandoned += 1,
                    BindState::Bound { content, .. } => match content {
                        ContentState::Loading => summary.loading += 1,
                        ContentState::Ready(_) => summary.ready += 1,
                        ContentState::Failed(_) => summary.failed += 1,
                    },
                }
                summary
            })
    }
}

/// Decides which links become deferred embeds.
pub struct Interceptor {
    image: Regex,
    plot: Regex,
    ids: IdGenerator,
    frames: FrameQueue,
    artifacts: Rc<ArtifactRegistry>,
    log: BindingLog,
}

impl Interceptor {
    pub fn new(
        markers: &MarkerConfig,
        ids: IdGenerator,
        frames: FrameQueue,
    ) -> Result<Self, EmbedError> {
        Ok(Self {
            image: compile_marker(&markers.image)?,
            plot: compile_marker(&markers.plot)?,
            ids,
            frames,
            artifacts: Rc::new(ArtifactRegistry::default()),
            log: BindingLog::default(),
        })
    }

    pub fn binding_log(&self) -> BindingLog {
        self.log.clone()
    }

    /// Image markers win over plot markers when a URL carries both.
    pub fn classify(&self, url: &str) -> Option<EmbedKind> {
        if self.image.is_match(url) {
            if self.plot.is_match(url) {
                tracing::debug!(%url, "url carries both markers; treating as image");
            }
            Some(EmbedKind::Image)
        } else if self.plot.is_match(url) {
            Some(EmbedKind::Plot)
        } else {
            None
        }
    }

    /// Placeholder markup for `url`, or `None` if it is not a marker URL.
    pub fn intercept(&self, url: &str) -> Option<Placement> {
        let placement = match self.classify(url)? {
            EmbedKind::Image => {
                tracing::info!(%url, "creating image");
                ImageContent::place(url, &self.ids, &self.frames)
            }
            EmbedKind::Plot => {
                tracing::info!(%url, "creating plot");
                PlotContent::place(url, &self.artifacts, &self.ids, &self.frames)
            }
        };
        self.log.record(placement.binding.clone());
        Some(placement)
    }

    /// Decorate `original`: marker links become placeholders, everything
    /// else goes to `original` untouched.
    pub fn wrap(self, original: LinkHandler) -> LinkHandler {
        Box::new(move |link: &Link| match self.intercept(&link.url) {
            Some(placement) => placement.markup,
            None => original(link),
        })
    }
}

fn compile_marker(pattern: &str) -> Result<Regex, EmbedError> {
    Regex::new(pattern).map_err(|source| EmbedError::InvalidMarker {
        pattern: pattern.to_string(),
        source,
    })
}
