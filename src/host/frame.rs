use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::Page;

pub type FrameCallback = Box<dyn FnOnce(&mut Page)>;

/// Callbacks waiting for the next paint pass.
///
/// Cloning shares the queue, so the renderer side can schedule work that the
/// page later runs.
#[derive(Clone, Default)]
pub struct FrameQueue {
    inner: Rc<RefCell<VecDeque<FrameCallback>>>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_frame(&self, callback: FrameCallback) {
        self.inner.borrow_mut().push_back(callback);
    }

    /// Take everything queued so far. Callbacks requested while these run
    /// land in the next frame.
    pub fn take_frame(&self) -> Vec<FrameCallback> {
        self.inner.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("pending", &self.len())
            .finish()
    }
}
