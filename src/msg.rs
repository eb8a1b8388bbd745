use std::path::PathBuf;

use crate::host::http::{HttpResponse, RequestId, TransportError};

/// All possible messages that drive state transitions.
#[derive(Debug)]
pub enum Msg {
    // -- Rendering
    RenderPath(PathBuf),
    FileChanged(PathBuf),

    // -- Network
    HttpResponse {
        request: RequestId,
        result: Result<HttpResponse, TransportError>,
    },

    // -- System
    Quit,
}
