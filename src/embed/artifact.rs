//! Processors that turn fetched plot payloads into chart input.
//!
//! Processors are tried in registration order and each may claim a payload by
//! its artifact name (the last URL path segment). Unclaimed payloads are
//! parsed as JSON chart options.

use serde_json::{Map, Value};

use super::error::EmbedError;

/// A payload after processing.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    /// Chart options; the data series lives under `file`.
    Json(Value),
    /// A CSV table the chart library parses itself, header row first.
    Csv(String),
}

impl Artifact {
    /// Split into the renderer's `(series, config)` pair.
    pub fn into_chart_input(self) -> (Value, Value) {
        match self {
            Artifact::Json(options) => {
                let series = options.get("file").cloned().unwrap_or(Value::Null);
                (series, options)
            }
            Artifact::Csv(table) => (Value::String(table), Value::Object(Map::new())),
        }
    }
}

/// Returns `None` to leave the payload to the next processor.
pub type ArtifactProcessor = fn(name: &str, contents: &str) -> Option<Artifact>;

pub struct ArtifactRegistry {
    processors: Vec<(&'static str, ArtifactProcessor)>,
}

impl Default for ArtifactRegistry {
    fn default() -> Self {
        Self::empty().register("csv", csv_artifact)
    }
}

impl ArtifactRegistry {
    pub fn empty() -> Self {
        Self {
            processors: Vec::new(),
        }
    }

    pub fn register(mut self, label: &'static str, processor: ArtifactProcessor) -> Self {
        self.processors.push((label, processor));
        self
    }

    pub fn process(&self, url: &str, contents: String) -> Result<Artifact, EmbedError> {
        let name = artifact_name(url);
        for (label, processor) in &self.processors {
            if let Some(artifact) = processor(name, &contents) {
                tracing::debug!(%url, processor = *label, "artifact processed");
                return Ok(artifact);
            }
        }

        serde_json::from_str(&contents)
            .map(Artifact::Json)
            .map_err(|source| EmbedError::MalformedPayload {
                url: url.to_string(),
                source,
            })
    }
}

/// Last path segment of `url`, ignoring query and fragment.
pub fn artifact_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// `.csv` tables pass through with `nil` cells blanked, which the chart
/// library reads as missing values.
pub fn csv_artifact(name: &str, contents: &str) -> Option<Artifact> {
    if !name.ends_with(".csv") {
        return None;
    }

    let table = contents
        .lines()
        .map(|line| {
            line.split(',')
                .map(|cell| if cell.trim() == "nil" { "" } else { cell })
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n");
    Some(Artifact::Csv(table))
}
