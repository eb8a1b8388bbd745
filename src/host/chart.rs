use serde_json::Value;

use crate::embed::error::EmbedError;
use crate::model::dom::{Dom, NodeId};
use crate::model::markup::Attrs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChartHandle(pub u64);

/// External charting library: draws `series` into `node` using `config`.
pub trait ChartRenderer {
    fn render(
        &mut self,
        dom: &mut Dom,
        node: NodeId,
        series: &Value,
        config: &Value,
    ) -> Result<ChartHandle, EmbedError>;
}

/// Emits an inline script constructing a Dygraph in the target node.
#[derive(Debug, Default)]
pub struct DygraphRenderer {
    next: u64,
}

impl ChartRenderer for DygraphRenderer {
    fn render(
        &mut self,
        dom: &mut Dom,
        node: NodeId,
        series: &Value,
        config: &Value,
    ) -> Result<ChartHandle, EmbedError> {
        let id = dom
            .attribute(node, "id")
            .ok_or_else(|| EmbedError::Chart("target node has no id".to_string()))?;

        let source = format!(
            "new Dygraph(document.getElementById({}), {}, {});",
            script_json(&Value::String(id.to_string()))?,
            script_json(series)?,
            script_json(config)?,
        );

        let script = dom.append_element(node, "script", Attrs::new());
        dom.append_text(script, source);

        self.next += 1;
        Ok(ChartHandle(self.next))
    }
}

/// JSON that cannot close the surrounding `<script>` element.
fn script_json(value: &Value) -> Result<String, EmbedError> {
    let json = serde_json::to_string(value).map_err(|err| EmbedError::Chart(err.to_string()))?;
    Ok(json.replace("</", "<\\/"))
}
