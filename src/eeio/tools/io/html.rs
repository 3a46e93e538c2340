use std::fs;
use std::path::Path;

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::eeio::tools::chart::Figure;
use crate::eeio::tools::error::{Result, ToolError};

/// plotly.js bundle referenced by the generated pages.
pub const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.27.0.min.js";

/// Renders a figure as a standalone HTML page.
pub fn render_html(figure: &Figure) -> Result<String> {
    let div_id = Uuid::new_v4();
    let data = script_safe(serde_json::to_string(&figure.data)?);
    let layout = script_safe(serde_json::to_string(&figure.layout)?);
    Ok(format!(
        r#"<html>
<head><meta charset="utf-8" /></head>
<body>
    <div id="{div_id}" class="plotly-graph-div" style="height:100%; width:100%;"></div>
    <script src="{PLOTLY_CDN}" charset="utf-8"></script>
    <script type="text/javascript">
        Plotly.newPlot("{div_id}", {data}, {layout}, {{"responsive": true}});
    </script>
</body>
</html>
"#
    ))
}

/// Writes a figure to `path`. The parent directory must already exist.
#[instrument(level = "info", skip(figure), fields(path = %path.display()))]
pub fn write_html(path: &Path, figure: &Figure) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            return Err(ToolError::MissingOutputDirectory(parent.to_path_buf()));
        }
    }
    let html = render_html(figure)?;
    debug!(bytes = html.len(), "chart rendered");
    fs::write(path, html)?;
    Ok(())
}

/// Keeps `</script>` sequences inside JSON strings from closing the tag.
fn script_safe(json: String) -> String {
    json.replace("</", "<\\/")
}
