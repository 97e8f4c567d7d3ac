use serde::Deserialize;

use crate::selection::SelectionSettings;

pub const DEFAULT_TOOL_NAME: &str = "SonarQube";
pub const DEFAULT_REPORT_KEY: &str = "com.sonarsource.quality-gate";

/// Run-wide presentation and selection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DecorationSettings {
    #[serde(default = "default_tool_name")]
    pub tool_name: String,
    /// Stable key of the code-insights report, reused across runs.
    #[serde(default = "default_report_key")]
    pub report_key: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(flatten)]
    pub selection: SelectionSettings,
}

fn default_tool_name() -> String {
    DEFAULT_TOOL_NAME.to_string()
}

fn default_report_key() -> String {
    DEFAULT_REPORT_KEY.to_string()
}

impl Default for DecorationSettings {
    fn default() -> Self {
        Self {
            tool_name: default_tool_name(),
            report_key: default_report_key(),
            logo_url: None,
            selection: SelectionSettings::default(),
        }
    }
}
