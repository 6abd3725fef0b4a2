//! Permission prompt text.
//!
//! The library never shows the prompt itself. It hands the rendered text to
//! the host, which asks the user and reports the answer back.

use std::path::Path;

/// Placeholder replaced with a pretty-printed example event
pub const EVENT_DATA_PLACEHOLDER: &str = "{event_data}";

/// Placeholder replaced with the settings file location
pub const SETTINGS_PATH_PLACEHOLDER: &str = "{settings_path}";

pub const DEFAULT_REQUEST_PROMPT: &str = r#"
To help improve the quality of our tools, we track basic
anonymized usage information so we can learn what features
are used and how people use them.

Here's an example of an event we would collect:
{event_data}

Your settings will be saved here and can be changed at any time:
{settings_path}

Can we collect anonymous usage data from your installation?
"#;

/// Fill in the prompt placeholders
pub fn render_prompt(
    template: &str,
    event_data: &serde_json::Value,
    settings_path: Option<&Path>,
) -> String {
    let event_data =
        serde_json::to_string_pretty(event_data).unwrap_or_else(|_| event_data.to_string());
    let settings_path = settings_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(settings are not saved on this system)".to_string());

    template
        .trim()
        .replace(EVENT_DATA_PLACEHOLDER, &event_data)
        .replace(SETTINGS_PATH_PLACEHOLDER, &settings_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_prompt_renders_placeholders() {
        let text = render_prompt(
            DEFAULT_REQUEST_PROMPT,
            &json!({"version": "1.0"}),
            Some(Path::new("/home/me/.config/acme_cls_x/settings.json")),
        );
        assert!(text.starts_with("To help improve"));
        assert!(text.contains("\"version\": \"1.0\""));
        assert!(text.contains("/home/me/.config/acme_cls_x/settings.json"));
        assert!(!text.contains(EVENT_DATA_PLACEHOLDER));
        assert!(!text.contains(SETTINGS_PATH_PLACEHOLDER));
    }

    #[test]
    fn test_custom_prompt_without_placeholders() {
        let text = render_prompt("  _prompt_ \n", &json!({}), None);
        assert_eq!(text, "_prompt_");
    }

    #[test]
    fn test_missing_settings_path() {
        let text = render_prompt("saved at {settings_path}", &json!(null), None);
        assert_eq!(text, "saved at (settings are not saved on this system)");
    }
}
