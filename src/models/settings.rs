use serde::{Deserialize, Serialize};

/// Default retention cap for the print history.
pub const DEFAULT_MAX_HISTORY_ITEMS: usize = 100;

/// User settings persisted under the `settings` key.
///
/// Field names serialize in camelCase so the stored document keeps the
/// `prefixFilter` / `extensionFilter` / `maxHistoryItems` spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub enabled: bool,
    pub prefix_filter: String,
    pub extension_filter: String,
    pub show_notifications: bool,
    pub max_history_items: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix_filter: String::new(),
            extension_filter: String::new(),
            show_notifications: true,
            max_history_items: DEFAULT_MAX_HISTORY_ITEMS,
        }
    }
}

impl Settings {
    /// Bring the settings into canonical form.
    ///
    /// The extension filter is stored without a leading dot and lower-cased,
    /// so `.PDF`, `pdf` and `Pdf` all persist as `pdf`.
    pub fn normalized(mut self) -> Self {
        self.extension_filter = normalize_extension(&self.extension_filter);
        self
    }

    /// Build the filter rule the engine evaluates against.
    pub fn filter_rule(&self) -> FilterRule {
        FilterRule::new(Some(self.prefix_filter.as_str()), Some(self.extension_filter.as_str()))
    }

    /// Whether any sub-filter is active.
    pub fn has_filters(&self) -> bool {
        !self.prefix_filter.is_empty() || !self.extension_filter.is_empty()
    }
}

/// Prefix/extension constraint pair governing which files are auto-printed.
///
/// Absent and empty fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterRule {
    pub prefix: Option<String>,
    pub extension: Option<String>,
}

impl FilterRule {
    pub fn new(prefix: Option<&str>, extension: Option<&str>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
            extension: extension
                .map(normalize_extension)
                .filter(|e| !e.is_empty()),
        }
    }

    pub fn prefix(prefix: &str) -> Self {
        Self::new(Some(prefix), None)
    }

    pub fn extension(extension: &str) -> Self {
        Self::new(None, Some(extension))
    }

    /// Rule with no active sub-filters; matches every filename.
    pub fn any() -> Self {
        Self::default()
    }
}

/// Strip surrounding whitespace and leading dots, then lower-case.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert!(!settings.enabled);
        assert!(settings.prefix_filter.is_empty());
        assert!(settings.extension_filter.is_empty());
        assert!(settings.show_notifications);
        assert_eq!(settings.max_history_items, 100);
    }

    #[test]
    fn test_normalized_extension() {
        let settings = Settings {
            extension_filter: " .PDF".to_string(),
            ..Settings::default()
        }
        .normalized();
        assert_eq!(settings.extension_filter, "pdf");
    }

    #[test]
    fn test_filter_rule_drops_empty_fields() {
        let rule = FilterRule::new(Some(""), Some("."));
        assert_eq!(rule, FilterRule::any());

        let rule = FilterRule::new(Some("invoice_"), Some(".Pdf"));
        assert_eq!(rule.prefix.as_deref(), Some("invoice_"));
        assert_eq!(rule.extension.as_deref(), Some("pdf"));
    }

    #[test]
    fn test_settings_serialize_camel_case() {
        let yaml = serde_yaml_ng::to_string(&Settings::default()).unwrap();
        assert!(yaml.contains("prefixFilter"));
        assert!(yaml.contains("maxHistoryItems: 100"));
    }
}
