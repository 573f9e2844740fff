//! Sentinel content types.

use derive_more::Display;
use std::path::{Path, PathBuf};

/// Category of Sentinel artifact. Each maps to one subdirectory of the
/// templates tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum ContentType {
    #[display("analytics-rules")]
    AnalyticsRules,
    #[display("workbooks")]
    Workbooks,
    #[display("watchlists")]
    Watchlists,
}

impl ContentType {
    /// All content types, in deployment order.
    pub const ALL: [ContentType; 3] = [
        ContentType::AnalyticsRules,
        ContentType::Workbooks,
        ContentType::Watchlists,
    ];

    /// Name of the subdirectory holding templates of this type.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ContentType::AnalyticsRules => "analytics-rules",
            ContentType::Workbooks => "workbooks",
            ContentType::Watchlists => "watchlists",
        }
    }

    /// Directory searched for this content type under `templates_dir`.
    pub fn dir_in(&self, templates_dir: &Path) -> PathBuf {
        templates_dir.join(self.dir_name())
    }

    /// Deployment name for a template file: `sentinel-{type}-{file stem}`.
    pub fn deployment_name(&self, template_path: &Path) -> String {
        let stem = template_path
            .file_stem()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        format!("sentinel-{}-{}", self.dir_name(), stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_dir_name() {
        for content_type in ContentType::ALL {
            assert_eq!(content_type.to_string(), content_type.dir_name());
        }
    }

    #[test]
    fn test_deployment_name_strips_extension() {
        let path = Path::new("templates/analytics-rules/brute-force.json");
        assert_eq!(
            ContentType::AnalyticsRules.deployment_name(path),
            "sentinel-analytics-rules-brute-force"
        );
    }

    #[test]
    fn test_deployment_name_keeps_inner_dots() {
        let path = Path::new("templates/workbooks/soc.v2.json");
        assert_eq!(
            ContentType::Workbooks.deployment_name(path),
            "sentinel-workbooks-soc.v2"
        );
    }

    #[test]
    fn test_dir_in() {
        assert_eq!(
            ContentType::Watchlists.dir_in(Path::new("templates")),
            PathBuf::from("templates/watchlists")
        );
    }
}
