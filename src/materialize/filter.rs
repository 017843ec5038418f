use crate::zip::EntryDescriptor;

/// Extensions selected by default: the text-like files of a data export.
pub const TEXT_EXTENSIONS: &[&str] = &["html", "htm", "json", "txt", "csv", "xml", "js", "css", "md"];

/// Selects which archive entries a materialization run considers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFilter {
    /// Lower-cased extensions without the dot. Empty selects every file.
    extensions: Vec<String>,
    prefix: Option<String>,
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self::text()
    }
}

impl EntryFilter {
    /// Text-like files anywhere in the archive.
    pub fn text() -> Self {
        Self::extensions(TEXT_EXTENSIONS.iter().copied())
    }

    /// Every file in the archive.
    pub fn all() -> Self {
        Self {
            extensions: Vec::new(),
            prefix: None,
        }
    }

    pub fn extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            prefix: None,
        }
    }

    /// Only consider entries whose path starts with `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn matches(&self, entry: &EntryDescriptor) -> bool {
        if entry.is_directory {
            return false;
        }
        if let Some(prefix) = &self.prefix {
            if !entry.path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if self.extensions.is_empty() {
            return true;
        }
        entry
            .extension()
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::descriptor;

    #[test]
    fn default_selects_text_files() {
        let filter = EntryFilter::default();
        assert!(filter.matches(&descriptor("your_activity/posts.JSON", 0)));
        assert!(filter.matches(&descriptor("messages/a/message_1.html", 0)));
        assert!(!filter.matches(&descriptor("media/photo.jpg", 0)));
        assert!(!filter.matches(&descriptor("notes.json/", 0)));
    }

    #[test]
    fn prefix_and_custom_extensions() {
        let filter = EntryFilter::extensions([".JPG", "png", ""]).with_prefix("media/");
        assert!(filter.matches(&descriptor("media/a.jpg", 0)));
        assert!(!filter.matches(&descriptor("other/a.jpg", 0)));
        assert!(!filter.matches(&descriptor("media/a.html", 0)));
    }

    #[test]
    fn all_selects_files_only() {
        let filter = EntryFilter::all();
        assert!(filter.matches(&descriptor("Makefile", 0)));
        assert!(!filter.matches(&descriptor("dir/", 0)));
    }
}
