//! Admission filtering for discovered entries.
//!
//! Order matters and mirrors the consume contract: hidden names and lock
//! markers are rejected first, user filters run before the pattern filters,
//! excludes win over includes, and the done-file gate runs last.

use std::path::Path;
use std::sync::Arc;

use sluice_config::EndpointSettings;
use sluice_core::SourceFile;
use tracing::trace;

use crate::lock::{MARKER_SUFFIX, PROBE_SUFFIX};

/// User-pluggable filter over discovered entries.
///
/// Filters see directories as well as files; rejecting a directory prunes
/// the entire subtree.
pub trait FileFilter: Send + Sync {
    /// Whether the entry is eligible.
    fn accept(&self, file: &SourceFile) -> bool;
}

impl<F> FileFilter for F
where
    F: Fn(&SourceFile) -> bool + Send + Sync,
{
    fn accept(&self, file: &SourceFile) -> bool {
        self(file)
    }
}

/// The full admission chain, evaluated per discovered entry.
#[derive(Clone)]
pub(crate) struct AdmissionFilter {
    settings: Arc<EndpointSettings>,
    filter: Option<Arc<dyn FileFilter>>,
    file_predicate: Option<Arc<dyn FileFilter>>,
}

impl AdmissionFilter {
    pub(crate) fn new(
        settings: Arc<EndpointSettings>,
        filter: Option<Arc<dyn FileFilter>>,
        file_predicate: Option<Arc<dyn FileFilter>>,
    ) -> Self {
        Self {
            settings,
            filter,
            file_predicate,
        }
    }

    /// Whether the entry passes every configured filter.
    pub(crate) fn matches(&self, file: &SourceFile, is_directory: bool) -> bool {
        let name_only = file.file_name_only();

        // Names starting with a dot are always skipped.
        if name_only.starts_with('.') {
            return false;
        }
        if name_only.ends_with(MARKER_SUFFIX) || name_only.ends_with(PROBE_SUFFIX) {
            return false;
        }

        if let Some(filter) = &self.filter {
            if !filter.accept(file) {
                return false;
            }
        }

        let relative = file.relative_path().to_string_lossy();
        if let Some(ant_exclude) = &self.settings.ant_exclude {
            if ant_exclude.is_match(relative.as_ref()) {
                return false;
            }
        }
        if let Some(ant_include) = &self.settings.ant_include {
            if !is_directory && !ant_include.is_match(relative.as_ref()) {
                return false;
            }
        }

        // Directories are matched once the filters above accepted them.
        if is_directory {
            return true;
        }

        if !self.matches_name(file, name_only) {
            return false;
        }

        if let Some(predicate) = &self.file_predicate {
            if !predicate.accept(file) {
                return false;
            }
        }

        self.matches_done_file(file, name_only)
    }

    fn matches_name(&self, file: &SourceFile, name_only: &str) -> bool {
        // Exclude takes precedence over include.
        if let Some(exclude) = &self.settings.exclude {
            if exclude.is_match(name_only) {
                return false;
            }
        }
        let lowered = file.file_name().to_lowercase();
        if self
            .settings
            .exclude_ext
            .iter()
            .any(|ext| lowered.ends_with(&format!(".{ext}")))
        {
            return false;
        }
        if let Some(include) = &self.settings.include {
            if !include.is_match(name_only) {
                return false;
            }
        }
        if !self.settings.include_ext.is_empty()
            && !self
                .settings
                .include_ext
                .iter()
                .any(|ext| lowered.ends_with(&format!(".{ext}")))
        {
            return false;
        }

        if let Some(pattern) = &self.settings.file_name {
            let expected = pattern.resolve(file);
            if name_only != expected {
                return false;
            }
        }
        true
    }

    fn matches_done_file(&self, file: &SourceFile, name_only: &str) -> bool {
        let Some(done) = &self.settings.done_file_name else {
            return true;
        };
        // The done file itself is never a candidate.
        if done.matches(name_only) {
            trace!(file = %file.absolute_path().display(), "skipping done file");
            return false;
        }
        // The data file is only valid once its companion exists; checked
        // independently against the filesystem, not the listed entries.
        let done_name = done.resolve(name_only);
        let companion = file
            .absolute_path()
            .parent()
            .map_or_else(|| Path::new(&done_name).to_path_buf(), |parent| parent.join(&done_name));
        if !companion.exists() {
            trace!(
                file = %file.absolute_path().display(),
                done = %companion.display(),
                "done file missing, not ready"
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_config::{ant_filter, name_regex};
    use sluice_core::DoneFilePattern;

    fn entry(name: &str) -> SourceFile {
        SourceFile::new("/data/in", format!("/data/in/{name}"), false, 1, None)
    }

    fn chain(settings: EndpointSettings) -> AdmissionFilter {
        AdmissionFilter::new(Arc::new(settings.validated().expect("valid")), None, None)
    }

    #[test]
    fn hidden_and_marker_names_are_rejected() {
        let filter = chain(EndpointSettings::new("/data/in"));
        assert!(!filter.matches(&entry(".hidden"), false));
        assert!(!filter.matches(&entry("a.txt.sluicelock"), false));
        assert!(filter.matches(&entry("a.txt"), false));
    }

    #[test]
    fn exclude_wins_over_include() {
        let mut settings = EndpointSettings::new("/data/in");
        settings.include = Some(name_regex(r".*\.txt").expect("regex"));
        settings.exclude = Some(name_regex(r"skip.*").expect("regex"));
        let filter = chain(settings);
        assert!(filter.matches(&entry("keep.txt"), false));
        assert!(!filter.matches(&entry("skip.txt"), false));
        assert!(!filter.matches(&entry("keep.csv"), false));
    }

    #[test]
    fn extension_filters_are_case_insensitive() {
        let mut settings = EndpointSettings::new("/data/in");
        settings.include_ext = vec!["txt".to_string()];
        settings.exclude_ext = vec!["bak".to_string()];
        let filter = chain(settings);
        assert!(filter.matches(&entry("A.TXT"), false));
        assert!(!filter.matches(&entry("a.bak"), false));
        assert!(!filter.matches(&entry("a.csv"), false));
    }

    #[test]
    fn ant_patterns_match_relative_paths() {
        let mut settings = EndpointSettings::new("/data/in");
        settings.ant_include = Some(ant_filter(&["**/*.csv"]).expect("globs"));
        settings.ant_exclude = Some(ant_filter(&["tmp/**"]).expect("globs"));
        let filter = chain(settings);
        assert!(filter.matches(&entry("reports/q1.csv"), false));
        assert!(!filter.matches(&entry("tmp/q1.csv"), false));
        assert!(!filter.matches(&entry("reports/q1.txt"), false));
    }

    #[test]
    fn user_filter_runs_before_pattern_filters() {
        let mut settings = EndpointSettings::new("/data/in");
        settings.include = Some(name_regex(r".*").expect("regex"));
        let filter = AdmissionFilter::new(
            Arc::new(settings.validated().expect("valid")),
            Some(Arc::new(|file: &SourceFile| {
                !file.file_name_only().contains("vetoed")
            })),
            None,
        );
        assert!(filter.matches(&entry("ok.txt"), false));
        assert!(!filter.matches(&entry("vetoed.txt"), false));
    }

    #[test]
    fn done_file_gate_requires_companion() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = EndpointSettings::new(dir.path());
        settings.done_file_name = Some(DoneFilePattern::parse("${file:name}.done").expect("pattern"));
        let filter = chain(settings);

        let data = dir.path().join("a.txt");
        std::fs::write(&data, b"body").expect("seed");
        let file = SourceFile::new(dir.path(), &data, false, 4, None);
        assert!(!filter.matches(&file, false));

        std::fs::write(dir.path().join("a.txt.done"), b"").expect("marker");
        assert!(filter.matches(&file, false));

        // The done file itself is never admitted.
        let done_entry = SourceFile::new(dir.path(), dir.path().join("a.txt.done"), false, 0, None);
        assert!(!filter.matches(&done_entry, false));
    }

    #[test]
    fn directories_pass_once_ant_filters_allow_them() {
        let mut settings = EndpointSettings::new("/data/in");
        settings.ant_exclude = Some(ant_filter(&["vault", "vault/**"]).expect("globs"));
        let filter = chain(settings);
        let dir_entry = SourceFile::new("/data/in", "/data/in/vault", true, 0, None);
        assert!(!filter.matches(&dir_entry, true));
        let ok_dir = SourceFile::new("/data/in", "/data/in/sub", true, 0, None);
        assert!(filter.matches(&ok_dir, true));
    }
}
