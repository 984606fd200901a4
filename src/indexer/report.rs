// Run summary and grouped error report

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Files listed per error group before truncating
pub const MAX_FILES_PER_ERROR: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexError {
    pub file: String,
    pub message: String,
}

/// Outcome of one indexing run
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub files_discovered: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_removed: usize,
    pub symbols: usize,
    pub relationships: usize,
    pub errors: Vec<IndexError>,
    pub duration: Duration,
}

impl IndexReport {
    pub fn record_error(&mut self, file: impl Into<String>, message: impl Into<String>) {
        self.errors.push(IndexError {
            file: file.into(),
            message: message.into(),
        });
    }

    /// Errors grouped by message, each group's files sorted
    pub fn grouped_errors(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for error in &self.errors {
            groups
                .entry(error.message.as_str())
                .or_default()
                .push(error.file.as_str());
        }
        for files in groups.values_mut() {
            files.sort_unstable();
        }
        groups
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Indexed {} of {} files ({} unchanged, {} removed) in {:.2}s",
            self.files_indexed,
            self.files_discovered,
            self.files_skipped,
            self.files_removed,
            self.duration.as_secs_f64()
        )?;
        writeln!(f, "Symbols: {}", self.symbols)?;
        write!(f, "Relationships: {}", self.relationships)?;

        if self.errors.is_empty() {
            return Ok(());
        }
        write!(f, "\n{} files failed:", self.errors.len())?;
        for (message, files) in self.grouped_errors() {
            write!(f, "\n  {} ({} files)", message, files.len())?;
            for file in files.iter().take(MAX_FILES_PER_ERROR) {
                write!(f, "\n    - {}", file)?;
            }
            if files.len() > MAX_FILES_PER_ERROR {
                write!(f, "\n    and {} more", files.len() - MAX_FILES_PER_ERROR)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_groups_and_truncates_errors() {
        let mut report = IndexReport {
            files_discovered: 12,
            files_indexed: 3,
            files_skipped: 1,
            files_removed: 1,
            symbols: 42,
            relationships: 17,
            duration: Duration::from_millis(250),
            ..Default::default()
        };
        for i in 0..7 {
            report.record_error(format!("src/gen/file{}.ts", i), "typescript parser produced no syntax tree");
        }
        report.record_error("src/bad.py", "failed to read file: stream did not contain valid UTF-8");

        insta::assert_snapshot!(report.to_string(), @r###"
        Indexed 3 of 12 files (1 unchanged, 1 removed) in 0.25s
        Symbols: 42
        Relationships: 17
        8 files failed:
          failed to read file: stream did not contain valid UTF-8 (1 files)
            - src/bad.py
          typescript parser produced no syntax tree (7 files)
            - src/gen/file0.ts
            - src/gen/file1.ts
            - src/gen/file2.ts
            - src/gen/file3.ts
            - src/gen/file4.ts
            and 2 more
        "###);
    }

    #[test]
    fn test_clean_run_has_no_error_section() {
        let report = IndexReport::default();
        assert!(!report.has_errors());
        assert!(!report.to_string().contains("failed"));
    }
}
