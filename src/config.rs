// Configuration management for symgraph

use std::path::{Path, PathBuf};

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::lang::Language;

/// Project-level configuration file, looked up in the project root
pub const CONFIG_FILE_NAME: &str = ".symgraph.toml";

/// Index database, stored next to the configuration
pub const DB_FILE_NAME: &str = ".symgraph.db";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub languages: LanguagesConfig,
    pub indexing: IndexingConfig,
    pub graph: GraphConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguagesConfig {
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub full_rebuild: bool,
    pub workers: usize,
    pub watch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub impact_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "unnamed-project".to_string(),
            root: ".".to_string(),
        }
    }
}

impl Default for LanguagesConfig {
    fn default() -> Self {
        Self {
            enabled: ["typescript", "javascript", "python", "php", "java", "go", "rust"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            include: vec![],
            exclude: vec![
                "target/".to_string(),
                "node_modules/".to_string(),
                "vendor/".to_string(),
                "dist/".to_string(),
                ".git/".to_string(),
                "*.min.js".to_string(),
                "*.d.ts".to_string(),
                DB_FILE_NAME.to_string(),
            ],
            full_rebuild: false,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            watch: false,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { impact_depth: 3 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Compiled include/exclude patterns
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl PathFilter {
    pub fn new(indexing: &IndexingConfig) -> anyhow::Result<Self> {
        let include = if indexing.include.is_empty() {
            None
        } else {
            Some(build_globset(&indexing.include)?)
        };
        Ok(Self {
            include,
            exclude: build_globset(&indexing.exclude)?,
        })
    }

    /// Exclude wins over include; an empty include list admits everything
    pub fn matches(&self, relative_path: &str) -> bool {
        if self.exclude.is_match(relative_path) {
            return false;
        }
        match &self.include {
            Some(include) => include.is_match(relative_path),
            None => true,
        }
    }
}

/// `dir/` patterns match the directory at any depth
fn expand_pattern(pattern: &str) -> Vec<String> {
    match pattern.strip_suffix('/') {
        Some(dir) if dir.starts_with("**/") => vec![format!("{}/**", dir)],
        Some(dir) => vec![format!("{}/**", dir), format!("**/{}/**", dir)],
        None => vec![pattern.to_string()],
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        for expanded in expand_pattern(pattern) {
            let glob = Glob::new(&expanded)
                .with_context(|| format!("Invalid glob pattern: {}", pattern))?;
            builder.add(glob);
        }
    }
    builder.build().context("Failed to compile glob patterns")
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from project directory.
    /// Looks for .symgraph.toml in the project root, defaults when absent.
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> anyhow::Result<Self> {
        let config_path = project_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            tracing::debug!("No {} found, using default configuration", CONFIG_FILE_NAME);
            return Ok(Self::default());
        }

        let config = Self::from_file(&config_path)?;
        tracing::info!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    /// Project root, relative roots resolved against the project directory
    pub fn project_root(&self, project_dir: impl AsRef<Path>) -> PathBuf {
        let root = Path::new(&self.project.root);
        if root.is_absolute() {
            root.to_path_buf()
        } else {
            project_dir.as_ref().join(root)
        }
    }

    pub fn db_path(&self, project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(DB_FILE_NAME)
    }

    pub fn path_filter(&self) -> anyhow::Result<PathFilter> {
        PathFilter::new(&self.indexing)
    }

    /// Check if a project-relative path should be indexed based on include/exclude patterns
    pub fn should_index_file(&self, file_path: &str) -> bool {
        self.path_filter()
            .map(|filter| filter.matches(file_path))
            .unwrap_or(false)
    }

    /// Enabled languages; `typescript` also enables TSX
    pub fn enabled_languages(&self) -> Vec<Language> {
        Language::SUPPORTED
            .iter()
            .copied()
            .filter(|lang| {
                self.languages
                    .enabled
                    .iter()
                    .any(|name| name == lang.config_name())
            })
            .collect()
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project.name.is_empty() {
            anyhow::bail!("Project name cannot be empty");
        }

        for lang in &self.languages.enabled {
            if Language::from_name(lang).is_none() {
                anyhow::bail!("Unsupported language: {}", lang);
            }
        }

        if self.indexing.workers == 0 {
            anyhow::bail!("Worker count must be greater than 0");
        }
        self.path_filter()?;

        if self.graph.impact_depth == 0 {
            anyhow::bail!("Impact depth must be greater than 0");
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }
        let valid_formats = ["compact", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.project.name, "unnamed-project");
        assert!(config.languages.enabled.contains(&"python".to_string()));
        assert!(config.indexing.workers > 0);
        assert_eq!(config.graph.impact_depth, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_should_index_file() {
        let config = Config::default();

        assert!(config.should_index_file("src/main.rs"));
        assert!(config.should_index_file("lib/utils.py"));

        assert!(!config.should_index_file("target/debug/build.rs"));
        assert!(!config.should_index_file("web/node_modules/left-pad/index.js"));
        assert!(!config.should_index_file("public/app.min.js"));
        assert!(!config.should_index_file(".symgraph.db"));
    }

    #[test]
    fn test_include_patterns_and_exclude_precedence() {
        let mut config = Config::default();
        config.indexing.include = vec!["src/**".to_string()];
        config.indexing.exclude = vec!["**/generated/**".to_string()];

        assert!(config.should_index_file("src/orders/service.ts"));
        assert!(!config.should_index_file("scripts/deploy.py"));
        assert!(!config.should_index_file("src/generated/api.ts"));
    }

    #[test]
    fn test_enabled_languages() {
        let mut config = Config::default();
        config.languages.enabled = vec!["typescript".to_string(), "go".to_string()];
        assert_eq!(
            config.enabled_languages(),
            vec![Language::TypeScript, Language::Tsx, Language::Go]
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[project]\nname = \"shop\"\n\n[graph]\nimpact_depth = 5\n",
        )
        .unwrap();

        let config = Config::from_project_dir(dir.path()).unwrap();
        assert_eq!(config.project.name, "shop");
        assert_eq!(config.graph.impact_depth, 5);
        assert_eq!(config.logging.level, "info");
        assert!(!config.indexing.exclude.is_empty());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.project.name = "".to_string();
        assert!(config.validate().is_err());
        config.project.name = "test".to_string();

        config.languages.enabled = vec!["cobol".to_string()];
        assert!(config.validate().is_err());
        config.languages.enabled = vec!["python".to_string()];

        config.indexing.workers = 0;
        assert!(config.validate().is_err());
        config.indexing.workers = 2;

        config.graph.impact_depth = 0;
        assert!(config.validate().is_err());
        config.graph.impact_depth = 3;

        config.indexing.exclude = vec!["src/[".to_string()];
        assert!(config.validate().is_err());
        config.indexing.exclude = vec![];

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "info".to_string();

        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
