//! Configuration management for Docent.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config file (`.docent/config.yaml` or `DOCENT_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! Relative paths in the configuration are resolved against the workspace.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cancel::deadline_from_secs;
use crate::error::{AppError, AppResult};

/// Embedding providers understood by the RAG crate.
pub const EMBEDDING_PROVIDERS: [&str; 3] = ["openai", "ollama", "hash"];

/// Generative model providers; "none" disables re-ranking and synthesis.
pub const GENERATION_PROVIDERS: [&str; 3] = ["openai", "ollama", "none"];

/// Vector datastore backends.
pub const RETRIEVAL_BACKENDS: [&str; 2] = ["pgvector", "sqlite"];

/// Distance metrics supported by the datastore backends.
pub const DISTANCE_METRICS: [&str; 2] = ["cosine", "l2"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .docent/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Embedding service settings
    pub embedding: EmbeddingSettings,

    /// Generative model settings
    pub generation: GenerationSettings,

    /// Vector datastore settings
    pub retrieval: RetrievalSettings,

    /// Hybrid ranking and re-ranking settings
    pub ranking: RankingSettings,

    /// Answer synthesis settings
    pub synthesis: SynthesisSettings,

    /// Citation rendering settings
    pub citations: CitationSettings,

    /// Session store settings
    pub sessions: SessionSettings,

    /// HTTP server settings
    pub server: ServerSettings,

    /// Directory holding prompt overrides (`<id>.yml`)
    pub prompts_dir: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Log line format ("pretty" or "json")
    pub log_format: String,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Embedding service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EmbeddingSettings {
    /// Provider name: "openai", "ollama", "hash"
    pub provider: String,

    /// Base URL of the service; provider default when unset
    pub endpoint: Option<String>,

    /// Model identifier
    pub model: String,

    /// Target dimensionality `D` of every vector
    pub dimensions: usize,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            endpoint: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            timeout_secs: 30,
        }
    }
}

/// Generative model configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationSettings {
    /// Provider name: "openai", "ollama" or "none"
    pub provider: String,

    /// Base URL of the service; provider default when unset
    pub endpoint: Option<String>,

    /// Model identifier
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Sampling temperature for synthesis
    pub temperature: f32,

    /// Token cap for the synthesized answer
    pub max_tokens: u32,

    /// Use the model to re-rank the shortlist
    pub rerank: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            endpoint: None,
            model: "gpt-4o-mini".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            timeout_secs: 60,
            temperature: 0.2,
            max_tokens: 800,
            rerank: true,
        }
    }
}

impl GenerationSettings {
    /// Whether a generative model is configured at all.
    pub fn enabled(&self) -> bool {
        !self.provider.eq_ignore_ascii_case("none")
    }
}

/// Vector datastore configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrievalSettings {
    /// Backend: "pgvector" or "sqlite"
    pub backend: String,

    /// Postgres connection string (pgvector backend)
    pub database_url: Option<String>,

    /// SQLite corpus path (sqlite backend)
    pub sqlite_path: PathBuf,

    /// Table holding chunks and their embeddings
    pub chunks_table: String,

    /// Table holding parent document metadata
    pub documents_table: String,

    /// Candidates fetched per question (`K`)
    pub candidate_limit: usize,

    /// Maximum pooled datastore connections
    pub pool_size: u32,

    /// Distance metric: "cosine" or "l2"
    pub metric: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            backend: "pgvector".to_string(),
            database_url: None,
            sqlite_path: PathBuf::from(".docent/corpus.db"),
            chunks_table: "chunks".to_string(),
            documents_table: "documents".to_string(),
            candidate_limit: 20,
            pool_size: 8,
            metric: "cosine".to_string(),
        }
    }
}

/// Hybrid ranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RankingSettings {
    /// Lexical weight in the hybrid score
    pub alpha: f64,

    /// Shortlist size passed to the re-ranker (`N`)
    pub rerank_top_n: usize,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            rerank_top_n: 5,
        }
    }
}

/// Answer synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SynthesisSettings {
    /// Character bound of each passage in the context block
    pub context_snippet_chars: usize,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            context_snippet_chars: 800,
        }
    }
}

/// Citation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CitationSettings {
    /// Prefix joined with a document slug to form its canonical URL
    pub base_url: String,

    /// Character bound of citation excerpts
    pub excerpt_chars: usize,
}

impl Default for CitationSettings {
    fn default() -> Self {
        Self {
            base_url: "/docs".to_string(),
            excerpt_chars: 280,
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionSettings {
    /// SQLite file holding the session message log
    pub path: PathBuf,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".docent/sessions.db"),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    /// Address to bind (host:port)
    pub bind: String,

    /// Per-request deadline in seconds (0 disables it)
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl ServerSettings {
    /// Request deadline, or `None` when disabled.
    pub fn request_deadline(&self) -> Option<Duration> {
        deadline_from_secs(self.request_timeout_secs)
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceConfig>,
    embedding: Option<EmbeddingSettings>,
    generation: Option<GenerationSettings>,
    retrieval: Option<RetrievalSettings>,
    ranking: Option<RankingSettings>,
    synthesis: Option<SynthesisSettings>,
    citations: Option<CitationSettings>,
    sessions: Option<SessionSettings>,
    server: Option<ServerSettings>,
    prompts: Option<PromptsConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PromptsConfig {
    dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    format: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            embedding: EmbeddingSettings::default(),
            generation: GenerationSettings::default(),
            retrieval: RetrievalSettings::default(),
            ranking: RankingSettings::default(),
            synthesis: SynthesisSettings::default(),
            citations: CitationSettings::default(),
            sessions: SessionSettings::default(),
            server: ServerSettings::default(),
            prompts_dir: None,
            log_level: None,
            log_format: "pretty".to_string(),
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file and environment variables.
    ///
    /// Environment variables:
    /// - `DOCENT_WORKSPACE`: Override workspace path
    /// - `DOCENT_CONFIG`: Path to config file
    /// - `DOCENT_LLM_PROVIDER`: Generative model provider
    /// - `DOCENT_LLM_MODEL`: Generative model identifier
    /// - `DOCENT_EMBEDDING_MODEL`: Embedding model identifier
    /// - `DATABASE_URL`: Postgres connection string
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use docent_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Like [`AppConfig::load`], with workspace and config file paths from
    /// the command line. They win over `DOCENT_WORKSPACE`/`DOCENT_CONFIG` and
    /// over `workspace.path` in the file.
    ///
    /// An explicitly named config file must exist; the default
    /// `.docent/config.yaml` is optional.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(ws) = workspace
            .clone()
            .or_else(|| std::env::var("DOCENT_WORKSPACE").ok().map(PathBuf::from))
        {
            config.workspace = ws;
        }

        config.config_file =
            config_file.or_else(|| std::env::var("DOCENT_CONFIG").ok().map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        match config.config_file.clone() {
            Some(path) if !path.exists() => {
                return Err(AppError::Config(format!("Config file not found: {:?}", path)));
            }
            Some(path) => config = config.merge_yaml(&path)?,
            None => {
                let default_path = config.docent_dir().join("config.yaml");
                if default_path.exists() {
                    config = config.merge_yaml(&default_path)?;
                }
            }
        }

        if let Some(ws) = workspace {
            config.workspace = ws;
        }

        config.apply_env();
        Ok(config)
    }

    /// Environment variables override YAML config.
    fn apply_env(&mut self) {
        if let Ok(provider) = std::env::var("DOCENT_LLM_PROVIDER") {
            self.generation.provider = provider;
        }

        if let Ok(model) = std::env::var("DOCENT_LLM_MODEL") {
            self.generation.model = model;
        }

        if let Ok(model) = std::env::var("DOCENT_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.retrieval.database_url = Some(url);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();
        result.merge_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        Ok(result)
    }

    /// Merge YAML text into this config, section by section.
    fn merge_str(&mut self, contents: &str) -> Result<(), serde_yaml::Error> {
        let file: ConfigFile = serde_yaml::from_str(contents)?;

        if let Some(path) = file.workspace.and_then(|ws| ws.path) {
            self.workspace = PathBuf::from(path);
        }
        if let Some(embedding) = file.embedding {
            self.embedding = embedding;
        }
        if let Some(generation) = file.generation {
            self.generation = generation;
        }
        if let Some(retrieval) = file.retrieval {
            self.retrieval = retrieval;
        }
        if let Some(ranking) = file.ranking {
            self.ranking = ranking;
        }
        if let Some(synthesis) = file.synthesis {
            self.synthesis = synthesis;
        }
        if let Some(citations) = file.citations {
            self.citations = citations;
        }
        if let Some(sessions) = file.sessions {
            self.sessions = sessions;
        }
        if let Some(server) = file.server {
            self.server = server;
        }
        if let Some(dir) = file.prompts.and_then(|p| p.dir) {
            self.prompts_dir = Some(dir);
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
            if let Some(format) = logging.format {
                self.log_format = format;
            }
        }

        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the file.
    /// Workspace and config file flags go through [`AppConfig::load_with`].
    pub fn with_overrides(
        mut self,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(provider) = provider {
            self.generation.provider = provider;
        }

        if let Some(model) = model {
            self.generation.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .docent directory.
    pub fn docent_dir(&self) -> PathBuf {
        self.workspace.join(".docent")
    }

    /// Resolve a possibly relative path against the workspace.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Ensure the .docent directory exists.
    pub fn ensure_docent_dir(&self) -> AppResult<()> {
        let dir = self.docent_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .docent directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolve a secret from the environment variable named in config.
    pub fn resolve_secret(env_var: Option<&str>) -> Option<String> {
        env_var
            .and_then(|name| std::env::var(name).ok())
            .filter(|value| !value.trim().is_empty())
    }

    /// Validate the configuration before any service is built.
    pub fn validate(&self) -> AppResult<()> {
        check_known("embedding provider", &self.embedding.provider, &EMBEDDING_PROVIDERS)?;
        check_known(
            "generation provider",
            &self.generation.provider,
            &GENERATION_PROVIDERS,
        )?;
        check_known("retrieval backend", &self.retrieval.backend, &RETRIEVAL_BACKENDS)?;
        check_known("distance metric", &self.retrieval.metric, &DISTANCE_METRICS)?;

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ranking.alpha) {
            return Err(AppError::Config(format!(
                "Ranking alpha must be within [0, 1], got {}",
                self.ranking.alpha
            )));
        }

        if self.retrieval.candidate_limit == 0 {
            return Err(AppError::Config(
                "Retrieval candidate limit must be greater than zero".to_string(),
            ));
        }

        if self.ranking.rerank_top_n == 0 {
            return Err(AppError::Config(
                "Re-rank shortlist size must be greater than zero".to_string(),
            ));
        }

        if self.retrieval.backend == "pgvector" && self.retrieval.database_url.is_none() {
            return Err(AppError::Config(
                "pgvector backend requires retrieval.databaseUrl or DATABASE_URL".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_known(what: &str, value: &str, known: &[&str]) -> AppResult<()> {
    if known.contains(&value.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "Unknown {}: {}. Supported: {}",
            what,
            value,
            known.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.retrieval.backend = "sqlite".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.ranking.alpha, 0.6);
        assert_eq!(config.ranking.rerank_top_n, 5);
        assert_eq!(config.citations.excerpt_chars, 280);
        assert_eq!(config.synthesis.context_snippet_chars, 800);
        assert!(!config.verbose);
        assert!(!config.no_color);
    }

    #[test]
    fn test_docent_dir() {
        let config = AppConfig::default();
        assert!(config.docent_dir().ends_with(".docent"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            Some("ollama".to_string()),
            Some("llama3.2".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.generation.provider, "ollama");
        assert_eq!(overridden.generation.model, "llama3.2");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml_sections() {
        let mut config = AppConfig::default();
        config
            .merge_str(
                r#"
embedding:
  provider: hash
  dimensions: 8
ranking:
  alpha: 0.75
retrieval:
  backend: sqlite
  candidateLimit: 12
logging:
  level: debug
  color: false
  format: json
"#,
            )
            .unwrap();

        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.embedding.dimensions, 8);
        // Unspecified keys keep their section defaults
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.ranking.alpha, 0.75);
        assert_eq!(config.ranking.rerank_top_n, 5);
        assert_eq!(config.retrieval.candidate_limit, 12);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert!(config.no_color);
        assert_eq!(config.log_format, "json");
    }

    #[test]
    fn test_merge_yaml_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "generation:\n  provider: none\n").unwrap();

        let merged = AppConfig::default().merge_yaml(&path).unwrap();
        assert!(!merged.generation.enabled());
    }

    #[test]
    fn test_load_with_reads_named_config_file() {
        let workspace = tempfile::TempDir::new().unwrap();
        let elsewhere = tempfile::TempDir::new().unwrap();
        let custom = elsewhere.path().join("custom.yaml");
        std::fs::write(&custom, "ranking:\n  alpha: 0.9\n").unwrap();

        let config =
            AppConfig::load_with(Some(workspace.path().to_path_buf()), Some(custom.clone()))
                .unwrap();

        assert_eq!(config.ranking.alpha, 0.9);
        assert_eq!(config.config_file, Some(custom));
        assert_eq!(config.workspace, workspace.path());
    }

    #[test]
    fn test_load_with_workspace_finds_default_file() {
        let workspace = tempfile::TempDir::new().unwrap();
        let docent_dir = workspace.path().join(".docent");
        std::fs::create_dir_all(&docent_dir).unwrap();
        std::fs::write(
            docent_dir.join("config.yaml"),
            "workspace:\n  path: /somewhere/else\nretrieval:\n  candidateLimit: 7\n",
        )
        .unwrap();

        // Only meaningful when DOCENT_CONFIG is not pointing elsewhere
        if std::env::var("DOCENT_CONFIG").is_ok() {
            return;
        }
        let config = AppConfig::load_with(Some(workspace.path().to_path_buf()), None).unwrap();

        assert_eq!(config.retrieval.candidate_limit, 7);
        assert_eq!(config.workspace, workspace.path());
    }

    #[test]
    fn test_load_with_missing_named_file_is_error() {
        let workspace = tempfile::TempDir::new().unwrap();
        let missing = workspace.path().join("nope.yaml");

        let result = AppConfig::load_with(Some(workspace.path().to_path_buf()), Some(missing));
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("not found")));
    }

    #[test]
    fn test_zero_request_timeout_has_no_deadline() {
        let mut server = ServerSettings::default();
        assert_eq!(server.request_deadline(), Some(std::time::Duration::from_secs(60)));
        server.request_timeout_secs = 0;
        assert_eq!(server.request_deadline(), None);
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = sqlite_config();
        config.embedding.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_alpha_range() {
        let mut config = sqlite_config();
        config.ranking.alpha = 1.5;
        assert!(config.validate().is_err());
        config.ranking.alpha = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_pgvector_requires_url() {
        let mut config = AppConfig::default();
        config.retrieval.database_url = None;
        assert!(config.validate().is_err());
        config.retrieval.database_url = Some("postgres://localhost/docent".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_path() {
        let mut config = AppConfig::default();
        config.workspace = PathBuf::from("/srv/docent");
        assert_eq!(
            config.resolve_path(Path::new(".docent/corpus.db")),
            PathBuf::from("/srv/docent/.docent/corpus.db")
        );
        assert_eq!(
            config.resolve_path(Path::new("/var/lib/corpus.db")),
            PathBuf::from("/var/lib/corpus.db")
        );
    }
}
