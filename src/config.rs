use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::types::LLMProvider;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub storage: StorageConfig,
    pub extraction: ExtractionConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Without a URL the service keeps jobs and file records in memory
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub api_key: String,
    pub api_base: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LLMConfig {
    /// The configured key, or `None` when summaries must use the raw-context fallback
    pub fn active_api_key(&self) -> Option<String> {
        let key = self.api_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: String,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub s3_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    pub backend: String,
    pub chunk_size: usize,
    /// Tesseract languages, only used when built with the `ocr` feature
    pub ocr_languages: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub poll_interval_secs: u64,
    pub wait_budget_secs: u64,
    pub storage_workers: usize,
    pub extraction_workers: usize,
    pub render_workers: usize,
    pub summary_key_prefix: String,
    pub quality_check: bool,
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn wait_budget(&self) -> Duration {
        Duration::from_secs(self.wait_budget_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            wait_budget_secs: 300,
            storage_workers: 5,
            extraction_workers: 3,
            render_workers: 2,
            summary_key_prefix: "summaries".to_string(),
            quality_check: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            server: ServerConfig {
                port: or("PORT", "3000").parse()?,
                host: or("HOST", "0.0.0.0"),
                cors_allowed_origins: or("ALLOWED_ORIGINS", "http://localhost:3000,http://localhost:5173")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            database: DatabaseConfig {
                url: non_empty("DATABASE_URL"),
                max_connections: or("DB_MAX_CONNECTIONS", "10").parse()?,
                min_connections: or("DB_MIN_CONNECTIONS", "1").parse()?,
            },
            llm: LLMConfig {
                provider: or("LLM_PROVIDER", "openai").parse()?,
                api_key: or("OPENAI_API_KEY", ""),
                api_base: non_empty("LLM_API_BASE"),
                model: or("LLM_MODEL", "gpt-4o-mini"),
                temperature: or("LLM_TEMPERATURE", "0.3").parse()?,
                max_tokens: or("LLM_MAX_TOKENS", "2500").parse()?,
            },
            storage: StorageConfig {
                provider: or("STORAGE_PROVIDER", "s3"),
                s3_bucket: or("S3_BUCKET", "patient-summary-files"),
                s3_region: or("S3_REGION", "us-east-1"),
                s3_access_key_id: non_empty("AWS_ACCESS_KEY_ID"),
                s3_secret_access_key: non_empty("AWS_SECRET_ACCESS_KEY"),
                s3_endpoint: non_empty("S3_ENDPOINT"),
            },
            extraction: ExtractionConfig {
                backend: or("EXTRACTION_BACKEND", "routed"),
                chunk_size: or("CHUNK_SIZE", "1000").parse()?,
                ocr_languages: or("OCR_LANGUAGES", "eng"),
            },
            pipeline: PipelineConfig {
                poll_interval_secs: or("PIPELINE_POLL_INTERVAL_SECS", "5").parse()?,
                wait_budget_secs: or("PIPELINE_WAIT_BUDGET_SECS", "300").parse()?,
                storage_workers: or("STORAGE_WORKERS", "5").parse()?,
                extraction_workers: or("EXTRACTION_WORKERS", "3").parse()?,
                render_workers: or("RENDER_WORKERS", "2").parse()?,
                summary_key_prefix: or("SUMMARY_KEY_PREFIX", "summaries"),
                quality_check: or("ENABLE_QUALITY_CHECK", "false").to_lowercase().parse()?,
            },
            logging: LoggingConfig {
                log_dir: non_empty("LOG_DIR"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_with(&[]).unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(config.database.url.is_none());
        assert_eq!(config.llm.provider, LLMProvider::OpenAI);
        assert!(config.llm.active_api_key().is_none());
        assert_eq!(config.pipeline.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.pipeline.wait_budget(), Duration::from_secs(300));
        assert_eq!(config.pipeline.storage_workers, 5);
        assert_eq!(config.pipeline.extraction_workers, 3);
        assert!(!config.pipeline.quality_check);
        assert_eq!(config.extraction.backend, "routed");
        assert_eq!(config.extraction.ocr_languages, "eng");
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/summary"),
            ("OPENAI_API_KEY", " sk-test "),
            ("LLM_PROVIDER", "groq"),
            ("ENABLE_QUALITY_CHECK", "TRUE"),
            ("PIPELINE_WAIT_BUDGET_SECS", "30"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example"),
        ])
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/summary"));
        assert_eq!(config.llm.active_api_key().as_deref(), Some("sk-test"));
        assert_eq!(config.llm.provider, LLMProvider::Groq);
        assert!(config.pipeline.quality_check);
        assert_eq!(config.pipeline.wait_budget_secs, 30);
        assert_eq!(config.server.cors_allowed_origins.len(), 2);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        assert!(config_with(&[("PORT", "not-a-port")]).is_err());
        assert!(config_with(&[("LLM_PROVIDER", "nope")]).is_err());
    }
}
