//! Process-wide configuration, loaded once at startup from environment
//! variables (spec §6.5). Parsing failures are fatal — we fail fast rather
//! than run with a half-valid configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub max_file_size: u64,
    pub hierarchical_chunk_sizes: [usize; 3],
    pub hierarchical_overlap: usize,
    pub embedding_dimension: usize,
    pub context_budget_chars: usize,
    pub llm_temperature_default: f32,
    pub llm_parallelism: usize,
    pub sse_heartbeat: Duration,
    pub cache_ttl_embedding: Duration,
    pub cache_ttl_expansion: Duration,
    pub sqlite_path: String,
    pub lance_db_dir: String,
    pub redis_url: String,
    pub llm_base_url: String,
    pub default_llm_model: String,
    pub embedding_model: String,
    pub upload_dir: String,
    pub bind_addr: String,
}

impl Config {
    /// Loads configuration from environment, falling back to an optional
    /// `.env` file for local development (mirrors `dotenvy::dotenv()` usage
    /// seen throughout the reference corpus).
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .set_default("max_file_size", 52_428_800i64)?
            .set_default("hierarchical_overlap", 200i64)?
            .set_default("embedding_dimension", 768i64)?
            .set_default("context_budget_chars", 6000i64)?
            .set_default("llm_temperature_default", 0.7)?
            .set_default("llm_parallelism", 4i64)?
            .set_default("sse_heartbeat_seconds", 15i64)?
            .set_default("cache_ttl_embedding", 86_400i64)?
            .set_default("cache_ttl_expansion", 3_600i64)?
            .set_default("sqlite_path", "data/docrag.sqlite3")?
            .set_default("lance_db_dir", "data/vectors")?
            .set_default("redis_url", "redis://127.0.0.1:6379")?
            .set_default("llm_base_url", "http://127.0.0.1:11434/v1")?
            .set_default("default_llm_model", "gpt-4o-mini")?
            .set_default("embedding_model", "text-embedding-3-small")?
            .set_default("upload_dir", "data/uploads")?
            .set_default("bind_addr", "0.0.0.0:3000")?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let sizes_raw: String = settings
            .get_string("hierarchical_chunk_sizes")
            .unwrap_or_else(|_| "2000,1000,500".to_string());
        let hierarchical_chunk_sizes = parse_three_sizes(&sizes_raw)?;

        Ok(Config {
            max_file_size: settings.get_int("max_file_size")? as u64,
            hierarchical_chunk_sizes,
            hierarchical_overlap: settings.get_int("hierarchical_overlap")? as usize,
            embedding_dimension: settings.get_int("embedding_dimension")? as usize,
            context_budget_chars: settings.get_int("context_budget_chars")? as usize,
            llm_temperature_default: settings.get_float("llm_temperature_default")? as f32,
            llm_parallelism: settings.get_int("llm_parallelism")? as usize,
            sse_heartbeat: Duration::from_secs(settings.get_int("sse_heartbeat_seconds")? as u64),
            cache_ttl_embedding: Duration::from_secs(settings.get_int("cache_ttl_embedding")? as u64),
            cache_ttl_expansion: Duration::from_secs(settings.get_int("cache_ttl_expansion")? as u64),
            sqlite_path: settings.get_string("sqlite_path")?,
            lance_db_dir: settings.get_string("lance_db_dir")?,
            redis_url: settings.get_string("redis_url")?,
            llm_base_url: settings.get_string("llm_base_url")?,
            default_llm_model: settings.get_string("default_llm_model")?,
            embedding_model: settings.get_string("embedding_model")?,
            upload_dir: settings.get_string("upload_dir")?,
            bind_addr: settings.get_string("bind_addr")?,
        })
    }
}

fn parse_three_sizes(raw: &str) -> anyhow::Result<[usize; 3]> {
    let parts: Vec<usize> = raw
        .split(',')
        .map(|s| s.trim().parse::<usize>())
        .collect::<std::result::Result<_, _>>()?;
    match parts.as_slice() {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => anyhow::bail!("HIERARCHICAL_CHUNK_SIZES must have exactly 3 comma-separated sizes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_sizes() {
        assert_eq!(parse_three_sizes("2000,1000,500").unwrap(), [2000, 1000, 500]);
        assert!(parse_three_sizes("2000,1000").is_err());
    }
}
