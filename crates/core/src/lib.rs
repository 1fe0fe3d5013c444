pub mod domain;
pub mod llm;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum StoreBackend {
        #[default]
        Postgres,
        Memory,
    }

    impl FromStr for StoreBackend {
        type Err = anyhow::Error;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.trim().to_ascii_lowercase().as_str() {
                "postgres" | "pg" => Ok(StoreBackend::Postgres),
                "memory" | "mem" => Ok(StoreBackend::Memory),
                other => anyhow::bail!("unknown STORE_BACKEND: {other} (expected postgres|memory)"),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub store_backend: StoreBackend,
        pub anthropic_api_key: Option<String>,
        pub anthropic_base_url: Option<String>,
        pub anthropic_model: Option<String>,
        pub anthropic_max_tokens: Option<u32>,
        pub anthropic_timeout_secs: Option<u64>,
        pub sentry_dsn: Option<String>,
        pub port: u16,
        pub cors_allow_origin: Option<String>,
    }

    fn var(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        var(name)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| anyhow::anyhow!("{e}"))
                    .with_context(|| format!("invalid {name}: {raw}"))
            })
            .transpose()
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: var("DATABASE_URL"),
                store_backend: parse_var("STORE_BACKEND")?.unwrap_or_default(),
                anthropic_api_key: var("ANTHROPIC_API_KEY"),
                anthropic_base_url: var("ANTHROPIC_BASE_URL"),
                anthropic_model: var("ANTHROPIC_MODEL"),
                anthropic_max_tokens: parse_var("ANTHROPIC_MAX_TOKENS")?,
                anthropic_timeout_secs: parse_var("ANTHROPIC_TIMEOUT_SECS")?,
                sentry_dsn: var("SENTRY_DSN"),
                port: parse_var("PORT")?.unwrap_or(3000),
                cors_allow_origin: var("CORS_ALLOW_ORIGIN"),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }
    }

}
