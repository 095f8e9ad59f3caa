use serde::{Deserialize, Serialize};

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_secs: u64,

    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pool_size(),
            pool_timeout_secs: default_pool_timeout(),
            statement_timeout_secs: default_statement_timeout(),
        }
    }
}

fn default_pool_size() -> u32 {
    20
}

fn default_pool_timeout() -> u64 {
    30
}

fn default_statement_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = DatabaseConfig::default();
        assert_eq!(c.pool_size, 20);
        assert_eq!(c.pool_timeout_secs, 30);
    }

    #[test]
    fn parses_minimal_toml() {
        let c: DatabaseConfig = toml::from_str(r#"url = "postgres://localhost/meridian""#).unwrap();
        assert_eq!(c.url, "postgres://localhost/meridian");
        assert_eq!(c.pool_size, 20);
    }
}
