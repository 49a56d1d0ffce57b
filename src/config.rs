use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis
    pub redis_url: String,

    // JWT (tokens are issued by the Telegram login flow)
    pub jwt_secret: String,

    // Matchmaking
    pub matchmaking_cache_ttl_secs: u64,
    pub matchmaking_candidate_limit: i64,

    // Rate Limiting
    pub rate_limit_battle_actions: u32,
    pub rate_limit_window_secs: u64,

    // CORS
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,

            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            jwt_secret: env::var("JWT_SECRET")?,

            matchmaking_cache_ttl_secs: env::var("MATCHMAKING_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            matchmaking_candidate_limit: env::var("MATCHMAKING_CANDIDATE_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            rate_limit_battle_actions: env::var("RATE_LIMIT_BATTLE_ACTIONS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET is empty");
        }
        if self.matchmaking_candidate_limit <= 0 {
            anyhow::bail!("MATCHMAKING_CANDIDATE_LIMIT must be > 0");
        }

        if self.jwt_secret.contains("super_secret") {
            tracing::warn!("Detected dev credentials in config");
        }
        if self.matchmaking_cache_ttl_secs == 0 {
            tracing::warn!("MATCHMAKING_CACHE_TTL_SECS is 0; every quick match will hit the database");
        }
        if self.rate_limit_battle_actions == 0 || self.rate_limit_window_secs == 0 {
            tracing::warn!("Rate limit values should be > 0");
        }
        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        environment: "test".to_string(),
        database_url: "postgres://localhost/battles".to_string(),
        database_max_connections: 1,
        redis_url: "redis://localhost:6379".to_string(),
        jwt_secret: "test_secret".to_string(),
        matchmaking_cache_ttl_secs: 30,
        matchmaking_candidate_limit: 10,
        rate_limit_battle_actions: 60,
        rate_limit_window_secs: 60,
        cors_allowed_origins: "*".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_test_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_secret() {
        let mut config = test_config();
        config.jwt_secret = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_candidate_limit() {
        let mut config = test_config();
        config.matchmaking_candidate_limit = 0;
        assert!(config.validate().is_err());
    }
}
