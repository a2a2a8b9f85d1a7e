use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub trusted_hosts: Vec<String>,
    pub dev_auth_overrides_enabled: bool,
    pub auth_jwt_secret: Option<String>,
    pub rate_limit_enabled: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub request_timeout_seconds: u64,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub db_pool_idle_timeout_seconds: u64,
    pub run_migrations: bool,
    pub stripe_webhook_secret: Option<String>,
    pub max_open_tickets_per_unit: usize,
    pub ownership_cache_ttl_seconds: u64,
    pub ownership_cache_max_entries: u64,
    pub scheduler_enabled: bool,
    pub scheduler_poll_seconds: u64,
    pub daily_jobs_hour_utc: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. `from_env` passes the
    /// process environment; tests pass a fixed map.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = EnvVars { lookup };
        Self {
            app_name: vars.or("APP_NAME", "Leaseflow API"),
            environment: vars.or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&vars.or("API_PREFIX", "/v1")),
            host: vars.or("HOST", "0.0.0.0"),
            port: vars.parse_or("PORT", 8000),
            cors_origins: parse_csv(&vars.or("CORS_ORIGINS", "http://localhost:3000")),
            trusted_hosts: parse_csv(&vars.or("TRUSTED_HOSTS", "localhost,127.0.0.1")),
            dev_auth_overrides_enabled: vars.bool_or("DEV_AUTH_OVERRIDES_ENABLED", false),
            auth_jwt_secret: vars.opt("AUTH_JWT_SECRET"),
            rate_limit_enabled: vars.bool_or("RATE_LIMIT_ENABLED", true),
            rate_limit_per_second: vars.parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: vars.parse_or("RATE_LIMIT_BURST_SIZE", 100),
            request_timeout_seconds: vars.parse_or("REQUEST_TIMEOUT_SECONDS", 30),
            database_url: vars.opt("DATABASE_URL"),
            db_pool_max_connections: vars.parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: vars.parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: vars.parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            db_pool_idle_timeout_seconds: vars.parse_or("DB_POOL_IDLE_TIMEOUT_SECONDS", 600),
            run_migrations: vars.bool_or("RUN_MIGRATIONS", true),
            stripe_webhook_secret: vars.opt("STRIPE_WEBHOOK_SECRET"),
            max_open_tickets_per_unit: vars.parse_or("MAX_OPEN_TICKETS_PER_UNIT", 5),
            ownership_cache_ttl_seconds: vars.parse_or("OWNERSHIP_CACHE_TTL_SECONDS", 300),
            ownership_cache_max_entries: vars.parse_or("OWNERSHIP_CACHE_MAX_ENTRIES", 10000),
            scheduler_enabled: vars.bool_or("SCHEDULER_ENABLED", true),
            scheduler_poll_seconds: vars.parse_or("SCHEDULER_POLL_SECONDS", 60),
            daily_jobs_hour_utc: vars.parse_or("DAILY_JOBS_HOUR_UTC", 5).min(23),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    pub fn auth_dev_overrides_enabled(&self) -> bool {
        if self.is_production() {
            return false;
        }
        self.dev_auth_overrides_enabled
    }

    /// Unsigned webhooks are only tolerated outside production when no
    /// secret has been configured.
    pub fn accepts_unsigned_webhooks(&self) -> bool {
        !self.is_production() && self.stripe_webhook_secret.is_none()
    }
}

struct EnvVars<F> {
    lookup: F,
}

impl<F> EnvVars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn opt(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> T
    where
        T: std::str::FromStr + Copy,
    {
        self.opt(key)
            .and_then(|raw| raw.parse::<T>().ok())
            .unwrap_or(default)
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.opt(key).as_deref().map(str::to_ascii_lowercase) {
            Some(value) if matches!(value.as_str(), "1" | "true" | "yes" | "on") => true,
            Some(value) if matches!(value.as_str(), "0" | "false" | "no" | "off") => false,
            Some(_) => default,
            None => default,
        }
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/v1".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}
