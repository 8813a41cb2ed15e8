use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub cookie_secure: bool,
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_secure: true,
            cleanup_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub session: SessionConfig,
    pub templates_dir: String,
    pub static_dir: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => database_url_from_parts()?,
        };
        let port = std::env::var("PORT")
            .or_else(|_| std::env::var("APP_PORT"))
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(4000);

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            cookie_secure: std::env::var("SESSION_COOKIE_SECURE")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(defaults.cookie_secure),
            cleanup_interval_secs: std::env::var("SESSION_CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.cleanup_interval_secs),
        };

        Ok(Self {
            database_url,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            session,
            templates_dir: std::env::var("TEMPLATES_DIR").unwrap_or_else(|_| "./ui/html".into()),
            static_dir: std::env::var("STATIC_DIR").unwrap_or_else(|_| "./ui/static".into()),
        })
    }
}

fn database_url_from_parts() -> anyhow::Result<String> {
    let host = std::env::var("DB_HOST")?;
    let name = std::env::var("DB_DATABASE_NAME")?;
    let username = std::env::var("DB_USERNAME")?;
    let password = std::env::var("DB_PASSWORD")?;
    let port = std::env::var("DB_PORT").unwrap_or_else(|_| "5432".into());
    Ok(format!(
        "postgres://{}:{}@{}:{}/{}",
        username, password, host, port, name
    ))
}
