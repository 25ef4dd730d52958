use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    /// Lifetime of an access token minted at signin.
    pub access_ttl_minutes: i64,
    /// Lifetime of an access token minted by the refresh flow. Deliberately
    /// longer than the signin one so refreshed sessions make fewer round-trips.
    pub refresh_access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Public base URL used to build verification links in outgoing mail.
    pub base_url: String,
    /// Directory where processed avatar images are written.
    pub avatar_dir: String,
    pub jwt: JwtConfig,
    pub smtp: SmtpConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let base_url =
            std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into());
        let avatar_dir = std::env::var("AVATAR_DIR").unwrap_or_else(|_| "public/avatars".into());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "authgate".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "authgate-users".into()),
            access_ttl_minutes: std::env::var("JWT_ACCESS_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(15),
            refresh_access_ttl_minutes: std::env::var("JWT_REFRESH_ACCESS_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 4),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 7),
        };
        let smtp = SmtpConfig {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".into()),
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(587),
            username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            from: std::env::var("SMTP_FROM").unwrap_or_else(|_| "no-reply@authgate.local".into()),
        };
        Ok(Self {
            database_url,
            base_url,
            avatar_dir,
            jwt,
            smtp,
        })
    }
}
