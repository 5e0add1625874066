use config::ConfigError;

use crate::auth::HashParams;
use crate::error::ConfigError as SettingsError;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub hashing: HashingSettings,
}

impl Settings {
    /// Reject settings the service must not start with
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.jwt.secret.is_empty() {
            return Err(SettingsError::MissingRequired("jwt.secret".to_string()));
        }
        if self.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(SettingsError::InvalidValue(format!(
                "jwt.secret must be at least {} characters",
                MIN_JWT_SECRET_LENGTH
            )));
        }
        if self.jwt.access_token_expiry <= 0 || self.jwt.refresh_token_expiry <= 0 {
            return Err(SettingsError::InvalidValue(
                "token expiries must be positive".to_string(),
            ));
        }
        if self.hashing.max_concurrent == 0 {
            return Err(SettingsError::InvalidValue(
                "hashing.max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Server-level connection, used to create a database before migrating it
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_expiry: i64,   // seconds (default 1800 = 30 minutes)
    pub refresh_token_expiry: i64,  // seconds (default 604800 = 7 days)
    pub issuer: String,
}

/// Argon2id cost parameters used for *new* hashes, plus the cap on
/// concurrently running hash computations.
#[derive(serde::Deserialize, Clone, Debug)]
pub struct HashingSettings {
    pub memory_cost: u32,   // KiB
    pub time_cost: u32,
    pub parallelism: u32,
    pub max_concurrent: usize,
}

impl HashingSettings {
    pub fn params(&self) -> HashParams {
        HashParams::new(self.memory_cost, self.time_cost, self.parallelism)
    }
}

impl Default for HashingSettings {
    fn default() -> Self {
        let params = HashParams::default();
        Self {
            memory_cost: params.memory_cost,
            time_cost: params.time_cost,
            parallelism: params.parallelism,
            max_concurrent: 8,
        }
    }
}

/// Load settings from `configuration.yaml` (optional) overlaid with
/// `APP__SECTION__KEY` environment variables.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .set_default("application.host", "127.0.0.1")?
        .set_default("application.port", 8080)?
        .set_default("jwt.access_token_expiry", 1800)?
        .set_default("jwt.refresh_token_expiry", 604800)?
        .set_default("jwt.issuer", "tokenkeeper")?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;
    settings.try_deserialize::<Settings>()
}
