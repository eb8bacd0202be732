use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::catalog_repository::PostgresCatalogRepositoryConfig;

/// Service settings, defaults overridden by environment variables such as
/// `USE_IN_MEMORY_DB=true` or `DB_HOST=db`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub use_in_memory_db: bool,
    pub db_host: String,
    pub db_username: String,
    pub db_password: String,
    pub bind_address: String,
    pub port: u16,
    /// Exposes `POST /users/`, for deployments without an identity provider
    pub allow_user_registration: bool,
    pub service_name: String,
    pub jaeger_enabled: bool,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::default().try_parsing(true))
    }

    fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("use_in_memory_db", false)?
            .set_default("db_host", "127.0.0.1")?
            .set_default("db_username", "postgres")?
            .set_default("db_password", "postgres")?
            .set_default("bind_address", "0.0.0.0")?
            .set_default("port", 8080)?
            .set_default("allow_user_registration", false)?
            .set_default("service_name", "bookstore_catalog")?
            .set_default("jaeger_enabled", true)?
            .add_source(environment)
            .build()?
            .try_deserialize()
    }

    pub fn postgres(&self) -> PostgresCatalogRepositoryConfig {
        PostgresCatalogRepositoryConfig {
            hostname: self.db_host.clone(),
            username: self.db_username.clone(),
            password: self.db_password.clone(),
        }
    }
}
