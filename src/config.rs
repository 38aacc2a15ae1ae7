//! Server configuration

use std::env;
use std::path::PathBuf;

use crate::constants::DEFAULT_MAP_SIZE;
use crate::error::{PermError, Result};
use crate::schema::Catalog;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,

    /// LMDB environment directory
    pub db_path: PathBuf,

    /// Admin secret; `None` means every request is treated as admin-authorized
    pub admin_secret: Option<String>,

    /// JSON catalog file describing the default source's tables
    pub catalog_path: Option<PathBuf>,

    /// LMDB map size in bytes
    pub map_size: usize,
}

impl ServerConfig {
    /// Load from `TABLEGATE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: parse_var("TABLEGATE_PORT", 8080)?,

            db_path: env::var("TABLEGATE_DB_PATH").unwrap_or_else(|_| "tablegate_data".to_string()).into(),

            admin_secret: env::var("TABLEGATE_ADMIN_SECRET").ok().filter(|s| !s.is_empty()),

            catalog_path: env::var("TABLEGATE_CATALOG").ok().filter(|s| !s.is_empty()).map(PathBuf::from),

            map_size: parse_var("TABLEGATE_MAP_SIZE", DEFAULT_MAP_SIZE)?,
        })
    }

    /// The configured catalog, or an empty one
    pub fn load_catalog(&self) -> Result<Catalog> {
        let Some(path) = &self.catalog_path else {
            return Ok(Catalog::new());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| PermError::ValidationFailed(format!("cannot read catalog {}: {e}", path.display())))?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(v) => v.trim().parse().map_err(|_| PermError::ValidationFailed(format!("{name} is not valid: {v:?}"))),
        Err(_) => Ok(default),
    }
}
