use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dotenv::dotenv;
use reqwest::Client;

use crate::sheets::auth::{ServiceAccount, TokenSource, DEFAULT_TOKEN_URI};
use crate::sheets::google::{Endpoint, GoogleSheets, SHEETS_API};
use crate::sheets::memory::MemoryStore;
use crate::sheets::SheetStore;

pub const DEFAULT_EMPLOYEE_TABLE: &str = "Employees";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone)]
pub enum StoreSettings {
    Google {
        spreadsheet_id: String,
        account: ServiceAccount,
    },
    Memory {
        seed: Option<PathBuf>,
    },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub store: StoreSettings,
    pub employee_table: String,
    pub host: IpAddr,
    pub port: u16,
}

impl Settings {
    /// Reads the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .with_context(|| format!("{} env var must be set!", key))
        };

        let store = match lookup("FIELDSHEET_STORE").as_deref().unwrap_or("google") {
            "google" => StoreSettings::Google {
                spreadsheet_id: required("SPREADSHEET_ID")?,
                account: ServiceAccount::new(
                    required("GOOGLE_CLIENT_EMAIL")?,
                    &required("GOOGLE_PRIVATE_KEY")?,
                    lookup("GOOGLE_TOKEN_URI").unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
                ),
            },
            "memory" => StoreSettings::Memory {
                seed: lookup("FIELDSHEET_SEED").map(PathBuf::from),
            },
            other => bail!("FIELDSHEET_STORE must be `google` or `memory`, not `{}`", other),
        };

        let host: IpAddr = lookup("FIELDSHEET_HOST")
            .unwrap_or_else(|| DEFAULT_HOST.to_string())
            .parse()
            .context("FIELDSHEET_HOST must be an IP address")?;
        let port: u16 = match lookup("FIELDSHEET_PORT") {
            Some(port) => port.parse().context("FIELDSHEET_PORT must be a port number")?,
            None => DEFAULT_PORT,
        };

        Ok(Settings {
            store,
            employee_table: lookup("SHEET_EMPLOYEE")
                .unwrap_or_else(|| DEFAULT_EMPLOYEE_TABLE.to_string()),
            host,
            port,
        })
    }

    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn connect_store(&self) -> Result<Arc<dyn SheetStore>> {
        match &self.store {
            StoreSettings::Google {
                spreadsheet_id,
                account,
            } => {
                let client = Client::new();
                let tokens = TokenSource::new(account.clone(), client.clone())
                    .context("Failed to load service account credentials")?;
                let endpoint = Endpoint::new(SHEETS_API, spreadsheet_id)?;
                Ok(Arc::new(GoogleSheets::new(client, endpoint, tokens)))
            }
            StoreSettings::Memory { seed: Some(path) } => {
                Ok(Arc::new(MemoryStore::from_seed_file(path)?))
            }
            StoreSettings::Memory { seed: None } => Ok(Arc::new(MemoryStore::new())),
        }
    }
}
