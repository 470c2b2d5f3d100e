use amc_core::Config;
use amc_storage::Store;
use clap::Args;
use std::time::{SystemTime, UNIX_EPOCH};

/// Flags shared by every subcommand: which tenant and which database file.
#[derive(Args, Debug, Clone)]
pub struct Global {
    /// Tenant id the call is scoped to.
    #[arg(long, global = true, env = "AMC_TENANT_ID")]
    pub tenant: String,

    /// SQLite path; falls back to `AMC_DB_DSN` / the config default.
    #[arg(long, global = true)]
    pub db: Option<String>,
}

impl Global {
    pub fn open_store(&self) -> anyhow::Result<Store> {
        let config = Config::from_env();
        let path = self.db.clone().unwrap_or(config.db_dsn);
        Ok(Store::open(path)?)
    }
}

pub fn now_micros() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_micros() as i64
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn parse_csv(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}
