use std::net::SocketAddr;

use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::mix::CapacityFactorProfile;
use crate::mix::ingest::DataSource;

const CONFIG_FILE: &str = "energymix.toml";
const ENV_PREFIX: &str = "ENERGYMIX__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub profile: CapacityFactorProfile,
    pub scenarios: ScenarioDefaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8051,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Local path or http(s) URL of the capacity factor CSV
    pub source: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: "scenarios/df_cf.csv".to_string(),
        }
    }
}

impl DataConfig {
    pub fn data_source(&self) -> DataSource {
        DataSource::parse(&self.source)
    }
}

/// Initial slider and window values for the chart page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefaults {
    pub nuclear_percent_a: f64,
    pub nuclear_percent_b: f64,
    pub duration_days: f64,
}

impl Default for ScenarioDefaults {
    fn default() -> Self {
        Self {
            nuclear_percent_a: 0.0,
            nuclear_percent_b: 20.0,
            duration_days: 7.0,
        }
    }
}

impl Config {
    /// Defaults, then `energymix.toml`, then `ENERGYMIX__*` env vars
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(CONFIG_FILE))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(figment)
            .extract()?;
        config.profile.validate()?;
        Ok(config)
    }
}
