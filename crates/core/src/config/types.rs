use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

use crate::executor::{ExecutorConfig, StorageConfig};
use crate::scheduler::SchedulerConfig;
use crate::updater::{BinaryConfig, UpdaterConfig};

/// Root configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub binary: BinaryConfig,
    #[serde(default)]
    pub updater: UpdaterConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}
