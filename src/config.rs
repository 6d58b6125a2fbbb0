use std::net::SocketAddr;
use std::path::PathBuf;

/// Runtime settings for the service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Directory holding the SQLite database file.
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Config {
    /// Reads `CLASSHUBD_ADDR` and `CLASSHUBD_DATA_DIR` from the environment,
    /// falling back to the defaults for anything unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Config::default();
        if let Ok(addr) = std::env::var("CLASSHUBD_ADDR") {
            config.bind_addr = addr.parse()?;
        }
        if let Ok(dir) = std::env::var("CLASSHUBD_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }
}
