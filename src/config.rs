use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server settings, from the command line or `BATCHSHEET_*` variables
#[derive(Debug, Clone, Parser)]
#[command(name = "batchsheet-server", version, about = "Serve CSV batches over HTTP")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "BATCHSHEET_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Directory holding the users file and per-user batch databases
    #[arg(long, env = "BATCHSHEET_DATA_DIR", default_value = "database")]
    pub data_dir: PathBuf,

    /// Directory served under /static
    #[arg(long, env = "BATCHSHEET_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,
}

impl ServerConfig {
    /// Defaults rooted at `data_dir`, for tests and embedding
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        ServerConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            data_dir: data_dir.into(),
            static_dir: PathBuf::from("static"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::try_parse_from(["batchsheet-server"]).unwrap();
        assert_eq!(config.bind.port(), 3000);
        assert_eq!(config.data_dir, PathBuf::from("database"));
    }

    #[test]
    fn test_flags_override() {
        let config = ServerConfig::try_parse_from([
            "batchsheet-server",
            "--bind",
            "0.0.0.0:8080",
            "--data-dir",
            "/tmp/data",
        ])
        .unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/data"));
    }
}
