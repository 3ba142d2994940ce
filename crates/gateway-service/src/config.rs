//! Service configuration

use gateway_core::{Address, BootstrapError, CoordinatorConfig, SigningAccount};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Gateway service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub contracts: ContractsConfig,

    #[serde(default)]
    pub signer: SignerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
        }
    }
}

/// Which ledger the gateway writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// JSON-RPC node
    Rpc,
    /// In-process development ledger
    #[default]
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackend,

    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,

    #[serde(default = "default_receipt_poll_interval")]
    pub receipt_poll_interval_ms: u64,

    /// Fixed gas price; the node's price is used when unset.
    #[serde(default)]
    pub gas_price_wei: Option<u64>,

    /// Upper bound for gas estimation; the node's block gas limit when unset.
    #[serde(default)]
    pub estimate_gas_ceiling: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::default(),
            rpc_url: default_rpc_url(),
            request_timeout_secs: default_request_timeout(),
            receipt_timeout_secs: default_receipt_timeout(),
            receipt_poll_interval_ms: default_receipt_poll_interval(),
            gas_price_wei: None,
            estimate_gas_ceiling: None,
        }
    }
}

impl LedgerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            gas_price: self.gas_price_wei,
            estimate_gas_ceiling: self.estimate_gas_ceiling,
            receipt_poll_interval: Duration::from_millis(self.receipt_poll_interval_ms),
            receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
            ..CoordinatorConfig::default()
        }
    }
}

/// Deployed contract addresses. Ignored by the memory backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractsConfig {
    #[serde(default)]
    pub stamper: Option<Address>,

    #[serde(default)]
    pub factory: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// File holding the operator key as hex. Takes precedence over `key_hex`.
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    #[serde(default)]
    pub key_hex: Option<String>,

    /// Refuse to start when the loaded key derives a different address.
    #[serde(default)]
    pub expected_address: Option<Address>,

    #[serde(default = "default_true")]
    pub verify_contract_owner: bool,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            key_file: None,
            key_hex: None,
            expected_address: None,
            verify_contract_owner: true,
        }
    }
}

impl SignerConfig {
    pub fn load_account(&self) -> Result<SigningAccount, BootstrapError> {
        let account = match (&self.key_file, &self.key_hex) {
            (Some(path), _) => SigningAccount::from_file(path)?,
            (None, Some(hex)) => SigningAccount::from_hex(hex)?,
            (None, None) => {
                return Err(BootstrapError::InvalidKey(
                    "no signing key configured".to_string(),
                ))
            }
        };

        if let Some(expected) = self.expected_address {
            if expected != account.address() {
                return Err(BootstrapError::SignerMismatch {
                    expected,
                    actual: account.address(),
                });
            }
        }
        Ok(account)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_receipt_timeout() -> u64 {
    120
}

fn default_receipt_poll_interval() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `GATEWAY_`-prefixed environment variables (`GATEWAY_LEDGER__RPC_URL`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&ServiceConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.listen_addr.port(), 5000);
        assert_eq!(config.ledger.backend, LedgerBackend::Memory);
        assert!(config.signer.verify_contract_owner);
        assert!(config.contracts.stamper.is_none());
    }

    #[test]
    fn test_coordinator_from_ledger_section() {
        let ledger = LedgerConfig {
            receipt_timeout_secs: 3,
            receipt_poll_interval_ms: 20,
            gas_price_wei: Some(7),
            ..LedgerConfig::default()
        };
        let coordinator = ledger.coordinator();
        assert_eq!(coordinator.receipt_timeout, Duration::from_secs(3));
        assert_eq!(coordinator.receipt_poll_interval, Duration::from_millis(20));
        assert_eq!(coordinator.gas_price, Some(7));
        assert_eq!(coordinator.estimate_gas_ceiling, None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
listen_addr = "0.0.0.0:8080"

[ledger]
backend = "rpc"
rpc_url = "http://node:8545"
estimate_gas_ceiling = 6000000

[contracts]
factory = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
"#
        )
        .unwrap();

        let config = ServiceConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.ledger.backend, LedgerBackend::Rpc);
        assert_eq!(config.ledger.rpc_url, "http://node:8545");
        assert_eq!(
            config.contracts.factory.map(|a| a.to_string()).as_deref(),
            Some("0x5FbDB2315678afecb367f032d93F642f64180aa3")
        );
        assert!(config.contracts.stamper.is_none());
        assert_eq!(config.ledger.receipt_timeout_secs, 120);
        assert_eq!(
            config.ledger.coordinator().estimate_gas_ceiling,
            Some(6_000_000)
        );
    }

    #[test]
    fn test_signer_requires_a_key() {
        let result = SignerConfig::default().load_account();
        assert!(matches!(result, Err(BootstrapError::InvalidKey(_))));
    }

    #[test]
    fn test_signer_expected_address() {
        let signer = SignerConfig {
            key_hex: Some(DEV_KEY.to_string()),
            expected_address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().ok(),
            ..SignerConfig::default()
        };
        assert!(signer.load_account().is_ok());

        let mismatched = SignerConfig {
            expected_address: Some(Address::ZERO),
            ..signer
        };
        assert!(matches!(
            mismatched.load_account(),
            Err(BootstrapError::SignerMismatch { .. })
        ));
    }

    #[test]
    fn test_key_file_takes_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{DEV_KEY}").unwrap();
        let signer = SignerConfig {
            key_file: Some(file.path().to_path_buf()),
            key_hex: Some("not a key".to_string()),
            ..SignerConfig::default()
        };
        let account = signer.load_account().unwrap();
        assert_eq!(
            account.address().to_string(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }
}
