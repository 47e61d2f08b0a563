//! Demo server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "127.0.0.1"
//! port = 4402
//! account_address = "test.loopback.server"
//! rpc_secret = "$RPC_SECRET"
//! price = "10"
//! optional = false
//! ledger_ttl_secs = 3600
//! sweep_interval_secs = 60
//! credit_ordering = "after_fulfill"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `config.toml`)
//! - `HOST` - Override server bind address
//! - `PORT` - Override server port
//! - Any variable referenced by `$VAR` in the config file

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use i402::{CreditOrdering, Decimal, GatePolicy, LedgerConfig};
use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4402`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Interledger address of the loopback transport.
    #[serde(default = "default_account_address")]
    pub account_address: String,

    /// Bearer secret for the RPC route. The route is only mounted when set.
    #[serde(default)]
    pub rpc_secret: Option<String>,

    /// Price of the demo routes (default: `10`).
    #[serde(default = "default_price")]
    pub price: Decimal,

    /// Whether `/paid` lets unpaid requests through.
    #[serde(default)]
    pub optional: bool,

    /// Seconds after the last credit at which a balance expires. Unset keeps
    /// balances for the life of the process.
    #[serde(default)]
    pub ledger_ttl_secs: Option<u64>,

    /// Seconds between expired-balance sweeps (default: `60`).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// When inbound payments are credited relative to fulfillment.
    #[serde(default)]
    pub credit_ordering: CreditOrdering,
}

const fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    4402
}

fn default_account_address() -> String {
    "test.loopback.server".to_owned()
}

fn default_price() -> Decimal {
    Decimal::TEN
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

impl ServerConfig {
    /// Loads configuration from the path given by the `CONFIG` environment
    /// variable, falling back to `config.toml` in the current directory.
    ///
    /// A missing file yields the defaults. `HOST` and `PORT` env vars
    /// override the file values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or an
    /// override is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(Path::new(&path))
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or an
    /// override is malformed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        let env = |name: &str| std::env::var(name).ok();
        let mut config = Self::parse(&content, env)?;
        config.apply_overrides(env)?;
        Ok(config)
    }

    /// Parses TOML after expanding `$VAR` references through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the expanded text is not a valid
    /// configuration.
    pub fn parse(
        content: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(toml::from_str(&expand_env_vars(content, &lookup))?)
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("HOST") {
            self.host = value
                .parse()
                .map_err(|_| ConfigError::InvalidOverride { name: "HOST", value })?;
        }
        if let Some(value) = lookup("PORT") {
            self.port = value
                .parse()
                .map_err(|_| ConfigError::InvalidOverride { name: "PORT", value })?;
        }
        Ok(())
    }

    /// Address to bind.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// RPC secret, unless unset, empty, or an unresolved `$VAR`.
    #[must_use]
    pub fn rpc_secret(&self) -> Option<&str> {
        self.rpc_secret
            .as_deref()
            .map(str::trim)
            .filter(|secret| !secret.is_empty() && !secret.starts_with('$'))
    }

    /// Gate policy of the `/paid` route.
    #[must_use]
    pub const fn policy(&self) -> GatePolicy {
        if self.optional {
            GatePolicy::Optional
        } else {
            GatePolicy::Required
        }
    }

    /// Ledger settings derived from `ledger_ttl_secs`.
    #[must_use]
    pub fn ledger_config(&self) -> LedgerConfig {
        match self.ledger_ttl_secs {
            Some(secs) => LedgerConfig::default().with_entry_ttl(Duration::from_secs(secs)),
            None => LedgerConfig::default(),
        }
    }

    /// Interval between expired-balance sweeps, at least one second.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Expands `$VAR` and `${VAR}` patterns through `lookup`.
///
/// Unresolved variables are left as-is.
fn expand_env_vars(input: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];

        // (variable name, length of the reference after the `$`)
        let (name, len) = match after.strip_prefix('{') {
            Some(braced) => braced.find('}').map_or(("", 0), |end| (&braced[..end], end + 2)),
            None => {
                let end = after
                    .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                    .unwrap_or(after.len());
                (&after[..end], end)
            }
        };

        if name.is_empty() {
            out.push('$');
            rest = after;
            continue;
        }
        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[dollar..=dollar + len]),
        }
        rest = &after[len..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = ServerConfig::parse("", vars(&[])).unwrap();
        assert_eq!(config.socket_addr(), "0.0.0.0:4402".parse::<SocketAddr>().unwrap());
        assert_eq!(config.account_address, "test.loopback.server");
        assert_eq!(config.price, Decimal::TEN);
        assert_eq!(config.policy(), GatePolicy::Required);
        assert_eq!(config.credit_ordering, CreditOrdering::AfterFulfill);
        assert_eq!(config.rpc_secret(), None);
        assert_eq!(config.ledger_config().entry_ttl, None);
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn parses_every_field() {
        let toml = r#"
            host = "127.0.0.1"
            port = 8080
            account_address = "g.example.gate"
            rpc_secret = "hunter2"
            price = "0.25"
            optional = true
            ledger_ttl_secs = 30
            sweep_interval_secs = 0
            credit_ordering = "before_fulfill"
        "#;
        let config = ServerConfig::parse(toml, vars(&[])).unwrap();
        assert_eq!(config.socket_addr(), "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.account_address, "g.example.gate");
        assert_eq!(config.rpc_secret(), Some("hunter2"));
        assert_eq!(config.price, Decimal::new(25, 2));
        assert_eq!(config.policy(), GatePolicy::Optional);
        assert_eq!(
            config.ledger_config().entry_ttl,
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.credit_ordering, CreditOrdering::BeforeFulfill);
    }

    #[test]
    fn unknown_credit_ordering_is_rejected() {
        let err = ServerConfig::parse(r#"credit_ordering = "eventually""#, vars(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn expands_plain_and_braced_variables() {
        let lookup = vars(&[("SECRET", "s3"), ("ACCOUNT", "test.env")]);
        assert_eq!(expand_env_vars("a=$SECRET;", &lookup), "a=s3;");
        assert_eq!(expand_env_vars("${ACCOUNT}.gate", &lookup), "test.env.gate");
        assert_eq!(expand_env_vars("$MISSING ${ALSO}", &lookup), "$MISSING ${ALSO}");
        assert_eq!(expand_env_vars("cost: $ 5 ${", &lookup), "cost: $ 5 ${");
    }

    #[test]
    fn unresolved_secret_counts_as_unset() {
        let config = ServerConfig::parse(r#"rpc_secret = "$RPC_SECRET""#, vars(&[])).unwrap();
        assert_eq!(config.rpc_secret(), None);

        let config =
            ServerConfig::parse(r#"rpc_secret = "$RPC_SECRET""#, vars(&[("RPC_SECRET", "ok")]))
                .unwrap();
        assert_eq!(config.rpc_secret(), Some("ok"));
    }

    #[test]
    fn host_and_port_overrides_apply() {
        let mut config = ServerConfig::parse("port = 1", vars(&[])).unwrap();
        config
            .apply_overrides(vars(&[("HOST", "127.0.0.1"), ("PORT", "9000")]))
            .unwrap();
        assert_eq!(config.socket_addr(), "127.0.0.1:9000".parse::<SocketAddr>().unwrap());

        let err = config
            .apply_overrides(vars(&[("PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidOverride { name: "PORT", .. }
        ));
    }
}
