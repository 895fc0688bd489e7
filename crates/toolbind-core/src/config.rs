//! Host configuration: which remote tool hosts exist and how to reach them.
//!
//! The configuration document is TOML, one `[hosts.<name>]` table per host.
//! `${VAR}` placeholders anywhere in the document are resolved from the
//! process environment before parsing, so credentials never live in the
//! file itself:
//!
//! ```toml
//! [hosts.filesystem]
//! transport = "stdio"
//! command = "npx"
//! args = ["-y", "@modelcontextprotocol/server-filesystem", "/workspace"]
//!
//! [hosts.linear]
//! transport = "http"
//! url = "https://mcp.linear.app/mcp"
//! headers = { Authorization = "Bearer ${LINEAR_API_KEY}" }
//! ```

use crate::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Transport-specific connection parameters for one host.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum HostTransport {
    /// A local subprocess speaking newline-framed JSON-RPC over stdio.
    Stdio {
        /// Executable to spawn.
        command: String,
        /// Arguments passed to the executable.
        #[serde(default)]
        args: Vec<String>,
        /// Environment entries layered over the inherited environment.
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// A network endpoint speaking JSON-RPC over streamable HTTP.
    Http {
        /// Endpoint URL.
        url: String,
        /// Static headers attached to every request (e.g. bearer credentials).
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// One configured remote tool host. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct HostDescriptor {
    /// Logical name, unique within the configuration. Used as the key for
    /// connection caching and on-disk binding directories.
    pub name: String,
    /// How to reach the host.
    pub transport: HostTransport,
}

impl HostDescriptor {
    /// Validates the descriptor beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("host name cannot be empty".into()));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::Config(format!(
                "host name '{}' must be alphanumeric with '_' or '-'",
                self.name
            )));
        }
        match &self.transport {
            HostTransport::Stdio { command, .. } => {
                if command.is_empty() {
                    return Err(Error::Config(format!(
                        "host '{}': command cannot be empty",
                        self.name
                    )));
                }
            }
            HostTransport::Http { url, .. } => {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(Error::Config(format!(
                        "host '{}': url must be http(s), got '{}'",
                        self.name, url
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    hosts: HashMap<String, HostTransport>,
}

/// The parsed configuration document: host name → descriptor.
#[derive(Debug, Clone, Default)]
pub struct HostsConfig {
    hosts: HashMap<String, HostDescriptor>,
}

impl HostsConfig {
    /// Parses a TOML document, resolving `${VAR}` placeholders from the
    /// process environment first. An unresolvable placeholder is a hard
    /// config error rather than a literal that fails later.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let expanded = expand_env_placeholders(raw)?;
        let parsed: RawConfig = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;

        let mut hosts = HashMap::new();
        for (name, transport) in parsed.hosts {
            let descriptor = HostDescriptor {
                name: name.clone(),
                transport,
            };
            descriptor.validate()?;
            hosts.insert(name, descriptor);
        }
        Ok(Self { hosts })
    }

    /// Reads and parses a configuration file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Looks up one host by name.
    pub fn get(&self, name: &str) -> Option<&HostDescriptor> {
        self.hosts.get(name)
    }

    /// All configured hosts, in arbitrary order.
    pub fn hosts(&self) -> impl Iterator<Item = &HostDescriptor> {
        self.hosts.values()
    }

    /// Number of configured hosts.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether no hosts are configured.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Replaces every `${VAR}` occurrence with the value of the `VAR`
/// environment variable. Fails on the first placeholder that has no value.
fn expand_env_placeholders(raw: &str) -> Result<String> {
    // Unwrap is fine: the pattern is a literal and covered by tests.
    #[allow(clippy::unwrap_used)]
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();

    let mut missing: Option<String> = None;
    let expanded = pattern.replace_all(raw, |caps: &regex::Captures<'_>| {
        let var = &caps[1];
        match std::env::var(var) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var) => Err(Error::Config(format!(
            "environment variable '{var}' referenced in config is not set"
        ))),
        None => Ok(expanded.into_owned()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [hosts.filesystem]
        transport = "stdio"
        command = "npx"
        args = ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
        env = { NODE_ENV = "production" }

        [hosts.linear]
        transport = "http"
        url = "https://mcp.linear.app/mcp"
    "#;

    #[test]
    fn test_parse_both_transports() {
        let config = HostsConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.len(), 2);

        match &config.get("filesystem").unwrap().transport {
            HostTransport::Stdio { command, args, env } => {
                assert_eq!(command, "npx");
                assert_eq!(args.len(), 3);
                assert_eq!(env.get("NODE_ENV").unwrap(), "production");
            }
            other => panic!("expected stdio transport, got {other:?}"),
        }

        match &config.get("linear").unwrap().transport {
            HostTransport::Http { url, headers } => {
                assert_eq!(url, "https://mcp.linear.app/mcp");
                assert!(headers.is_empty());
            }
            other => panic!("expected http transport, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_document() {
        let config = HostsConfig::from_toml_str("").unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_unknown_host_lookup() {
        let config = HostsConfig::from_toml_str(SAMPLE).unwrap();
        assert!(config.get("nope").is_none());
    }

    #[test]
    fn test_env_placeholder_expansion() {
        std::env::set_var("TOOLBIND_TEST_TOKEN", "s3cr3t");
        let raw = r#"
            [hosts.api]
            transport = "http"
            url = "https://example.com/mcp"
            headers = { Authorization = "Bearer ${TOOLBIND_TEST_TOKEN}" }
        "#;
        let config = HostsConfig::from_toml_str(raw).unwrap();
        match &config.get("api").unwrap().transport {
            HostTransport::Http { headers, .. } => {
                assert_eq!(headers.get("Authorization").unwrap(), "Bearer s3cr3t");
            }
            other => panic!("expected http transport, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_env_placeholder_is_config_error() {
        let raw = r#"
            [hosts.api]
            transport = "http"
            url = "https://example.com/mcp"
            headers = { Authorization = "Bearer ${TOOLBIND_TEST_DEFINITELY_UNSET}" }
        "#;
        let err = HostsConfig::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("TOOLBIND_TEST_DEFINITELY_UNSET"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let raw = r#"
            [hosts.bad]
            transport = "http"
            url = "ftp://example.com"
        "#;
        assert!(matches!(
            HostsConfig::from_toml_str(raw),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_empty_command_rejected() {
        let raw = r#"
            [hosts.bad]
            transport = "stdio"
            command = ""
        "#;
        assert!(matches!(
            HostsConfig::from_toml_str(raw),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_host_name_charset() {
        let raw = r#"
            [hosts."no spaces"]
            transport = "stdio"
            command = "server"
        "#;
        assert!(matches!(
            HostsConfig::from_toml_str(raw),
            Err(Error::Config(_))
        ));
    }
}
