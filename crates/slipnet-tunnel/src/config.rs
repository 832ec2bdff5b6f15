//! Tunnel Configuration
//!
//! Server profiles, resolver entries and the virtual-interface parameters
//! the orchestrator hands to its collaborators.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

/// How the tunnel engine treats a resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverMode {
    /// Queries go through a recursive resolver
    Recursive,
    /// Queries go straight to the tunnel domain's authoritative server
    Authoritative,
}

impl std::fmt::Display for ResolverMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolverMode::Recursive => write!(f, "recursive"),
            ResolverMode::Authoritative => write!(f, "authoritative"),
        }
    }
}

/// One upstream DNS resolver used by the tunnel engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Resolver host (IP address or hostname)
    pub host: String,
    /// Resolver port
    #[serde(default = "default_dns_port")]
    pub port: u16,
    /// Whether the resolver is the authoritative server for the domain
    #[serde(default)]
    pub authoritative: bool,
}

fn default_dns_port() -> u16 {
    53
}

impl ResolverConfig {
    /// Create a recursive resolver entry on port 53
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_dns_port(),
            authoritative: false,
        }
    }

    /// Mark this resolver as authoritative
    pub fn authoritative(mut self) -> Self {
        self.authoritative = true;
        self
    }

    pub fn mode(&self) -> ResolverMode {
        if self.authoritative {
            ResolverMode::Authoritative
        } else {
            ResolverMode::Recursive
        }
    }
}

impl std::fmt::Display for ResolverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} ({})", self.host, self.port, self.mode())
    }
}

/// Congestion control algorithm requested from the tunnel engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionControl {
    Bbr,
    Dcubic,
}

impl CongestionControl {
    pub fn as_str(&self) -> &'static str {
        match self {
            CongestionControl::Bbr => "bbr",
            CongestionControl::Dcubic => "dcubic",
        }
    }
}

impl std::str::FromStr for CongestionControl {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bbr" => Ok(CongestionControl::Bbr),
            "dcubic" => Ok(CongestionControl::Dcubic),
            _ => Err(ConfigError::InvalidCongestionControl(s.to_string())),
        }
    }
}

/// A tunnel server profile
///
/// Owned by the profile store; the orchestrator only reads it for the
/// duration of one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProfile {
    /// Stable identifier
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Tunnel domain served by the remote end
    pub domain: String,
    /// Upstream resolvers, in preference order
    pub resolvers: Vec<ResolverConfig>,
    /// Host the engine's local proxy binds to
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    /// Port the engine's local proxy binds to
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Congestion control (engine default when unset)
    #[serde(default)]
    pub congestion_control: Option<CongestionControl>,
    /// Keep-alive interval in milliseconds
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u32,
    /// Generic segmentation offload
    #[serde(default)]
    pub gso_enabled: bool,
    /// Verbose logging of DNS polling inside the engine
    #[serde(default)]
    pub debug_poll: bool,
    /// Verbose logging of engine streams
    #[serde(default)]
    pub debug_streams: bool,
}

fn default_listen_host() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    1080
}

fn default_keep_alive_ms() -> u32 {
    200
}

impl ServerProfile {
    /// Create a profile with default tuning
    pub fn new(id: impl Into<String>, domain: impl Into<String>, resolvers: Vec<ResolverConfig>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            domain: domain.into(),
            resolvers,
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            congestion_control: None,
            keep_alive_ms: default_keep_alive_ms(),
            gso_enabled: false,
            debug_poll: false,
            debug_streams: false,
        }
    }

    /// Name for display, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }

    /// Parsed listen address of the engine's local proxy
    pub fn listen_ip(&self) -> Result<IpAddr, ConfigError> {
        self.listen_host
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddress(self.listen_host.clone()))
    }

    /// Validate the profile before any startup step runs
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_domain(&self.domain)?;

        if self.resolvers.is_empty() {
            return Err(ConfigError::NoResolvers);
        }
        for resolver in &self.resolvers {
            if resolver.host.trim().is_empty() || resolver.port == 0 {
                return Err(ConfigError::InvalidResolver(format!(
                    "{}:{}",
                    resolver.host, resolver.port
                )));
            }
        }

        self.listen_ip()?;
        if self.listen_port == 0 {
            return Err(ConfigError::InvalidListenAddress(format!(
                "{}:{}",
                self.listen_host, self.listen_port
            )));
        }

        Ok(())
    }
}

fn validate_domain(domain: &str) -> Result<(), ConfigError> {
    let trimmed = domain.trim_end_matches('.');
    if trimmed.is_empty() || trimmed.len() > 253 {
        return Err(ConfigError::InvalidDomain(domain.to_string()));
    }
    let labels_ok = trimmed.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    });
    if !labels_ok {
        return Err(ConfigError::InvalidDomain(domain.to_string()));
    }
    Ok(())
}

/// Virtual interface parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Interface MTU
    #[serde(default = "default_mtu")]
    pub mtu: u16,
    /// Address assigned to the interface
    #[serde(default = "default_local_address")]
    pub address: Ipv4Addr,
    /// Prefix length of the interface address
    #[serde(default = "default_address_prefix")]
    pub address_prefix: u8,
    /// Route installed through the interface
    #[serde(default = "default_route")]
    pub route: Ipv4Addr,
    /// Prefix length of the route
    #[serde(default)]
    pub route_prefix: u8,
    /// DNS server advertised inside the tunnel
    #[serde(default = "default_dns_server")]
    pub dns_server: Ipv4Addr,
}

fn default_mtu() -> u16 {
    1500
}

fn default_local_address() -> Ipv4Addr {
    Ipv4Addr::new(10, 255, 255, 1)
}

fn default_address_prefix() -> u8 {
    32
}

fn default_route() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_dns_server() -> Ipv4Addr {
    Ipv4Addr::new(8, 8, 8, 8)
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            mtu: default_mtu(),
            address: default_local_address(),
            address_prefix: default_address_prefix(),
            route: default_route(),
            route_prefix: 0,
            dns_server: default_dns_server(),
        }
    }
}

impl InterfaceConfig {
    /// Interface address in CIDR notation
    pub fn local_cidr(&self) -> String {
        format!("{}/{}", self.address, self.address_prefix)
    }

    /// Route in CIDR notation
    pub fn route_cidr(&self) -> String {
        format!("{}/{}", self.route, self.route_prefix)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mtu < 576 {
            return Err(ConfigError::InvalidMtu(self.mtu));
        }
        if self.address_prefix > 32 || self.route_prefix > 32 {
            return Err(ConfigError::InvalidPrefix);
        }
        Ok(())
    }
}

/// A set of profiles loaded from a TOML or JSON document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSet {
    #[serde(default)]
    pub profiles: Vec<ServerProfile>,
}

impl ProfileSet {
    /// Load from TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from JSON file
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&content)
    }

    /// Load from JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a file, picking the format by extension
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// Export as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Export as JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Find profile by id
    pub fn find(&self, id: &str) -> Option<&ServerProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid tunnel domain: {0:?}")]
    InvalidDomain(String),

    #[error("No resolvers configured")]
    NoResolvers,

    #[error("Invalid resolver: {0}")]
    InvalidResolver(String),

    #[error("Invalid listen address: {0}")]
    InvalidListenAddress(String),

    #[error("Invalid congestion control: {0}")]
    InvalidCongestionControl(String),

    #[error("Invalid MTU: {0} (minimum 576)")]
    InvalidMtu(u16),

    #[error("Invalid prefix length")]
    InvalidPrefix,

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ServerProfile {
        ServerProfile::new("p1", "t.example.com", vec![ResolverConfig::new("8.8.8.8")])
    }

    #[test]
    fn test_profile_defaults() {
        let p = profile();
        assert_eq!(p.listen_host, "127.0.0.1");
        assert_eq!(p.listen_port, 1080);
        assert_eq!(p.resolvers[0].port, 53);
        assert_eq!(p.resolvers[0].mode(), ResolverMode::Recursive);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_profile_validation() {
        let mut p = profile();
        p.domain = "".into();
        assert!(matches!(p.validate(), Err(ConfigError::InvalidDomain(_))));

        let mut p = profile();
        p.resolvers.clear();
        assert_eq!(p.validate(), Err(ConfigError::NoResolvers));

        let mut p = profile();
        p.resolvers[0].port = 0;
        assert!(matches!(p.validate(), Err(ConfigError::InvalidResolver(_))));

        let mut p = profile();
        p.listen_host = "localhost".into();
        assert!(matches!(p.validate(), Err(ConfigError::InvalidListenAddress(_))));
    }

    #[test]
    fn test_interface_defaults() {
        let iface = InterfaceConfig::default();
        assert_eq!(iface.mtu, 1500);
        assert_eq!(iface.local_cidr(), "10.255.255.1/32");
        assert_eq!(iface.route_cidr(), "0.0.0.0/0");
        assert!(iface.validate().is_ok());

        let small = InterfaceConfig { mtu: 500, ..InterfaceConfig::default() };
        assert_eq!(small.validate(), Err(ConfigError::InvalidMtu(500)));
    }

    #[test]
    fn test_profile_set_from_toml() {
        let set = ProfileSet::from_toml(
            r#"
            [[profiles]]
            id = "home"
            domain = "t.example.com"
            congestion_control = "bbr"
            gso_enabled = true

            [[profiles.resolvers]]
            host = "1.1.1.1"

            [[profiles.resolvers]]
            host = "203.0.113.5"
            port = 5353
            authoritative = true
            "#,
        )
        .unwrap();

        let p = set.find("home").unwrap();
        assert_eq!(p.congestion_control, Some(CongestionControl::Bbr));
        assert!(p.gso_enabled);
        assert_eq!(p.keep_alive_ms, 200);
        assert_eq!(p.resolvers[1].port, 5353);
        assert_eq!(p.resolvers[1].mode(), ResolverMode::Authoritative);
        assert!(set.find("missing").is_none());
    }

    #[test]
    fn test_profile_set_json_export() {
        let set = ProfileSet { profiles: vec![profile()] };
        let json = set.to_json().unwrap();
        let back = ProfileSet::from_json(&json).unwrap();
        assert_eq!(back.profiles, set.profiles);
    }

    #[test]
    fn test_congestion_control_parse() {
        assert_eq!("BBR".parse::<CongestionControl>(), Ok(CongestionControl::Bbr));
        assert!("reno".parse::<CongestionControl>().is_err());
    }
}
