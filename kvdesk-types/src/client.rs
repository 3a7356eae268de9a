//! Consul endpoint identification.
//!
//! A [`ConsulClient`] names one cluster endpoint. Identity is the
//! `(host, port, scheme)` triple; the display name is cosmetic and is
//! ignored by equality and hashing.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// URL scheme used to reach the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "HTTPS")]
    Https,
}

impl Scheme {
    /// Lower-case scheme as used in URLs.
    #[must_use]
    pub const fn as_url_scheme(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("HTTP"),
            Scheme::Https => f.write_str("HTTPS"),
        }
    }
}

impl FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            _ => Err(Error::InvalidScheme(s.to_string())),
        }
    }
}

/// Host name or IP address of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Host(String);

impl Host {
    /// Validates a host. Empty hosts, whitespace and embedded schemes are rejected.
    pub fn new(host: impl Into<String>) -> Result<Self> {
        let host = host.into();
        let trimmed = host.trim();
        if trimmed.is_empty()
            || trimmed.contains(char::is_whitespace)
            || trimmed.contains("://")
            || trimmed.contains('/')
        {
            return Err(Error::InvalidHost(host));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Host {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<Host> for String {
    fn from(host: Host) -> Self {
        host.0
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// TCP port, 1 through 65535.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u16")]
pub struct Port(u16);

impl Port {
    /// Validates a port number.
    pub fn new(port: u32) -> Result<Self> {
        match u16::try_from(port) {
            Ok(p) if p >= 1 => Ok(Self(p)),
            _ => Err(Error::InvalidPort(port)),
        }
    }

    #[must_use]
    pub const fn get(&self) -> u16 {
        self.0
    }
}

impl TryFrom<u32> for Port {
    type Error = Error;

    fn try_from(port: u32) -> Result<Self> {
        Self::new(port)
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A target Consul cluster endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsulClient {
    /// Display label; empty for ad-hoc connections.
    #[serde(default)]
    pub name: String,
    pub host: Host,
    pub port: Port,
    pub scheme: Scheme,
}

impl ConsulClient {
    /// Creates an endpoint with an empty display name.
    pub fn new(host: Host, port: Port, scheme: Scheme) -> Self {
        Self {
            name: String::new(),
            host,
            port,
            scheme,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Base address, e.g. `http://localhost:8500`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_url_scheme(), self.host, self.port)
    }

    /// The identity triple.
    #[must_use]
    pub fn identity(&self) -> (&Host, Port, Scheme) {
        (&self.host, self.port, self.scheme)
    }

    /// Label for logs and listings: the name if set, otherwise the address.
    #[must_use]
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.address()
        } else {
            self.name.clone()
        }
    }
}

impl PartialEq for ConsulClient {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for ConsulClient {}

impl Hash for ConsulClient {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Display for ConsulClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str(&self.address())
        } else {
            write!(f, "{} ({})", self.name, self.address())
        }
    }
}
