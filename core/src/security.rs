//! Insecurity policy flags.
//!
//! A set of named relaxations of the default security policy. The fetch
//! pipeline carries these around without interpreting them; whichever
//! component actually verifies signatures or enforces TLS checks them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DepotError;

const IMAGE: u16 = 1 << 0;
const TLS: u16 = 1 << 1;
const ONDISK: u16 = 1 << 2;
const HTTP: u16 = 1 << 3;
const PUBKEY: u16 = 1 << 4;
const CAPABILITIES: u16 = 1 << 5;
const PATHS: u16 = 1 << 6;
const SECCOMP: u16 = 1 << 7;

const ALL_FETCH: u16 = IMAGE | TLS | HTTP | PUBKEY;
const ALL_RUN: u16 = CAPABILITIES | PATHS | SECCOMP;
const ALL: u16 = ALL_FETCH | ALL_RUN | ONDISK;

/// Single options, in display order.
const NAMED: &[(&str, u16)] = &[
    ("image", IMAGE),
    ("tls", TLS),
    ("ondisk", ONDISK),
    ("http", HTTP),
    ("pubkey", PUBKEY),
    ("capabilities", CAPABILITIES),
    ("paths", PATHS),
    ("seccomp", SECCOMP),
];

/// Set of security checks the user asked to skip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InsecureOptions(u16);

impl InsecureOptions {
    /// No relaxations.
    pub fn none() -> Self {
        Self(0)
    }

    /// Every relaxation.
    pub fn all() -> Self {
        Self(ALL)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn skip_image_check(&self) -> bool {
        self.0 & IMAGE != 0
    }

    pub fn skip_tls_check(&self) -> bool {
        self.0 & TLS != 0
    }

    pub fn skip_ondisk_check(&self) -> bool {
        self.0 & ONDISK != 0
    }

    pub fn allow_http(&self) -> bool {
        self.0 & HTTP != 0
    }

    pub fn consider_insecure_pubkeys(&self) -> bool {
        self.0 & PUBKEY != 0
    }

    pub fn skip_capabilities(&self) -> bool {
        self.0 & CAPABILITIES != 0
    }

    pub fn skip_paths(&self) -> bool {
        self.0 & PATHS != 0
    }

    pub fn skip_seccomp(&self) -> bool {
        self.0 & SECCOMP != 0
    }

    fn lookup(name: &str) -> Option<u16> {
        match name {
            "none" => Some(0),
            "all" => Some(ALL),
            "all-fetch" => Some(ALL_FETCH),
            "all-run" => Some(ALL_RUN),
            _ => NAMED.iter().find(|(n, _)| *n == name).map(|(_, bit)| *bit),
        }
    }
}

impl FromStr for InsecureOptions {
    type Err = DepotError;

    /// Parse a comma-separated list such as `image,tls` or `all-fetch`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bits = 0;
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let bit = Self::lookup(&name.to_ascii_lowercase()).ok_or_else(|| {
                let known: Vec<&str> = NAMED.iter().map(|(n, _)| *n).collect();
                DepotError::ConfigError(format!(
                    "unknown insecure option '{}' (supported: none, all, all-fetch, all-run, {})",
                    name,
                    known.join(", ")
                ))
            })?;
            bits |= bit;
        }
        Ok(Self(bits))
    }
}

impl fmt::Display for InsecureOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = NAMED
            .iter()
            .filter(|(_, bit)| self.0 & bit != 0)
            .map(|(n, _)| *n)
            .collect();
        f.write_str(&names.join(","))
    }
}

impl TryFrom<String> for InsecureOptions {
    type Error = DepotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InsecureOptions> for String {
    fn from(value: InsecureOptions) -> Self {
        value.to_string()
    }
}
