// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StempelError};

/// Default printer name returned in `printer-name` and advertised via mDNS.
pub const DEFAULT_PRINTER_NAME: &str = "Stempel";

/// Default port for the IPP print server (IANA-assigned for IPP).
pub const DEFAULT_PORT: u16 = 631;

/// Default cap on the buffered operation/attribute section of a request.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 1024 * 1024; // 1 MiB

/// Settings for one virtual printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// Human-readable printer name.
    pub name: String,
    /// Printer URI.  When absent it is derived from the host name and port.
    pub uri: Option<String>,
    /// TCP port the server listens on.
    pub port: u16,
    /// Answer IPP/1.0 requests with a 1.0 version number.
    pub fallback: bool,
    /// Advertise the printer via mDNS-SD.
    pub discovery: bool,
    /// Upper bound for the attribute section of a single request.
    pub max_header_bytes: usize,
    /// Directory job documents are written to.  Discarded when unset.
    pub spool_dir: Option<PathBuf>,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_PRINTER_NAME.into(),
            uri: None,
            port: DEFAULT_PORT,
            fallback: true,
            discovery: true,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            spool_dir: None,
        }
    }
}

impl PrinterConfig {
    /// Read a JSON configuration file.  Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        if config.name.trim().is_empty() {
            return Err(StempelError::Config(format!(
                "{}: printer name must not be empty",
                path.display()
            )));
        }
        Ok(config)
    }

    /// The printer URI: the configured one, or `ipp://<host>:<port>/`.
    ///
    /// Job URIs are formed by appending the job id, so a derived URI always
    /// ends in a slash.
    pub fn resolved_uri(&self) -> String {
        match &self.uri {
            Some(uri) => uri.clone(),
            None => {
                let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into());
                format!("ipp://{hostname}:{}/", self.port)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = PrinterConfig::default();
        assert_eq!(config.name, "Stempel");
        assert_eq!(config.port, 631);
        assert!(config.fallback);
        assert!(config.discovery);
        assert!(config.uri.is_none());
        assert!(config.spool_dir.is_none());
    }

    #[test]
    fn explicit_uri_wins() {
        let config = PrinterConfig {
            uri: Some("ipp://printer.example:8631/".into()),
            ..Default::default()
        };
        assert_eq!(config.resolved_uri(), "ipp://printer.example:8631/");
    }

    #[test]
    fn derived_uri_ends_with_slash_and_port() {
        let config = PrinterConfig {
            port: 8631,
            ..Default::default()
        };
        let uri = config.resolved_uri();
        assert!(uri.starts_with("ipp://"));
        assert!(uri.ends_with(":8631/"));
    }

    #[test]
    fn load_fills_missing_fields_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "name": "Office", "port": 9631, "discovery": false }}"#).unwrap();

        let config = PrinterConfig::load(file.path()).unwrap();
        assert_eq!(config.name, "Office");
        assert_eq!(config.port, 9631);
        assert!(!config.discovery);
        assert!(config.fallback);
        assert_eq!(config.max_header_bytes, DEFAULT_MAX_HEADER_BYTES);
    }

    #[test]
    fn load_rejects_empty_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "name": "  " }}"#).unwrap();

        let err = PrinterConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, StempelError::Config(_)));
    }

    #[test]
    fn load_reports_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = PrinterConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, StempelError::Serialization(_)));
    }
}
