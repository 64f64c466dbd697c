//! Bus address parsing.

use std::fmt;

use pubsub_bridge_core::BusError;
use url::Url;

/// Which bus implementation an address selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusBackend {
    /// `redis://` or `rediss://`.
    Redis,
    /// `memory://`, an in-process bus.
    Memory,
}

/// A validated bus address.
///
/// `Display` never shows the password.
#[derive(Clone)]
pub struct BusAddress {
    url: Url,
    backend: BusBackend,
}

impl BusAddress {
    pub fn parse(raw: &str) -> Result<Self, BusError> {
        let url = Url::parse(raw).map_err(|e| BusError::InvalidAddress(format!("{raw}: {e}")))?;
        let backend = match url.scheme() {
            "redis" | "rediss" => BusBackend::Redis,
            "memory" => BusBackend::Memory,
            other => {
                return Err(BusError::InvalidAddress(format!(
                    "unsupported scheme '{other}'"
                )));
            }
        };

        if backend == BusBackend::Redis {
            if url.host_str().is_none_or(str::is_empty) {
                return Err(BusError::InvalidAddress("missing host".to_string()));
            }
            let db = url.path().trim_start_matches('/');
            if !db.is_empty() && db.parse::<u32>().is_err() {
                return Err(BusError::InvalidAddress(format!(
                    "database '{db}' is not a number"
                )));
            }
        }

        Ok(Self { url, backend })
    }

    pub fn backend(&self) -> BusBackend {
        self.backend
    }

    pub fn is_tls(&self) -> bool {
        self.url.scheme() == "rediss"
    }

    /// Password used for AUTH right after connecting.
    pub fn password(&self) -> Option<&str> {
        self.url.password()
    }

    /// The full address, credentials included.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.url.password().is_none() {
            return f.write_str(self.url.as_str());
        }
        let mut redacted = self.url.clone();
        // Only fails for URLs that cannot carry credentials, and this one does.
        let _ = redacted.set_password(Some("***"));
        f.write_str(redacted.as_str())
    }
}

impl fmt::Debug for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusAddress")
            .field("url", &self.to_string())
            .field("backend", &self.backend)
            .finish()
    }
}
