//! WebSocket origin allow-list.

use std::collections::HashSet;

/// Which `Origin` headers may open a WebSocket.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    any: bool,
    allowed: HashSet<String>,
}

impl OriginPolicy {
    /// Build from configured origins. A `"*"` entry allows every origin,
    /// including requests that send none.
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut policy = Self::default();
        for origin in origins {
            let origin = origin.into();
            let origin = origin.trim().trim_end_matches('/');
            if origin == "*" {
                policy.any = true;
            } else if !origin.is_empty() {
                policy.allowed.insert(origin.to_ascii_lowercase());
            }
        }
        policy
    }

    /// Allow every origin.
    pub fn any() -> Self {
        Self {
            any: true,
            allowed: HashSet::new(),
        }
    }

    pub fn allows(&self, origin: Option<&str>) -> bool {
        if self.any {
            return true;
        }
        match origin {
            Some(origin) => self
                .allowed
                .contains(&origin.trim_end_matches('/').to_ascii_lowercase()),
            None => false,
        }
    }
}
