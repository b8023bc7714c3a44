// backupclerk/src/config/instance.rs
use std::fmt;

use crate::errors::{ClerkError, Result};

/// A managed database instance whose backups are mirrored.
///
/// `raw` keeps the identifier exactly as configured; it names the local
/// directory holding the instance's backups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceRef {
    pub raw: String,
    pub id: String,
    pub region: String,
}

impl InstanceRef {
    /// Parses `region/id` or a bare `id`, falling back to `default_region`.
    pub fn parse(raw: &str, default_region: Option<&str>) -> Result<Self> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('/').collect();

        let (region, id) = match parts.as_slice() {
            [id] => {
                let region = default_region
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| {
                        ClerkError::InvalidInstance(format!(
                            "{raw} has no region and no default region is configured"
                        ))
                    })?;
                (region, *id)
            }
            [region, id] => (*region, *id),
            _ => {
                return Err(ClerkError::InvalidInstance(format!("couldn't parse ID {raw}")));
            }
        };

        if id.is_empty() || region.is_empty() {
            return Err(ClerkError::InvalidInstance(format!(
                "{raw} has an empty id or region"
            )));
        }
        if parts.iter().any(|p| *p == "." || *p == "..") {
            return Err(ClerkError::InvalidInstance(format!(
                "{raw} contains a relative path component"
            )));
        }

        Ok(InstanceRef {
            raw: raw.to_string(),
            id: id.to_string(),
            region: region.to_string(),
        })
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
