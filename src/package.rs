//! Application version metadata.
//!
//! `initialize` snapshots the host application's version into the device
//! record. Where that version comes from is up to the host, so it is read
//! through the [`PackageInfo`] trait.

use crate::error::FireLogError;

/// Version name and numeric version code of the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageVersion {
    pub name: String,
    pub code: u64,
}

impl PackageVersion {
    pub fn new(name: impl Into<String>, code: u64) -> Self {
        Self {
            name: name.into(),
            code,
        }
    }

    /// Parse a version from its textual parts.
    ///
    /// # Errors
    ///
    /// Returns `PackageMetadataUnavailable` if `code` is not a non-negative integer.
    pub fn parse(name: &str, code: &str) -> Result<Self, FireLogError> {
        let code = code.trim().parse::<u64>().map_err(|_| {
            FireLogError::PackageMetadataUnavailable(format!(
                "version code '{}' is not a valid number",
                code
            ))
        })?;
        Ok(Self::new(name, code))
    }
}

/// Source of the host application's version metadata.
pub trait PackageInfo: Send + Sync {
    fn package_version(&self) -> Result<PackageVersion, FireLogError>;
}

impl PackageInfo for PackageVersion {
    fn package_version(&self) -> Result<PackageVersion, FireLogError> {
        Ok(self.clone())
    }
}

/// Version metadata declared by the host, e.g. through environment variables.
///
/// Lookup fails when either part is missing or the code is malformed.
#[derive(Debug, Clone, Default)]
pub struct DeclaredPackage {
    pub name: Option<String>,
    pub code: Option<String>,
}

impl DeclaredPackage {
    pub fn new(name: Option<String>, code: Option<String>) -> Self {
        Self { name, code }
    }
}

impl PackageInfo for DeclaredPackage {
    fn package_version(&self) -> Result<PackageVersion, FireLogError> {
        let name = self.name.as_deref().ok_or_else(|| {
            FireLogError::PackageMetadataUnavailable("version name not declared".to_string())
        })?;
        let code = self.code.as_deref().ok_or_else(|| {
            FireLogError::PackageMetadataUnavailable("version code not declared".to_string())
        })?;
        PackageVersion::parse(name, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        let version = PackageVersion::parse("1.2.0", " 120 ").unwrap();
        assert_eq!(version, PackageVersion::new("1.2.0", 120));
    }

    #[test]
    fn test_parse_invalid_code() {
        let result = PackageVersion::parse("1.2.0", "v120");
        assert!(matches!(
            result,
            Err(FireLogError::PackageMetadataUnavailable(_))
        ));
    }

    #[test]
    fn test_declared_package_missing_parts() {
        let missing_name = DeclaredPackage::new(None, Some("3".to_string()));
        assert!(missing_name.package_version().is_err());

        let missing_code = DeclaredPackage::new(Some("1.0".to_string()), None);
        assert!(missing_code.package_version().is_err());

        let complete = DeclaredPackage::new(Some("1.0".to_string()), Some("3".to_string()));
        assert_eq!(complete.package_version().unwrap(), PackageVersion::new("1.0", 3));
    }
}
