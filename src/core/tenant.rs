use std::fmt;

use crate::services::errors::AssessmentError;

const MAX_TENANT_LEN: usize = 128;

/// Opaque key of the school that owns a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TenantId(String);

impl TenantId {
    pub(crate) fn parse(raw: &str) -> Result<Self, AssessmentError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(AssessmentError::Unauthorized("tenant context is missing".into()));
        }
        if value.len() > MAX_TENANT_LEN || value.chars().any(char::is_control) {
            return Err(AssessmentError::Unauthorized("tenant context is malformed".into()));
        }
        Ok(Self(value.to_string()))
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_rejects_blank() {
        assert_eq!(TenantId::parse("  school-7 ").unwrap().as_str(), "school-7");
        assert!(matches!(TenantId::parse("   "), Err(AssessmentError::Unauthorized(_))));
        assert!(matches!(TenantId::parse("a\nb"), Err(AssessmentError::Unauthorized(_))));
    }
}
