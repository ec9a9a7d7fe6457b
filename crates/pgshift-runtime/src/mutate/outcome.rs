use serde::Serialize;

/// What a mutation did. Fatal failures are the `Err` arm of the surrounding
/// `Result` and never show up here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MutationOutcome {
    /// The DDL ran.
    Applied,
    /// The desired state was already in place; nothing ran.
    AlreadySatisfied,
    /// The DDL was refused and rolled back to its savepoint. The migration
    /// carries on without this change.
    FailedSoft {
        reason: String,
        /// Statement an operator can run by hand once the data allows it.
        remediation: Option<String>,
    },
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied)
    }

    pub fn is_soft_failure(&self) -> bool {
        matches!(self, MutationOutcome::FailedSoft { .. })
    }

    pub(crate) fn failed(reason: impl std::fmt::Display, remediation: Option<String>) -> Self {
        MutationOutcome::FailedSoft {
            reason: reason.to_string(),
            remediation,
        }
    }
}

impl std::fmt::Display for MutationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationOutcome::Applied => write!(f, "applied"),
            MutationOutcome::AlreadySatisfied => write!(f, "already satisfied"),
            MutationOutcome::FailedSoft { reason, .. } => write!(f, "failed: {}", reason),
        }
    }
}

/// How `convert_column` reached the new type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionPath {
    /// int4 -> int8 through the widening engine.
    Widened,
    /// `ALTER COLUMN ... TYPE` accepted as is.
    InPlace,
    /// Rename, add, copy through a cast, drop.
    CopyCast,
}

impl ConversionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionPath::Widened => "widened",
            ConversionPath::InPlace => "in_place",
            ConversionPath::CopyCast => "copy_cast",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_predicates() {
        assert!(MutationOutcome::Applied.is_applied());
        assert!(!MutationOutcome::AlreadySatisfied.is_applied());
        let failed = MutationOutcome::failed("violates not-null", Some("ALTER ...".into()));
        assert!(failed.is_soft_failure());
        assert_eq!(failed.to_string(), "failed: violates not-null");
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let value = serde_json::to_value(MutationOutcome::AlreadySatisfied).unwrap();
        assert_eq!(value, serde_json::json!({ "status": "already_satisfied" }));
    }

    #[test]
    fn test_conversion_path_names_match_serde() {
        for path in [ConversionPath::Widened, ConversionPath::InPlace, ConversionPath::CopyCast] {
            assert_eq!(serde_json::to_value(path).unwrap(), path.as_str());
        }
    }
}
