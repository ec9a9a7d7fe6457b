use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PgShiftError;

/// Referential action taken when a referenced row is deleted.
///
/// Deserializes through [`FromStr`], so plans accept `"set_null"`,
/// `"SET NULL"` and `"n"` alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum OnDelete {
    Restrict,
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
}

impl OnDelete {
    /// SQL keyword form used in `ON DELETE ...`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::Restrict => "RESTRICT",
            OnDelete::NoAction => "NO ACTION",
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::SetDefault => "SET DEFAULT",
        }
    }

    /// Code stored in `pg_constraint.confdeltype`.
    pub fn catalog_code(&self) -> char {
        match self {
            OnDelete::Restrict => 'r',
            OnDelete::NoAction => 'a',
            OnDelete::Cascade => 'c',
            OnDelete::SetNull => 'n',
            OnDelete::SetDefault => 'd',
        }
    }

    /// Inverse of [`OnDelete::catalog_code`], ignoring case.
    pub fn from_catalog_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "r" => Some(OnDelete::Restrict),
            "a" => Some(OnDelete::NoAction),
            "c" => Some(OnDelete::Cascade),
            "n" => Some(OnDelete::SetNull),
            "d" => Some(OnDelete::SetDefault),
            _ => None,
        }
    }

    /// Parse a keyword or catalog code, falling back to `NO ACTION` (the
    /// engine default) for anything unrecognised.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for OnDelete {
    type Err = PgShiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(action) = Self::from_catalog_code(s) {
            return Ok(action);
        }
        let normalized = s
            .trim()
            .to_ascii_uppercase()
            .replace(['_', '-'], " ");
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.as_str() {
            "RESTRICT" => Ok(OnDelete::Restrict),
            "NO ACTION" => Ok(OnDelete::NoAction),
            "CASCADE" => Ok(OnDelete::Cascade),
            "SET NULL" => Ok(OnDelete::SetNull),
            "SET DEFAULT" => Ok(OnDelete::SetDefault),
            _ => Err(PgShiftError::InvalidArgument(format!(
                "unknown ON DELETE action: {}",
                s
            ))),
        }
    }
}

impl TryFrom<String> for OnDelete {
    type Error = PgShiftError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for OnDelete {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A desired single-column foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyBinding {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    #[serde(default)]
    pub on_delete: OnDelete,
}

impl ForeignKeyBinding {
    pub fn new(
        source_table: impl Into<String>,
        source_column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
        on_delete: OnDelete,
    ) -> Self {
        Self {
            source_table: source_table.into(),
            source_column: source_column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
            on_delete,
        }
    }
}

/// A foreign key constraint found on a source column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingForeignKey {
    /// Constraint name, needed to drop it.
    pub name: String,
    pub target_table: String,
    pub target_column: String,
    pub on_delete: OnDelete,
}

impl ExistingForeignKey {
    /// Whether this constraint already is the desired binding.
    pub fn matches(&self, desired: &ForeignKeyBinding) -> bool {
        self.target_table == desired.target_table
            && self.target_column == desired.target_column
            && self.on_delete == desired.on_delete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords() {
        assert_eq!("cascade".parse::<OnDelete>().unwrap(), OnDelete::Cascade);
        assert_eq!("SET NULL".parse::<OnDelete>().unwrap(), OnDelete::SetNull);
        assert_eq!("set_null".parse::<OnDelete>().unwrap(), OnDelete::SetNull);
        assert_eq!("no  action".parse::<OnDelete>().unwrap(), OnDelete::NoAction);
        assert_eq!("Set-Default".parse::<OnDelete>().unwrap(), OnDelete::SetDefault);
        assert!("nullify".parse::<OnDelete>().is_err());
    }

    #[test]
    fn test_parse_catalog_codes() {
        assert_eq!("n".parse::<OnDelete>().unwrap(), OnDelete::SetNull);
        assert_eq!("C".parse::<OnDelete>().unwrap(), OnDelete::Cascade);
        assert_eq!("r".parse::<OnDelete>().unwrap(), OnDelete::Restrict);
        assert_eq!("a".parse::<OnDelete>().unwrap(), OnDelete::NoAction);
        assert_eq!("D".parse::<OnDelete>().unwrap(), OnDelete::SetDefault);
        assert!("x".parse::<OnDelete>().is_err());
    }

    #[test]
    fn test_parse_lenient_defaults_to_no_action() {
        assert_eq!(OnDelete::parse_lenient("restrict"), OnDelete::Restrict);
        assert_eq!(OnDelete::parse_lenient("c"), OnDelete::Cascade);
        assert_eq!(OnDelete::parse_lenient("whatever"), OnDelete::NoAction);
    }

    #[test]
    fn test_deserialize_any_spelling() {
        #[derive(Deserialize)]
        struct Row {
            on_delete: OnDelete,
        }
        for (text, expected) in [
            ("set_null", OnDelete::SetNull),
            ("SET NULL", OnDelete::SetNull),
            ("CASCADE", OnDelete::Cascade),
            ("n", OnDelete::SetNull),
        ] {
            let row: Row = toml::from_str(&format!("on_delete = {:?}", text)).unwrap();
            assert_eq!(row.on_delete, expected, "{}", text);
        }
        assert!(toml::from_str::<Row>("on_delete = \"explode\"").is_err());
    }

    #[test]
    fn test_serializes_snake_case() {
        #[derive(Serialize)]
        struct Row {
            on_delete: OnDelete,
        }
        let text = toml::to_string(&Row {
            on_delete: OnDelete::SetNull,
        })
        .unwrap();
        assert_eq!(text.trim(), "on_delete = \"set_null\"");
    }

    #[test]
    fn test_catalog_codes_round_trip() {
        for action in [
            OnDelete::Restrict,
            OnDelete::NoAction,
            OnDelete::Cascade,
            OnDelete::SetNull,
            OnDelete::SetDefault,
        ] {
            let code = action.catalog_code().to_string();
            assert_eq!(OnDelete::from_catalog_code(&code), Some(action));
        }
        assert_eq!(OnDelete::from_catalog_code("x"), None);
    }

    #[test]
    fn test_existing_matches() {
        let desired = ForeignKeyBinding::new("sale_order", "partner_id", "res_partner", "id", OnDelete::Cascade);
        let existing = ExistingForeignKey {
            name: "sale_order_partner_id_fkey".into(),
            target_table: "res_partner".into(),
            target_column: "id".into(),
            on_delete: OnDelete::Cascade,
        };
        assert!(existing.matches(&desired));

        let other_action = ExistingForeignKey {
            on_delete: OnDelete::SetNull,
            ..existing.clone()
        };
        assert!(!other_action.matches(&desired));

        let other_target = ExistingForeignKey {
            target_table: "res_company".into(),
            ..existing
        };
        assert!(!other_target.matches(&desired));
    }
}
