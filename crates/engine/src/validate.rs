//! Whitelist validation for everything user-controlled that reaches the
//! SQL surface. Identifiers are interpolated only after passing these
//! checks; values always bind as named parameters.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EngineError, EngineResult};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").expect("identifier pattern"));

pub const MAX_LIMIT: i64 = 10_000;
pub const MAX_PARTITION_KEY_LEN: usize = 2048;

/// The closed set of filter operators, with their SQL mapping.
pub const FILTER_OPERATORS: [&str; 5] = ["eq", "ne", "gt", "lt", "contains"];

/// Field names and orderBy targets must match the identifier whitelist.
/// Rejections carry the `bad-filter` kind because they almost always
/// come from a WHERE clause or ORDER BY argument.
pub fn validate_identifier(name: &str) -> EngineResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(EngineError::BadFilter(format!("invalid field name '{name}'")))
    }
}

/// Partition keys are opaque but bounded; they are sent as parameters so
/// arbitrary characters are fine.
pub fn validate_partition_key(value: &str) -> EngineResult<()> {
    if value.is_empty() {
        return Err(EngineError::Validation("partition key must not be empty".into()));
    }
    if value.len() > MAX_PARTITION_KEY_LEN {
        return Err(EngineError::Validation(format!(
            "partition key exceeds {MAX_PARTITION_KEY_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_limit(limit: i64) -> EngineResult<()> {
    if limit <= 0 {
        return Err(EngineError::Validation(format!("limit must be positive, got {limit}")));
    }
    if limit > MAX_LIMIT {
        return Err(EngineError::Validation(format!("limit must be <= {MAX_LIMIT}, got {limit}")));
    }
    Ok(())
}

/// Continuation tokens are opaque; only emptiness is rejected.
pub fn validate_continuation_token(token: &str) -> EngineResult<()> {
    if token.is_empty() {
        return Err(EngineError::Validation("continuation token must not be empty".into()));
    }
    Ok(())
}

pub fn validate_order_direction(direction: &str) -> EngineResult<()> {
    match direction {
        "ASC" | "DESC" => Ok(()),
        other => Err(EngineError::Validation(format!(
            "order direction must be ASC or DESC, got '{other}'"
        ))),
    }
}

/// Map a filter operator to its SQL form. The operator set is closed;
/// anything outside it is a `bad-filter`.
pub fn sql_operator(op: &str) -> EngineResult<&'static str> {
    match op {
        "eq" => Ok("="),
        "ne" => Ok("!="),
        "gt" => Ok(">"),
        "lt" => Ok("<"),
        "contains" => Ok("CONTAINS"),
        other => Err(EngineError::BadFilter(format!("unknown filter operator '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        for name in ["id", "userName", "_ts", "created-at", "a1_b2"] {
            assert!(validate_identifier(name).is_ok(), "{name} should pass");
        }
    }

    #[test]
    fn test_invalid_identifiers_are_bad_filter() {
        for name in ["", "1abc", "name; DROP TABLE", "a b", "c.d", "x'y"] {
            let err = validate_identifier(name).unwrap_err();
            assert_eq!(err.kind(), "bad-filter", "{name} should be rejected");
        }
    }

    #[test]
    fn test_partition_key_bounds() {
        assert!(validate_partition_key("tenant-1").is_ok());
        assert!(validate_partition_key("weird; DROP").is_ok()); // parameter-bound, any content
        assert!(validate_partition_key("").is_err());
        assert!(validate_partition_key(&"x".repeat(2049)).is_err());
    }

    #[test]
    fn test_limit_bounds() {
        assert!(validate_limit(1).is_ok());
        assert!(validate_limit(10_000).is_ok());
        assert_eq!(validate_limit(0).unwrap_err().kind(), "validation");
        assert_eq!(validate_limit(-5).unwrap_err().kind(), "validation");
        assert_eq!(validate_limit(10_001).unwrap_err().kind(), "validation");
    }

    #[test]
    fn test_order_direction() {
        assert!(validate_order_direction("ASC").is_ok());
        assert!(validate_order_direction("DESC").is_ok());
        assert!(validate_order_direction("desc").is_err());
        assert!(validate_order_direction("SIDEWAYS").is_err());
    }

    #[test]
    fn test_operator_set_is_closed() {
        for op in FILTER_OPERATORS {
            assert!(sql_operator(op).is_ok());
        }
        assert_eq!(sql_operator("like").unwrap_err().kind(), "bad-filter");
        assert_eq!(sql_operator("EQ").unwrap_err().kind(), "bad-filter");
    }

    #[test]
    fn test_continuation_token() {
        assert!(validate_continuation_token("opaque==").is_ok());
        assert!(validate_continuation_token("").is_err());
    }
}
