//! Event store database schema.

use chronicle_core::error::DomainError;

/// Default name of the events table.
pub const DEFAULT_EVENTS_TABLE: &str = "events";

/// Checks that `table` is a plain SQL identifier, safe to splice into
/// statements.
///
/// # Errors
///
/// Returns `DomainError::Validation` if `table` is empty, starts with a digit
/// or contains anything but ASCII letters, digits and underscores.
pub fn validate_table_name(table: &str) -> Result<(), DomainError> {
    let mut chars = table.chars();
    let valid = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && table.len() <= 63;
    if valid {
        Ok(())
    } else {
        Err(DomainError::Validation(format!("invalid events table name: {table:?}")))
    }
}

/// SQL to create the events table `table` and its indexes.
///
/// `seq` records insertion order and breaks ties between events sharing a
/// `record_date`.
#[must_use]
pub fn create_events_table(table: &str) -> String {
    format!(
        r"
CREATE TABLE IF NOT EXISTS {table} (
    seq                BIGSERIAL PRIMARY KEY,
    id                 UUID NOT NULL UNIQUE,
    record_date        TIMESTAMPTZ NOT NULL,
    name               VARCHAR(255) NOT NULL,
    emitter_id         UUID NOT NULL,
    emitter_class_name VARCHAR(255) NOT NULL,
    payload            JSONB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{table}_emitter
    ON {table} (emitter_id, record_date, seq);

CREATE INDEX IF NOT EXISTS idx_{table}_emitter_class_name
    ON {table} (emitter_class_name, seq);

CREATE INDEX IF NOT EXISTS idx_{table}_name
    ON {table} (name, record_date, seq);
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_table_name_accepts_identifiers() {
        assert!(validate_table_name("events").is_ok());
        assert!(validate_table_name("_member_events_v2").is_ok());
    }

    #[test]
    fn test_validate_table_name_rejects_injection() {
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2events").is_err());
        assert!(validate_table_name("events; DROP TABLE users").is_err());
        assert!(validate_table_name("public.events").is_err());
    }

    #[test]
    fn test_create_events_table_uses_table_name() {
        let ddl = create_events_table("member_events");

        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS member_events ("));
        assert!(ddl.contains("idx_member_events_emitter"));
    }
}
