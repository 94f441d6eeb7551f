// =============================================================================
// SEQUENCE ALLOCATOR
// =============================================================================
// Human-facing business numbers: "OS-001", "PR-042", ...
//
// Allocation is a single atomic upsert-increment on the business_sequences
// row for the prefix, so two concurrent creations serialize on the row and
// can never be handed the same number. Parsing exists only to seed the
// counters from pre-existing rows at migration time (db.rs).
// =============================================================================

use sqlx::PgConnection;

/// Allocate the next business number for a prefix.
pub async fn next_number(conn: &mut PgConnection, prefix: &str) -> Result<String, sqlx::Error> {
    let (value,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO business_sequences (prefix, value)
        VALUES ($1, 1)
        ON CONFLICT (prefix)
        DO UPDATE SET value = business_sequences.value + 1
        RETURNING value
        "#,
    )
    .bind(prefix)
    .fetch_one(&mut *conn)
    .await?;

    Ok(format_number(prefix, value))
}

/// Format a counter value as "PREFIX-NNN", zero-padded to three digits.
/// Values past 999 simply grow wider.
pub fn format_number(prefix: &str, value: i64) -> String {
    format!("{}-{:03}", prefix, value)
}

/// Extract the trailing integer from a "PREFIX-NNN" business number.
/// Returns None when the string doesn't match that shape.
pub fn parse_number(prefix: &str, number: &str) -> Option<i64> {
    let digits = number.strip_prefix(prefix)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_allocation_is_001() {
        // empty history seeds the counter at 1
        assert_eq!(format_number("OS", 1), "OS-001");
        assert_eq!(format_number("PR", 1), "PR-001");
    }

    #[test]
    fn numbers_keep_three_digit_padding() {
        assert_eq!(format_number("OS", 8), "OS-008");
        assert_eq!(format_number("OS", 42), "OS-042");
        assert_eq!(format_number("OS", 999), "OS-999");
        // and widen past the padding instead of wrapping
        assert_eq!(format_number("OS", 1000), "OS-1000");
    }

    #[test]
    fn parse_reads_the_trailing_integer() {
        assert_eq!(parse_number("OS", "OS-007"), Some(7));
        assert_eq!(parse_number("OS", "OS-1234"), Some(1234));
        assert_eq!(parse_number("PR", "PR-001"), Some(1));
    }

    #[test]
    fn parse_rejects_foreign_shapes() {
        assert_eq!(parse_number("OS", "PR-007"), None);
        assert_eq!(parse_number("OS", "OS-"), None);
        assert_eq!(parse_number("OS", "OS-7a"), None);
        assert_eq!(parse_number("OS", "OS007"), None);
        assert_eq!(parse_number("PR", "PRX-1"), None);
    }

    #[test]
    fn parse_then_format_continues_the_series() {
        // "OS-007" is the latest number on record -> the next one is OS-008
        let last = parse_number("OS", "OS-007").unwrap();
        assert_eq!(format_number("OS", last + 1), "OS-008");
    }
}
