//! Checks shared by the scenarios.
//!
//! Each helper returns [`HarnessError::Assertion`] tagged with the calling
//! scenario, carrying both the expected and the observed value.

use crate::changefeed::{ChangeCategory, ChangePage};
use crate::error::HarnessError;

/// Two listings of the same thing must be byte-identical.
pub fn ensure_listings_match(
    scenario: &'static str,
    what: &str,
    primary: &str,
    secondary: &str,
) -> Result<(), HarnessError> {
    if primary == secondary {
        return Ok(());
    }
    Err(HarnessError::assertion(
        scenario,
        format!("{what} lists not equal:\n{primary}\n{secondary}"),
    ))
}

/// `output` must mention `needle`.
pub fn ensure_contains(
    scenario: &'static str,
    output: &str,
    needle: &str,
) -> Result<(), HarnessError> {
    if output.contains(needle) {
        return Ok(());
    }
    Err(HarnessError::assertion(
        scenario,
        format!("missing expected {needle}: {output}"),
    ))
}

/// The page must report exactly `expected` records.
pub fn ensure_feed_count(
    scenario: &'static str,
    page: &ChangePage,
    expected: u64,
) -> Result<(), HarnessError> {
    if u64::try_from(page.count).is_ok_and(|count| count == expected) {
        return Ok(());
    }
    Err(HarnessError::assertion(
        scenario,
        format!(
            "expected {expected} change records, feed reports {}",
            page.count
        ),
    ))
}

/// Every record must belong to `identity` and have `category`.
pub fn ensure_records_for(
    scenario: &'static str,
    page: &ChangePage,
    identity: &str,
    category: ChangeCategory,
) -> Result<(), HarnessError> {
    for record in &page.records {
        if record.gun != identity {
            return Err(HarnessError::assertion(
                scenario,
                format!(
                    "record {} belongs to {}, expected {identity}",
                    record.id, record.gun
                ),
            ));
        }
        if record.category != category {
            return Err(HarnessError::assertion(
                scenario,
                format!(
                    "record {} has category {}, expected {category}",
                    record.id, record.category
                ),
            ));
        }
    }
    Ok(())
}

/// Records must be strictly ascending.
///
/// Numeric identifiers are compared by value. Adjacent records whose
/// identifiers are not both numeric fall back to `CreatedAt`, and are
/// accepted when either timestamp is missing.
pub fn ensure_ascending(scenario: &'static str, page: &ChangePage) -> Result<(), HarnessError> {
    for pair in page.records.windows(2) {
        let (earlier, later) = (&pair[0], &pair[1]);
        let ordered = match (earlier.id.as_u64(), later.id.as_u64()) {
            (Some(a), Some(b)) => a < b,
            _ => match (&earlier.created_at, &later.created_at) {
                (Some(a), Some(b)) => a <= b && earlier.id != later.id,
                _ => earlier.id != later.id,
            },
        };
        if !ordered {
            return Err(HarnessError::assertion(
                scenario,
                format!(
                    "records out of order: {} listed before {}",
                    earlier.id, later.id
                ),
            ));
        }
    }
    Ok(())
}

/// Exactly one line of `kind` must be present; returns it.
pub fn ensure_single<'a>(
    scenario: &'static str,
    kind: &str,
    lines: &[&'a str],
) -> Result<&'a str, HarnessError> {
    match lines {
        [line] => Ok(line),
        _ => Err(HarnessError::assertion(
            scenario,
            format!("expected exactly one {kind}, found {}: {lines:?}", lines.len()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changefeed::{ChangeId, ChangeRecord};

    fn page(ids: &[u64], category: ChangeCategory) -> ChangePage {
        ChangePage::from_records(
            ids.iter()
                .map(|id| ChangeRecord::new(ChangeId::from_number(*id), "gun", category))
                .collect(),
        )
    }

    #[test]
    fn test_listing_mismatch_shows_both_sides() {
        let error = ensure_listings_match("basic_repo_test", "targets", "a\n", "b\n").unwrap_err();
        let message = error.to_string();
        assert!(message.contains("basic_repo_test"));
        assert!(message.contains("targets lists not equal"));
        assert!(message.contains("a\n") && message.contains("b\n"));
    }

    #[test]
    fn test_feed_count() {
        let page = page(&[1, 2, 3], ChangeCategory::Update);
        assert!(ensure_feed_count("s", &page, 3).is_ok());
        assert!(
            ensure_feed_count("s", &page, 4)
                .unwrap_err()
                .to_string()
                .contains("expected 4 change records, feed reports 3")
        );
    }

    #[test]
    fn test_records_for_checks_identity_and_category() {
        let updates = page(&[1, 2], ChangeCategory::Update);
        assert!(ensure_records_for("s", &updates, "gun", ChangeCategory::Update).is_ok());
        assert!(ensure_records_for("s", &updates, "other", ChangeCategory::Update).is_err());
        assert!(ensure_records_for("s", &updates, "gun", ChangeCategory::Deletion).is_err());
    }

    #[test]
    fn test_ascending() {
        assert!(ensure_ascending("s", &page(&[1, 4, 9], ChangeCategory::Update)).is_ok());
        assert!(ensure_ascending("s", &page(&[1, 9, 4], ChangeCategory::Update)).is_err());
        assert!(ensure_ascending("s", &page(&[2, 2], ChangeCategory::Update)).is_err());
        assert!(ensure_ascending("s", &page(&[], ChangeCategory::Update)).is_ok());
    }

    #[test]
    fn test_ascending_text_ids_use_timestamps() {
        let mut first = ChangeRecord::new(ChangeId::from_text("b-1"), "gun", ChangeCategory::Update);
        first.created_at = Some("2017-01-01T00:00:02Z".to_string());
        let mut second = ChangeRecord::new(ChangeId::from_text("a-2"), "gun", ChangeCategory::Update);
        second.created_at = Some("2017-01-01T00:00:01Z".to_string());

        let page = ChangePage::from_records(vec![second.clone(), first.clone()]);
        assert!(ensure_ascending("s", &page).is_ok());
        let page = ChangePage::from_records(vec![first, second]);
        assert!(ensure_ascending("s", &page).is_err());
    }

    #[test]
    fn test_single() {
        assert_eq!(ensure_single("s", "root key", &["root abc"]).unwrap(), "root abc");
        assert!(ensure_single("s", "root key", &[]).is_err());
        assert!(ensure_single("s", "root key", &["root a", "root b"]).is_err());
    }
}
