//! Helpers for reading the trust client's tabular output.

/// Trimmed lines starting with `name` and ending with `role`.
///
/// Target listings print one target per line with the signing role in the
/// last column, so this selects the entries a given role published.
#[must_use]
pub fn entries_matching<'a>(output: &'a str, name: &str, role: &str) -> Vec<&'a str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with(name) && line.ends_with(role))
        .collect()
}

/// Trimmed `key list` lines describing root keys.
#[must_use]
pub fn root_key_lines(output: &str) -> Vec<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("root"))
        .collect()
}
