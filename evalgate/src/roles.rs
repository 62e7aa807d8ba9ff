//! Conversions between a role list and its persisted, comma-joined form

/// The role that grants unrestricted access
pub const ADMIN_ROLE: &str = "admin";

/// Joins roles into the comma-separated form stored on a local user
///
/// Surrounding whitespace is trimmed from each role and empty roles are
/// dropped, so that [`parse_roles`] recovers the same list.
pub fn join_roles<I, S>(roles: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut joined = String::new();
    for role in roles {
        let role = role.as_ref().trim();
        if role.is_empty() {
            continue;
        }
        if !joined.is_empty() {
            joined.push(',');
        }
        joined.push_str(role);
    }
    joined
}

/// Splits a comma-separated role string into its roles
pub fn parse_roles(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
