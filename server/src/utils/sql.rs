//! SQL utility functions

/// Quote an identifier for literal inclusion in generated SQL
///
/// Wraps the name in double quotes and doubles any embedded quote, so even a
/// sanitized name that collides with a reserved word (`user`, `order`) stays
/// a plain identifier.
///
/// # Example
///
/// ```
/// use mqttap_server::utils::sql::quote_ident;
///
/// assert_eq!(quote_ident("order"), "\"order\"");
/// assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
/// ```
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
