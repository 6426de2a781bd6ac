//! Field-name to column-name conversion.
//!
//! Both directions work on ASCII only; every other character passes through unchanged.

/// Convert a camelCase field name to a snake_case column name.
///
/// Every ASCII uppercase letter becomes `_` followed by its lowercase form. Runs of capitals
/// are not grouped, so `userID` becomes `user_i_d`, and a leading capital yields a leading
/// underscore. Digits, underscores and non-ASCII characters are untouched.
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a snake_case column name to a camelCase field name.
///
/// An underscore followed by an ASCII letter or digit is dropped and the following character
/// uppercased (digits stay as they are). Any other underscore is kept.
pub fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('_', Some(next)) if next.is_ascii_alphanumeric() => {
                out.push(next.to_ascii_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("firstName"), "first_name");
        assert_eq!(camel_to_snake("lastName"), "last_name");
        assert_eq!(camel_to_snake("id"), "id");
        assert_eq!(camel_to_snake("already_snake"), "already_snake");
    }

    #[test]
    fn test_camel_to_snake_capital_runs_and_digits() {
        assert_eq!(camel_to_snake("userID"), "user_i_d");
        assert_eq!(camel_to_snake("HTTPCode"), "_h_t_t_p_code");
        assert_eq!(camel_to_snake("address2Line"), "address2_line");
        assert_eq!(camel_to_snake("_meta"), "_meta");
        assert_eq!(camel_to_snake("naïveÉtat"), "naïveÉtat");
    }

    #[test]
    fn test_snake_to_camel() {
        assert_eq!(snake_to_camel("first_name"), "firstName");
        assert_eq!(snake_to_camel("address_2"), "address2");
        assert_eq!(snake_to_camel("trailing_"), "trailing_");
        assert_eq!(snake_to_camel("__a"), "_A");
        assert_eq!(snake_to_camel("_meta"), "Meta");
    }

    #[test]
    fn test_round_trip_for_simple_names() {
        for name in ["firstName", "createdAt", "id", "ownerUserId"] {
            assert_eq!(snake_to_camel(&camel_to_snake(name)), name);
        }
    }
}
