use std::borrow::Cow;

/// Canonicalizes a header name in place: the first letter and every letter after a hyphen
/// are upper-cased, everything else is lower-cased.
///
/// Names containing spaces or control bytes are left untouched.
pub fn normalize_header_key(key: &mut [u8]) {
    if key.iter().any(|b| *b == b' ' || b.is_ascii_control()) {
        return;
    }

    let mut upper = true;
    for b in key.iter_mut() {
        if upper {
            b.make_ascii_uppercase();
        } else {
            b.make_ascii_lowercase();
        }
        upper = *b == b'-';
    }
}

/// Returns the canonical form of `key`, borrowing when no change is needed.
pub fn normalized_key(key: &[u8], disable_normalizing: bool) -> Cow<'_, [u8]> {
    if disable_normalizing || is_normalized(key) {
        return Cow::Borrowed(key);
    }
    let mut owned = key.to_vec();
    normalize_header_key(&mut owned);
    Cow::Owned(owned)
}

fn is_normalized(key: &[u8]) -> bool {
    let mut upper = true;
    for &b in key {
        if b == b' ' || b.is_ascii_control() {
            return true;
        }
        if upper && b.is_ascii_lowercase() || !upper && b.is_ascii_uppercase() {
            return false;
        }
        upper = b == b'-';
    }
    true
}
