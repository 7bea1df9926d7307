//! Glob matching for `KEYS pattern`.
//!
//! Supported syntax:
//! - `*` matches any run of bytes, including none
//! - `?` matches exactly one byte
//! - `[ae]`, `[a-z]`, `[^0-9]` match one byte from (or outside) a class
//! - `\x` matches `x` literally

/// Returns true if `text` matches the glob `pattern`.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Pattern index just past the last `*`, and the text index it is anchored at.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        let next = match pattern.get(p) {
            Some(&b'*') => {
                star = Some((p + 1, t));
                p += 1;
                continue;
            }
            Some(&b'?') => Some(p + 1),
            Some(&b'[') => match_class(&pattern[p..], text[t]).map(|len| p + len),
            Some(&b'\\') if p + 1 < pattern.len() => (pattern[p + 1] == text[t]).then_some(p + 2),
            Some(&c) => (c == text[t]).then_some(p + 1),
            None => None,
        };

        match (next, star) {
            (Some(next), _) => {
                p = next;
                t += 1;
            }
            (None, Some((star_p, star_t))) => {
                // Let the last star swallow one more byte and retry.
                p = star_p;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            (None, None) => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Matches `c` against the class at the start of `class` (which begins with
/// `[`). Returns the length of the class on a match.
fn match_class(class: &[u8], c: u8) -> Option<usize> {
    let negate = class.get(1) == Some(&b'^');
    let mut i = if negate { 2 } else { 1 };
    let mut matched = false;

    while i < class.len() && class[i] != b']' {
        if class[i] == b'\\' && i + 1 < class.len() {
            matched |= class[i + 1] == c;
            i += 2;
        } else if i + 2 < class.len() && class[i + 1] == b'-' && class[i + 2] != b']' {
            let (lo, hi) = (class[i].min(class[i + 2]), class[i].max(class[i + 2]));
            matched |= (lo..=hi).contains(&c);
            i += 3;
        } else {
            matched |= class[i] == c;
            i += 1;
        }
    }

    if i >= class.len() {
        return None;
    }
    (matched != negate).then_some(i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pattern: &str, text: &str) -> bool {
        glob_match(pattern.as_bytes(), text.as_bytes())
    }

    #[test]
    fn test_star() {
        assert!(m("*", ""));
        assert!(m("*", "anything"));
        assert!(m("h*llo", "hello"));
        assert!(m("h*llo", "hllo"));
        assert!(m("h*llo", "heeeello"));
        assert!(m("user:*:name", "user:42:name"));
        assert!(!m("h*llo", "world"));
        assert!(!m("h*llo", "hello!"));
    }

    #[test]
    fn test_question_mark() {
        assert!(m("h?llo", "hallo"));
        assert!(!m("h?llo", "hllo"));
        assert!(!m("h?llo", "heello"));
    }

    #[test]
    fn test_classes() {
        assert!(m("h[ae]llo", "hello"));
        assert!(m("h[ae]llo", "hallo"));
        assert!(!m("h[ae]llo", "hillo"));
        assert!(m("key[0-9]", "key7"));
        assert!(!m("key[0-9]", "keyx"));
        assert!(m("key[^0-9]", "keyx"));
        assert!(!m("key[^0-9]", "key1"));
        assert!(!m("key[abc", "keya"));
    }

    #[test]
    fn test_escape() {
        assert!(m("a\\*b", "a*b"));
        assert!(!m("a\\*b", "axb"));
    }

    #[test]
    fn test_literal() {
        assert!(m("foo", "foo"));
        assert!(!m("foo", "fo"));
        assert!(!m("", "x"));
        assert!(m("", ""));
    }
}
