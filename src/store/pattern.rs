//! Key pattern matching for KEYS
//!
//! Only three shapes are understood: `*` (everything), `prefix*` and an exact
//! key. A `*` anywhere but the end is an ordinary character.

/// A parsed KEYS pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPattern<'a> {
    All,
    Prefix(&'a str),
    Exact(&'a str),
}

impl<'a> KeyPattern<'a> {
    pub fn parse(pattern: &'a str) -> Self {
        if pattern == "*" {
            KeyPattern::All
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            KeyPattern::Prefix(prefix)
        } else {
            KeyPattern::Exact(pattern)
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match *self {
            KeyPattern::All => true,
            KeyPattern::Prefix(prefix) => key.starts_with(prefix),
            KeyPattern::Exact(exact) => key == exact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shapes() {
        assert_eq!(KeyPattern::parse("*"), KeyPattern::All);
        assert_eq!(KeyPattern::parse("user:*"), KeyPattern::Prefix("user:"));
        assert_eq!(KeyPattern::parse("user:1"), KeyPattern::Exact("user:1"));
        assert_eq!(KeyPattern::parse(""), KeyPattern::Exact(""));
    }

    #[test]
    fn test_prefix_match() {
        let pattern = KeyPattern::parse("a*");
        assert!(pattern.matches("a"));
        assert!(pattern.matches("ab"));
        assert!(!pattern.matches("ba"));
    }

    #[test]
    fn test_inner_wildcard_is_literal() {
        let pattern = KeyPattern::parse("*admin*");
        assert_eq!(pattern, KeyPattern::Prefix("*admin"));
        assert!(!pattern.matches("user_admin"));
        assert!(pattern.matches("*admin_role"));

        let pattern = KeyPattern::parse("a*b");
        assert!(!pattern.matches("axb"));
        assert!(pattern.matches("a*b"));
    }
}
