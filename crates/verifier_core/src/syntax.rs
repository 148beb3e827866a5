//! Address parsing.
//!
//! Splits an address on the last `@` and validates the whole against
//! RFC 5322 using the `email_address` crate. Parsing never fails: invalid
//! input yields `valid: false` with best-effort parts so callers can still
//! report the pieces they saw.

use email_address::EmailAddress;

use crate::Syntax;

/// Parse an address into username/domain parts.
///
/// The domain is lowercased; the username is kept verbatim since local
/// parts are case-sensitive per RFC 5321.
pub fn parse(email: &str) -> Syntax {
    let email = email.trim();

    let Some(at) = email.rfind('@') else {
        return Syntax {
            username: email.to_string(),
            domain: String::new(),
            valid: false,
        };
    };

    let username = email[..at].to_string();
    let domain = email[at + 1..].to_lowercase();
    let valid = !username.is_empty() && !domain.is_empty() && EmailAddress::is_valid(email);

    Syntax {
        username,
        domain,
        valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_valid_address() {
        let syntax = parse("user@example.com");
        assert_eq!(syntax.username, "user");
        assert_eq!(syntax.domain, "example.com");
        assert!(syntax.valid);
    }

    #[test]
    fn test_parse_lowercases_domain_only() {
        let syntax = parse("User.Name@EXAMPLE.COM");
        assert_eq!(syntax.username, "User.Name");
        assert_eq!(syntax.domain, "example.com");
        assert!(syntax.valid);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let syntax = parse("  user@example.com \n");
        assert_eq!(syntax.username, "user");
        assert!(syntax.valid);
    }

    #[test]
    fn test_parse_splits_on_last_at() {
        let syntax = parse("weird@user@example.com");
        assert_eq!(syntax.username, "weird@user");
        assert_eq!(syntax.domain, "example.com");
        assert!(!syntax.valid);
    }

    #[test]
    fn test_parse_missing_at() {
        let syntax = parse("not-an-email");
        assert_eq!(syntax.username, "not-an-email");
        assert_eq!(syntax.domain, "");
        assert!(!syntax.valid);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(!parse("@@bad").valid);
        assert!(!parse("@example.com").valid);
        assert!(!parse("user@").valid);
        assert!(!parse("").valid);
    }
}
