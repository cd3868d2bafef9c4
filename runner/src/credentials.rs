//! Credential lists from the environment.
//!
//! Each provider reads one variable holding comma-separated entries of the
//! form `login:secret[:totp_seed]`. A seed of `NA` means the login has no
//! app-based 2FA.

use brokerbot_broker::Credential;

use crate::error::{Error, Result};

/// Seed placeholder for logins without a TOTP seed.
const NO_SEED: &str = "NA";

/// Parse one credential list.
pub fn parse_credentials(raw: &str) -> Result<Vec<Credential>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .map(|(i, entry)| parse_entry(entry).map_err(|msg| Error::Credentials(format!("entry {}: {msg}", i + 1))))
        .collect()
}

fn parse_entry(entry: &str) -> std::result::Result<Credential, String> {
    let parts: Vec<&str> = entry.split(':').collect();
    let (login, secret, seed) = match parts.as_slice() {
        [login, secret] => (*login, *secret, None),
        [login, secret, seed] => (*login, *secret, Some(*seed)),
        _ => return Err("expected login:secret[:totp_seed]".into()),
    };
    if login.is_empty() || secret.is_empty() {
        return Err("login and secret must not be empty".into());
    }
    let seed = seed.filter(|s| !s.is_empty() && *s != NO_SEED);
    Ok(Credential::new(login, secret, seed))
}

/// Read a provider's credential variable. `None` when it is unset or blank.
pub fn from_env(var: &str) -> Result<Option<Vec<Credential>>> {
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => parse_credentials(&raw).map(Some),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_entries_with_and_without_seed() {
        let creds = parse_credentials("alice:pw1:JBSWY3DPEHPK3PXP, bob:pw2").unwrap();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[0].login, "alice");
        assert_eq!(creds[0].secret.as_str(), "pw1");
        assert!(creds[0].totp_seed.is_some());
        assert_eq!(creds[1].login, "bob");
        assert!(creds[1].totp_seed.is_none());
    }

    #[test]
    fn na_means_no_seed() {
        let creds = parse_credentials("carol:pw:NA").unwrap();
        assert!(creds[0].totp_seed.is_none());
        assert_eq!(creds[0].one_time_code().unwrap(), None);
    }

    #[test]
    fn trailing_comma_ignored() {
        assert_eq!(parse_credentials("a:b,").unwrap().len(), 1);
    }

    #[test]
    fn malformed_entries() {
        assert!(matches!(parse_credentials("justalogin"), Err(Error::Credentials(_))));
        assert!(parse_credentials("a:b:c:d").is_err());
        assert!(parse_credentials(":pw").is_err());
        let err = parse_credentials("a:b,broken").unwrap_err();
        assert!(err.to_string().contains("entry 2"));
    }

    #[test]
    fn error_does_not_echo_secret() {
        let err = parse_credentials("user:hunter2:x:y").unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
    }
}
