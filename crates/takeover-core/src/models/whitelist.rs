//! Whitelist entries: bare hostnames exempted from takeovers.

use crate::validation::ValidationError;

/// Normalize user input into a bare hostname.
///
/// Lowercases, strips an `http://`/`https://` scheme and a leading `www.`,
/// and drops everything from the first `/` on.
pub fn normalize_site(raw: &str) -> Result<String, ValidationError> {
    let lowered = raw.trim().to_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    let host = without_www.split('/').next().unwrap_or_default().trim();

    if !is_valid_host(host) {
        return Err(ValidationError::InvalidSite(raw.trim().to_string()));
    }
    Ok(host.to_string())
}

fn is_valid_host(host: &str) -> bool {
    let bytes = host.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_'))
}

/// Substring containment, so `zoom.us` also covers `app.zoom.us`.
pub fn is_whitelisted(hostname: &str, whitelist: &[String]) -> bool {
    whitelist
        .iter()
        .any(|site| !site.is_empty() && hostname.contains(site.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_scheme_www_and_path() {
        assert_eq!(
            normalize_site("HTTPS://WWW.Example.com/path").unwrap(),
            "example.com"
        );
        assert_eq!(normalize_site("  zoom.us  ").unwrap(), "zoom.us");
        assert_eq!(normalize_site("http://meet.google.com/abc-def").unwrap(), "meet.google.com");
        assert_eq!(normalize_site("x").unwrap(), "x");
    }

    #[test]
    fn test_normalize_rejects_malformed() {
        assert!(normalize_site("").is_err());
        assert!(normalize_site("https://").is_err());
        assert!(normalize_site("-bad.com").is_err());
        assert!(normalize_site("exa mple.com").is_err());
        assert!(normalize_site("example.com:8080").is_err());
    }

    #[test]
    fn test_substring_match() {
        let whitelist = vec!["zoom.us".to_string()];
        assert!(is_whitelisted("app.zoom.us", &whitelist));
        assert!(is_whitelisted("zoom.us", &whitelist));
        assert!(!is_whitelisted("example.com", &whitelist));
        assert!(!is_whitelisted("example.com", &[String::new()]));
    }
}
