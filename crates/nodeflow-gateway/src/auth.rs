use nodeflow_core::config::GatewayConfig;

/// Check a request's credentials: Bearer header first, then `?token=`.
///
/// With no token configured every request passes. A Bearer header that
/// doesn't match fails even if the query string would.
pub fn validate_auth(
    config: &GatewayConfig,
    bearer: Option<&str>,
    query_token: Option<&str>,
) -> bool {
    let Some(expected) = config.token.as_deref() else {
        return true;
    };

    match bearer {
        Some(given) => given == expected,
        None => query_token == Some(expected),
    }
}

/// Extract token from the query string (?token=...).
pub fn extract_token_from_query(query: &str) -> Option<&str> {
    for pair in query.split('&') {
        if let Some(val) = pair.strip_prefix("token=") {
            return Some(val);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(token: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            bind: "127.0.0.1:18787".to_string(),
            token: token.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_no_token_configured() {
        let config = gateway(None);
        assert!(validate_auth(&config, None, None));
        assert!(validate_auth(&config, None, Some("anything")));
        assert!(validate_auth(&config, Some("anything"), None));
        assert!(validate_auth(&config, Some("anything"), Some("else")));
    }

    #[test]
    fn test_bearer_token() {
        let config = gateway(Some("secret"));
        assert!(validate_auth(&config, Some("secret"), None));
        assert!(!validate_auth(&config, Some("wrong"), None));
        assert!(!validate_auth(&config, Some("wrong"), Some("secret")));
        assert!(!validate_auth(&config, None, None));
    }

    #[test]
    fn test_query_token() {
        let config = gateway(Some("secret"));
        assert!(validate_auth(&config, None, Some("secret")));
        assert!(!validate_auth(&config, None, Some("nope")));
    }

    #[test]
    fn test_extract_token_from_query() {
        assert_eq!(extract_token_from_query("a=1&token=abc"), Some("abc"));
        assert_eq!(extract_token_from_query("a=1"), None);
        assert_eq!(extract_token_from_query(""), None);
    }
}
