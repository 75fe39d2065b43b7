//! Shared HTTP plumbing: one blocking agent per client, and the mapping from
//! HTTP/transport failures to [`ClientError`] classes the retry loop acts on.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use haystack_core::ClientError;

const MAX_ERROR_BODY: usize = 300;

pub(crate) fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

/// POST a JSON body and parse the JSON reply.
pub(crate) fn post_json(
    request: ureq::Request,
    body: &Value,
) -> Result<Value, ClientError> {
    let url = request.url().to_string();
    debug!(url = %url, "POST");
    match request.send_json(body.clone()) {
        Ok(resp) => resp
            .into_json::<Value>()
            .map_err(|e| ClientError::Transient(format!("unreadable response body: {e}"))),
        Err(ureq::Error::Status(code, resp)) => {
            let retry_after = resp.header("retry-after").map(str::to_string);
            let body = resp.into_string().unwrap_or_default();
            Err(classify_status(code, retry_after.as_deref(), &body))
        }
        Err(ureq::Error::Transport(t)) => Err(ClientError::Transient(format!("request failed: {t}"))),
    }
}

/// 429 is a rate limit; 408, 409 and every 5xx (including Anthropic's 529
/// "overloaded") are transient; any other 4xx is permanent.
pub(crate) fn classify_status(code: u16, retry_after: Option<&str>, body: &str) -> ClientError {
    let message = format!("HTTP {code}: {}", truncate(body.trim(), MAX_ERROR_BODY));
    match code {
        429 => ClientError::RateLimited {
            message,
            retry_after: retry_after.and_then(parse_retry_after),
        },
        408 | 409 | 500..=599 => ClientError::Transient(message),
        400..=499 => ClientError::Permanent(message),
        _ => ClientError::Transient(message),
    }
}

/// `Retry-After` in (possibly fractional) seconds. HTTP-date values are
/// ignored and the default cooldown applies.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

pub(crate) fn malformed(what: &str, body: &Value) -> ClientError {
    ClientError::Transient(format!(
        "malformed response, missing {what}: {}",
        truncate(&body.to_string(), MAX_ERROR_BODY)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_with_retry_after() {
        let err = classify_status(429, Some("12"), "slow down");
        assert_eq!(
            err,
            ClientError::RateLimited {
                message: "HTTP 429: slow down".into(),
                retry_after: Some(Duration::from_secs(12)),
            }
        );
    }

    #[test]
    fn test_rate_limit_with_http_date_falls_back() {
        let err = classify_status(429, Some("Wed, 21 Oct 2015 07:28:00 GMT"), "");
        assert!(matches!(
            err,
            ClientError::RateLimited {
                retry_after: None,
                ..
            }
        ));
    }

    #[test]
    fn test_server_errors_are_transient() {
        for code in [500, 502, 503, 504, 529, 408] {
            assert!(
                matches!(classify_status(code, None, ""), ClientError::Transient(_)),
                "{code}"
            );
        }
    }

    #[test]
    fn test_client_errors_are_permanent() {
        for code in [400, 401, 403, 404, 422] {
            assert!(
                matches!(classify_status(code, None, ""), ClientError::Permanent(_)),
                "{code}"
            );
        }
    }

    #[test]
    fn test_long_body_truncated() {
        let body = "x".repeat(1000);
        let ClientError::Transient(msg) = classify_status(500, None, &body) else {
            panic!("expected transient");
        };
        assert!(msg.chars().count() < 320);
        assert!(msg.ends_with('…'));
    }
}
