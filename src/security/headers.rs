//! Security headers for HTTP responses
//!
//! Every JSON response of the service carries these headers.

/// Strict Content Security Policy for API endpoints
const STRICT_CSP: &str = "default-src 'none'; connect-src 'self'; frame-ancestors 'none';";

const PERMISSIONS_POLICY: &str =
    "geolocation=(), microphone=(), camera=(), payment=(), usb=(), magnetometer=(), gyroscope=(), accelerometer=()";

/// Wrap a reply with strict security headers for API endpoints
pub fn with_api_security_headers<T: warp::Reply>(reply: T) -> impl warp::Reply {
    let reply = warp::reply::with_header(reply, "X-Frame-Options", "DENY");
    let reply = warp::reply::with_header(reply, "X-Content-Type-Options", "nosniff");
    let reply = warp::reply::with_header(reply, "Referrer-Policy", "no-referrer");
    let reply = warp::reply::with_header(reply, "Content-Security-Policy", STRICT_CSP);
    // Responses may carry tokens
    let reply = warp::reply::with_header(reply, "Cache-Control", "no-cache, no-store, must-revalidate");
    warp::reply::with_header(reply, "Permissions-Policy", PERMISSIONS_POLICY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::Reply;

    #[test]
    fn test_strict_csp_for_api() {
        assert!(STRICT_CSP.contains("default-src 'none'"));
        assert!(STRICT_CSP.contains("frame-ancestors 'none'"));
        assert!(!STRICT_CSP.contains("unsafe-inline"));
    }

    #[test]
    fn test_headers_applied() {
        let response = with_api_security_headers(warp::reply::json(&"ok")).into_response();
        let headers = response.headers();
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["cache-control"], "no-cache, no-store, must-revalidate");
        assert!(headers.contains_key("content-security-policy"));
    }
}
