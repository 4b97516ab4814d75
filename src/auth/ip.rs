//! Client IP and device metadata extraction.

use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{Extensions, HeaderMap, header, request::Parts},
};

use crate::cli::IpExtractor;
use crate::session::DeviceInfo;

/// Longest user-agent string stored on a session.
const MAX_USER_AGENT_LEN: usize = 512;

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &HeaderMap;
    fn extensions(&self) -> &Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract client IP address based on configuration.
///
/// With an `ip_extractor`, the IP comes from the configured proxy header and
/// a missing or invalid header is an error (no fallback to the socket).
/// Without one, the peer address from `ConnectInfo` is used.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    ip_extractor: Option<&IpExtractor>,
) -> Result<String, &'static str> {
    match ip_extractor {
        Some(extractor) => {
            let header_value = source
                .headers()
                .get(extractor.header_name())
                .ok_or("IP header not present")?
                .to_str()
                .map_err(|_| "IP header contains invalid characters")?;
            extractor.extract(header_value)
        }
        None => source
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .ok_or("No client IP available"),
    }
}

/// Metadata recorded on sessions created or renewed by this request.
pub fn device_info<T: HasHeadersAndExtensions>(
    source: &T,
    ip_extractor: Option<&IpExtractor>,
) -> DeviceInfo {
    let user_agent = source
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect());

    DeviceInfo {
        user_agent,
        ip_address: extract_client_ip(source, ip_extractor).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ClientIpHeader;
    use axum::body::Body;
    use axum::extract::Request;

    #[test]
    fn test_connect_info_fallback() {
        let mut request = Request::builder().body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 7], 4000))));

        assert_eq!(
            extract_client_ip(&request, None),
            Ok("192.168.1.7".to_string())
        );
    }

    #[test]
    fn test_configured_header_has_no_fallback() {
        let extractor = IpExtractor::from(ClientIpHeader::XRealIp);
        let mut request = Request::builder().body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 7], 4000))));

        assert!(extract_client_ip(&request, Some(&extractor)).is_err());
    }

    #[test]
    fn test_device_info() {
        let extractor = IpExtractor::from(ClientIpHeader::XForwardedFor);
        let request = Request::builder()
            .header("user-agent", "Mozilla/5.0 (X11)")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        let device = device_info(&request, Some(&extractor));
        assert_eq!(device.user_agent.as_deref(), Some("Mozilla/5.0 (X11)"));
        assert_eq!(device.ip_address.as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn test_device_info_without_ip() {
        let request = Request::builder().body(Body::empty()).unwrap();
        let device = device_info(&request, None);
        assert_eq!(device, DeviceInfo::default());
    }
}
