//! Endpoint defaults, flight address normalization, and user-agent assembly.
//!
//! Default endpoints are resolved exactly once, when the builder is
//! constructed, from `STRAKE_FLIGHT_URL` / `STRAKE_HTTP_URL` environment
//! overrides. The resolved values are passed down; nothing in the client reads
//! ambient environment state after construction.

use tonic::transport::{ClientTlsConfig, Endpoint};
use url::Url;

use crate::error::{ClientError, Result};

/// Default flight address of a local Strake runtime.
pub const LOCAL_FLIGHT_ADDRESS: &str = "http://localhost:50051";
/// Default HTTP address of a local Strake runtime.
pub const LOCAL_HTTP_ADDRESS: &str = "http://localhost:8080";
/// Flight address of the managed Strake cloud service.
pub const CLOUD_FLIGHT_ADDRESS: &str = "https://flight.strake.dev:443";
/// HTTP address of the managed Strake cloud service.
pub const CLOUD_HTTP_ADDRESS: &str = "https://data.strake.dev";

/// Environment variable overriding both flight defaults.
pub const FLIGHT_URL_ENV: &str = "STRAKE_FLIGHT_URL";
/// Environment variable overriding both HTTP defaults.
pub const HTTP_URL_ENV: &str = "STRAKE_HTTP_URL";

/// Header carrying the client user agent on flight and HTTP calls.
pub(crate) const USER_AGENT_HEADER: &str = "x-strake-user-agent";

/// Local and cloud endpoint pairs, resolved once at builder construction.
///
/// An environment override replaces both the local and the cloud member of
/// its pair, so a single variable repoints every client in the process.
#[derive(Debug, Clone)]
pub(crate) struct EndpointDefaults {
    pub local_flight: Url,
    pub cloud_flight: Url,
    pub local_http: Url,
    pub cloud_http: Url,
}

impl EndpointDefaults {
    pub fn resolve() -> Result<Self> {
        Self::from_overrides(
            std::env::var(FLIGHT_URL_ENV).ok(),
            std::env::var(HTTP_URL_ENV).ok(),
        )
    }

    fn from_overrides(flight: Option<String>, http: Option<String>) -> Result<Self> {
        let parse = |value: &str, what: &str| -> Result<Url> {
            Url::parse(value)
                .map_err(|e| ClientError::invalid_argument(format!("invalid {what} '{value}': {e}")))
        };

        let (local_flight, cloud_flight) = match flight {
            Some(value) => {
                let url = parse(&value, "flight address")?;
                (url.clone(), url)
            }
            None => (
                parse(LOCAL_FLIGHT_ADDRESS, "flight address")?,
                parse(CLOUD_FLIGHT_ADDRESS, "flight address")?,
            ),
        };

        let (local_http, cloud_http) = match http {
            Some(value) => {
                let url = parse(&value, "HTTP address")?;
                (url.clone(), url)
            }
            None => (
                parse(LOCAL_HTTP_ADDRESS, "HTTP address")?,
                parse(CLOUD_HTTP_ADDRESS, "HTTP address")?,
            ),
        };

        Ok(Self {
            local_flight,
            cloud_flight,
            local_http,
            cloud_http,
        })
    }
}

/// Normalizes a user-supplied flight address to the gRPC transport scheme.
///
/// `https` becomes `grpc+tls`, `http` becomes `grpc+tcp`, host and port are
/// preserved. Any other scheme passes through unchanged so callers can hand
/// in an already-normalized address.
pub fn normalize_flight_address(address: &Url) -> Result<String> {
    let transport = match address.scheme() {
        "https" => "grpc+tls",
        "http" => "grpc+tcp",
        _ => return Ok(address.as_str().to_string()),
    };

    let host = address
        .host_str()
        .ok_or_else(|| ClientError::invalid_argument(format!("flight address '{address}' has no host")))?;
    let port = address
        .port_or_known_default()
        .ok_or_else(|| ClientError::invalid_argument(format!("flight address '{address}' has no port")))?;

    Ok(format!("{transport}://{host}:{port}"))
}

/// Maps a normalized flight address onto a tonic channel endpoint, enabling
/// TLS with native roots for `grpc+tls`.
pub(crate) fn flight_channel_endpoint(address: &str) -> Result<Endpoint> {
    let (scheme, rest) = address.split_once("://").ok_or_else(|| {
        ClientError::invalid_argument(format!("flight address '{address}' has no scheme"))
    })?;

    match scheme {
        "grpc+tls" | "https" => {
            let endpoint = Endpoint::from_shared(format!("https://{rest}"))?;
            Ok(endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?)
        }
        "grpc+tcp" | "grpc" | "http" => Ok(Endpoint::from_shared(format!("http://{rest}"))?),
        other => Err(ClientError::invalid_argument(format!(
            "unsupported flight scheme '{other}'"
        ))),
    }
}

/// Builds the default user-agent string for this system, including the crate
/// version, OS name, OS version and architecture.
pub fn default_user_agent() -> String {
    format!(
        "{}/{} ({}/{} {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        normalized_os(),
        os_version(),
        normalized_arch()
    )
}

// OS and arch names follow the pattern set by the other Strake SDKs.
fn normalized_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "Darwin",
        "windows" => "Windows",
        "linux" => "Linux",
        other => other,
    }
}

fn normalized_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "i386",
        other => other,
    }
}

fn os_version() -> String {
    // Windows version strings carry the arch after the version, keep the
    // leading token only.
    sysinfo::System::os_version()
        .and_then(|v| v.split_whitespace().next().map(str::to_owned))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_https_to_tls() {
        let url = Url::parse("https://flight.strake.dev:443").unwrap();
        assert_eq!(
            normalize_flight_address(&url).unwrap(),
            "grpc+tls://flight.strake.dev:443"
        );
    }

    #[test]
    fn test_normalize_http_to_tcp() {
        let url = Url::parse("http://localhost:50051").unwrap();
        assert_eq!(
            normalize_flight_address(&url).unwrap(),
            "grpc+tcp://localhost:50051"
        );
    }

    #[test]
    fn test_normalize_default_ports() {
        let url = Url::parse("https://data.strake.dev").unwrap();
        assert_eq!(
            normalize_flight_address(&url).unwrap(),
            "grpc+tls://data.strake.dev:443"
        );
    }

    #[test]
    fn test_other_scheme_passes_through() {
        let url = Url::parse("grpc+unix:///tmp/flight.sock").unwrap();
        assert_eq!(
            normalize_flight_address(&url).unwrap(),
            "grpc+unix:///tmp/flight.sock"
        );
    }

    #[test]
    fn test_defaults_without_overrides() {
        let defaults = EndpointDefaults::from_overrides(None, None).unwrap();
        assert_eq!(defaults.local_flight.as_str(), "http://localhost:50051/");
        assert_eq!(defaults.cloud_flight.as_str(), "https://flight.strake.dev/");
        assert_eq!(defaults.local_http.as_str(), "http://localhost:8080/");
        assert_eq!(defaults.cloud_http.as_str(), "https://data.strake.dev/");
    }

    #[test]
    fn test_override_replaces_both_members_of_a_pair() {
        let defaults = EndpointDefaults::from_overrides(
            Some("http://flight.internal:50052".to_string()),
            None,
        )
        .unwrap();
        assert_eq!(defaults.local_flight, defaults.cloud_flight);
        assert_eq!(defaults.local_flight.as_str(), "http://flight.internal:50052/");
        // the untouched pair keeps its split defaults
        assert_ne!(defaults.local_http, defaults.cloud_http);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let result = EndpointDefaults::from_overrides(Some("not a url".to_string()), None);
        assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
    }

    #[test]
    fn test_user_agent_shape() {
        let ua = default_user_agent();
        assert!(ua.starts_with(&format!("strake-client/{} (", env!("CARGO_PKG_VERSION"))));
        assert!(ua.ends_with(')'));
        let os = normalized_os();
        assert!(["Darwin", "Windows", "Linux"].contains(&os) || !os.is_empty());
        assert_ne!(normalized_arch(), "x86");
    }
}
