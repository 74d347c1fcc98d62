use std::fmt;
use std::fs::DirBuilder;
use std::net::SocketAddr;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::Url;

/// Address a server listens on.
///
/// Deserialises from either a `tcp://` / `unix://` URL string or a table
/// tagged by `transport`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// Unix domain socket endpoint.
    Unix {
        /// Filesystem path of the socket.
        path: Utf8PathBuf,
    },
    /// TCP socket endpoint.
    Tcp {
        /// Host name or literal IP address.
        host: String,
        /// Port number; zero asks the OS to pick one.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Builds the TCP endpoint matching a bound socket address.
    #[must_use]
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self::tcp(addr.ip().to_string(), addr.port())
    }

    /// Returns the Unix socket path when the endpoint uses the Unix transport.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }

    /// Returns the TCP port, if any.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        match self {
            Self::Tcp { port, .. } => Some(*port),
            Self::Unix { .. } => None,
        }
    }

    /// Ensures a Unix socket's parent directory exists with owner-only
    /// permissions. TCP endpoints need no preparation.
    ///
    /// # Errors
    ///
    /// Returns [`SocketPreparationError`] when the path has no parent or the
    /// directory cannot be created.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) else {
            return Err(SocketPreparationError::MissingParent {
                path: path.to_path_buf(),
            });
        };

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(parent.as_std_path())
            && source.kind() != std::io::ErrorKind::AlreadyExists
        {
            return Err(SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            });
        }

        Ok(())
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } if host.contains(':') => {
                write!(formatter, "tcp://[{host}]:{port}")
            }
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" => {
                let path = url.path();
                if path.is_empty() {
                    return Err(SocketParseError::MissingUnixPath(input.to_owned()));
                }
                Ok(Self::unix(path))
            }
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| SocketParseError::MissingHost(input.to_owned()))?;
                let port = url
                    .port()
                    .ok_or_else(|| SocketParseError::MissingPort(input.to_owned()))?;
                Ok(Self::tcp(host.trim_matches(['[', ']']), port))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
enum TaggedEndpoint {
    Unix { path: Utf8PathBuf },
    Tcp { host: String, port: u16 },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EndpointRepr {
    Url(String),
    Tagged(TaggedEndpoint),
}

impl<'de> Deserialize<'de> for SocketEndpoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match EndpointRepr::deserialize(deserializer)? {
            EndpointRepr::Url(text) => text.parse().map_err(serde::de::Error::custom),
            EndpointRepr::Tagged(TaggedEndpoint::Unix { path }) => Ok(Self::Unix { path }),
            EndpointRepr::Tagged(TaggedEndpoint::Tcp { host, port }) => Ok(Self::Tcp { host, port }),
        }
    }
}

/// Errors encountered while parsing a [`SocketEndpoint`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Scheme was neither `tcp` nor `unix`.
    #[error("unsupported socket scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// TCP port was missing from the address.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// Unix socket path was absent.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised when preparing socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The Unix socket path has no parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Offending socket path.
        path: Utf8PathBuf,
    },
    /// Creating the parent directory failed.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("tcp://127.0.0.1:9000", SocketEndpoint::tcp("127.0.0.1", 9000))]
    #[case("tcp://[::1]:8080", SocketEndpoint::tcp("::1", 8080))]
    #[case("unix:///run/skein/server.sock", SocketEndpoint::unix("/run/skein/server.sock"))]
    fn parses_endpoints(#[case] input: &str, #[case] expected: SocketEndpoint) {
        let endpoint: SocketEndpoint = input.parse().expect("parse endpoint");
        assert_eq!(endpoint, expected);
    }

    #[rstest]
    #[case("tcp://127.0.0.1:9000")]
    #[case("tcp://[::1]:8080")]
    #[case("unix:///run/skein/server.sock")]
    fn display_matches_parse_input(#[case] input: &str) {
        let endpoint: SocketEndpoint = input.parse().expect("parse endpoint");
        assert_eq!(endpoint.to_string(), input);
    }

    #[test]
    fn rejects_unknown_scheme() {
        let error = "udp://127.0.0.1:53"
            .parse::<SocketEndpoint>()
            .expect_err("udp is unsupported");
        assert!(matches!(error, SocketParseError::UnsupportedScheme(scheme) if scheme == "udp"));
    }

    #[test]
    fn rejects_tcp_without_port() {
        let error = "tcp://localhost"
            .parse::<SocketEndpoint>()
            .expect_err("port is required");
        assert!(matches!(error, SocketParseError::MissingPort(_)));
    }

    #[rstest]
    #[case(r#""tcp://127.0.0.1:9000""#)]
    #[case(r#"{"transport":"tcp","host":"127.0.0.1","port":9000}"#)]
    fn deserialises_from_url_or_table(#[case] document: &str) {
        let endpoint: SocketEndpoint = serde_json::from_str(document).expect("endpoint");
        assert_eq!(endpoint, SocketEndpoint::tcp("127.0.0.1", 9000));
    }

    #[test]
    fn deserialising_a_bad_url_reports_the_scheme() {
        let error = serde_json::from_str::<SocketEndpoint>(r#""udp://127.0.0.1:53""#)
            .expect_err("udp is unsupported");
        assert!(error.to_string().contains("udp"));
    }

    #[test]
    fn socket_addr_becomes_tcp_endpoint() {
        let addr: SocketAddr = "127.0.0.1:4242".parse().expect("socket addr");
        let endpoint = SocketEndpoint::from_socket_addr(addr);
        assert_eq!(endpoint.port(), Some(4242));
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:4242");
    }

    #[test]
    fn prepares_nested_socket_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("server.sock");
        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
        endpoint.prepare_filesystem().expect("prepare directory");
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn rejects_socket_without_parent() {
        let endpoint = SocketEndpoint::unix("server.sock");
        let error = endpoint
            .prepare_filesystem()
            .expect_err("bare file name has no parent");
        assert!(matches!(error, SocketPreparationError::MissingParent { .. }));
    }
}
