use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::socket::SocketEndpoint;

/// Default service name advertised when none is configured.
pub const DEFAULT_SERVER_NAME: &str = "skein-server";

/// Default version advertised when none is configured.
pub const DEFAULT_SERVER_VERSION: &str = "1.0.0";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default time `stop` waits for in-flight connections, in milliseconds.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 10_000;

const DEFAULT_HOST: &str = "0.0.0.0";

static PROCESS_ID: Lazy<String> = Lazy::new(|| Uuid::new_v4().to_string());

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> crate::LogFormat {
    crate::LogFormat::Json
}

/// Default listening endpoint: every interface, OS-assigned port.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, 0)
}

/// Identifier shared by every default-configured server in this process.
///
/// The value is computed once per process.
#[must_use]
pub fn default_server_id() -> &'static str {
    PROCESS_ID.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_id_is_stable_within_a_process() {
        assert_eq!(default_server_id(), default_server_id());
        let parsed = Uuid::parse_str(default_server_id()).expect("uuid");
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn default_endpoint_binds_every_interface() {
        assert_eq!(default_socket_endpoint().to_string(), "tcp://0.0.0.0:0");
    }
}
