/// Default filesystem path of the status socket
pub const DEFAULT_STATUS_SOCKET_PATH: &str = "/var/run/onionbalance/control";

/// Suffix appended to every onion address in the status report
pub const ONION_SUFFIX: &str = ".onion";

/// Timestamp format for upload and descriptor times
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Clock-only format used for health check times
pub const CHECK_TIME_FORMAT: &str = "%H:%M:%S";

/// Marker shown for a service whose descriptor was never published
pub const NOT_UPLOADED: &str = "[not uploaded]";

/// Marker shown for an instance without a fetched descriptor
pub const OFFLINE: &str = "[offline]";
