//! Header names and well-known identifiers.

/// Response header carrying the matched stub's position in the repository
pub const HEADER_X_STUBBY_RESOURCE_ID: &str = "x-stubby-resource-id";

/// Request header selecting a proxy config by UUID
pub const HEADER_X_STUBBY_PROXY_CONFIG: &str = "x-stubby4j-proxy-config-uuid";

/// Request header added to proxied requests
pub const HEADER_X_STUBBY_PROXY_REQUEST: &str = "x-stubby4j-proxy-request-uuid";

/// Response header added to proxied responses
pub const HEADER_X_STUBBY_PROXY_RESPONSE: &str = "x-stubby4j-proxy-response-uuid";

/// UUID of the proxy config used when no other is selected
pub const DEFAULT_PROXY_CONFIG_UUID: &str = "default";
