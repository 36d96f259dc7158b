//! YAML stub configuration.
//!
//! A configuration file is a YAML list. Every item is either a stub:
//!
//! ```yaml
//! - description: invoice lookup
//!   uuid: invoice-123
//!   request:
//!     url: ^/invoice/\d+$
//!     method: [GET, HEAD]
//!     headers:
//!       authorization-basic: "bob:secret"
//!   response:
//!     - status: 200
//!       body: first
//!     - status: 500
//!       file: responses/error.json
//! ```
//!
//! or a proxy config used when no stub matches:
//!
//! ```yaml
//! - proxy-config:
//!     uuid: default
//!     strategy: additive
//!     properties:
//!       endpoint: https://upstream.example.com
//!     headers:
//!       x-forwarded-by: stubby
//! ```
//!
//! `file` paths resolve against the directory holding the configuration.

mod proxy;
mod stub;

use crate::repository::{ParseResult, RepositoryError};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[allow(unused_imports)]
pub use proxy::ProxyConfigEntry;
#[allow(unused_imports)]
pub use stub::{RequestEntry, ResponseEntries, ResponseEntry, StubEntry};

const PROXY_CONFIG_KEY: &str = "proxy-config";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Configuration must be a YAML list of stubs and proxy configs")]
    NotAList,
    #[error("Invalid entry #{index}: {message}")]
    InvalidStub { index: usize, message: String },
    #[error("Duplicate uuid {0}")]
    DuplicateUuid(String),
}

/// Any YAML scalar, kept as text
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn into_string(self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s,
        }
    }
}

/// `method: GET` or `method: [GET, HEAD]`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(one) => vec![one],
            OneOrMany::Many(many) => many,
        }
    }
}

/// Load stubs and proxy configs from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ParseResult, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let parsed = load_config_str(&contents, base_dir)?;
    info!(
        "Loaded {} stubs and {} proxy configs from {}",
        parsed.stubs().len(),
        parsed.proxy_configs().len(),
        path.display()
    );
    Ok(parsed)
}

/// Load stubs and proxy configs from YAML text; `file` references resolve against `base_dir`
pub fn load_config_str(yaml: &str, base_dir: &Path) -> Result<ParseResult, ConfigError> {
    let items = match serde_yaml::from_str::<Value>(yaml)? {
        Value::Null => Vec::new(),
        Value::Sequence(items) => items,
        _ => return Err(ConfigError::NotAList),
    };

    let mut stubs = Vec::new();
    let mut proxy_configs = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        let complete_yaml = serde_yaml::to_string(&[&item])?;

        if let Some(proxy) = item.get(PROXY_CONFIG_KEY) {
            let entry: ProxyConfigEntry =
                serde_yaml::from_value(proxy.clone()).map_err(|e| invalid(index, e))?;
            proxy_configs.push(entry.into_proxy_config(index, complete_yaml)?);
        } else {
            let entry: StubEntry = serde_yaml::from_value(item).map_err(|e| invalid(index, e))?;
            stubs.push(entry.into_lifecycle(index, base_dir, complete_yaml)?);
        }
    }

    debug!(
        "Parsed {} stubs and {} proxy configs",
        stubs.len(),
        proxy_configs.len()
    );
    ParseResult::new(stubs, proxy_configs).map_err(|e| match e {
        RepositoryError::DuplicateUuid(uuid) => ConfigError::DuplicateUuid(uuid),
        other => ConfigError::InvalidStub {
            index: 0,
            message: other.to_string(),
        },
    })
}

fn invalid(index: usize, error: serde_yaml::Error) -> ConfigError {
    ConfigError::InvalidStub {
        index,
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stubs::ProxyStrategy;
    use std::fs;

    #[test]
    fn test_parse_stubs() {
        let yaml = r#"
- description: invoice
  uuid: invoice-123
  request:
    url: /invoice/123
    method: [get, HEAD]
    query:
      status: paid
      page: 2
  response:
    status: "201"
    body: This is a response for 123
    headers:
      content-type: text/plain
    latency: 50

- request:
    url: /seq
  response:
    - status: 200
      body: OK
    - status: 500
      body: OMFG
"#;
        let parsed = load_config_str(yaml, Path::new(".")).unwrap();

        assert_eq!(parsed.stubs().len(), 2);
        let invoice = parsed.stub_by_uuid("invoice-123").unwrap();
        assert_eq!(invoice.description(), Some("invoice"));
        assert_eq!(invoice.request().methods(), ["GET", "HEAD"]);
        assert_eq!(
            invoice.request().query().get("page").map(String::as_str),
            Some("2")
        );
        let response = &invoice.responses()[0];
        assert_eq!(response.status(), 201);
        assert_eq!(response.body_text(), "This is a response for 123");
        assert_eq!(response.latency(), Some(50));

        let sequenced = &parsed.stubs()[1];
        assert_eq!(sequenced.responses().len(), 2);
        assert_eq!(sequenced.responses()[1].status(), 500);
    }

    #[test]
    fn test_raw_yaml_is_kept() {
        let yaml = "- request:\n    url: /a\n  response:\n    body: hi\n";
        let parsed = load_config_str(yaml, Path::new(".")).unwrap();
        let stub = &parsed.stubs()[0];

        assert!(stub.complete_yaml().starts_with("- request:"));
        assert!(stub.complete_yaml().contains("url: /a"));
        assert!(stub.request_yaml().starts_with("request:"));
        assert!(stub.response_yaml().contains("body: hi"));
    }

    #[test]
    fn test_auth_headers_are_normalized() {
        let yaml = r#"
- request:
    url: /secured
    headers:
      authorization-basic: "bob:secret"
  response:
    status: 200
"#;
        let parsed = load_config_str(yaml, Path::new(".")).unwrap();
        assert_eq!(
            parsed.stubs()[0].request().expected_authorization(),
            Some("Basic Ym9iOnNlY3JldA==")
        );
    }

    #[test]
    fn test_files_resolve_against_config_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("bodies")).unwrap();
        fs::write(dir.path().join("bodies/response.json"), r#"{"ok": true}"#).unwrap();
        fs::write(
            dir.path().join("stubs.yaml"),
            "- request:\n    url: /file\n  response:\n    body: inline\n    file: bodies/response.json\n",
        )
        .unwrap();

        let parsed = load_config(dir.path().join("stubs.yaml")).unwrap();
        let response = &parsed.stubs()[0].responses()[0];

        assert_eq!(response.body_text(), r#"{"ok": true}"#);
        assert_eq!(
            response.file(),
            Some(dir.path().join("bodies/response.json").as_path())
        );
    }

    #[test]
    fn test_missing_file_keeps_inline_body() {
        let yaml = "- request:\n    url: /file\n  response:\n    body: inline\n    file: nowhere.json\n";
        let parsed = load_config_str(yaml, Path::new("/nonexistent")).unwrap();
        assert_eq!(parsed.stubs()[0].responses()[0].body_text(), "inline");
    }

    #[test]
    fn test_proxy_configs() {
        let yaml = r#"
- proxy-config:
    description: fallback
    properties:
      endpoint: http://upstream.local
- proxy-config:
    uuid: extra
    strategy: additive
    properties:
      endpoint: http://extra.local
    headers:
      x-api-key: secret
"#;
        let parsed = load_config_str(yaml, Path::new(".")).unwrap();
        let configs = parsed.proxy_configs();

        assert_eq!(configs.len(), 2);
        assert!(configs[0].is_default());
        assert_eq!(configs[0].endpoint(), "http://upstream.local");
        assert!(configs[0].yaml().contains("proxy-config"));
        assert_eq!(configs[1].strategy(), ProxyStrategy::Additive);
        assert_eq!(
            configs[1].headers().get("x-api-key").map(String::as_str),
            Some("secret")
        );
    }

    #[test]
    fn test_proxy_config_requires_endpoint() {
        let yaml = "- proxy-config:\n    uuid: default\n";
        assert!(matches!(
            load_config_str(yaml, Path::new(".")),
            Err(ConfigError::InvalidStub { index: 0, .. })
        ));
    }

    #[test]
    fn test_duplicate_uuid_is_rejected() {
        let yaml = r#"
- uuid: same
  request:
    url: /a
- uuid: same
  request:
    url: /b
"#;
        assert!(matches!(
            load_config_str(yaml, Path::new(".")),
            Err(ConfigError::DuplicateUuid(uuid)) if uuid == "same"
        ));
    }

    #[test]
    fn test_invalid_entries() {
        assert!(matches!(
            load_config_str("request: {}", Path::new(".")),
            Err(ConfigError::NotAList)
        ));
        assert!(matches!(
            load_config_str("- request:\n    url: /a\n  response:\n    status: abc\n", Path::new(".")),
            Err(ConfigError::InvalidStub { index: 0, .. })
        ));
        assert!(matches!(
            load_config_str("- response:\n    status: 200\n", Path::new(".")),
            Err(ConfigError::InvalidStub { index: 0, .. })
        ));
        assert!(load_config_str("", Path::new(".")).unwrap().stubs().is_empty());
    }

    #[test]
    fn test_missing_config_file() {
        assert!(matches!(
            load_config("/nonexistent/stubs.yaml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
