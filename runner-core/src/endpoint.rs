//! Connection endpoint templating (`${key}` syntax).
//!
//! The template is shared by every database in a run; only `${database}`
//! changes between targets. Values are substituted verbatim, so credentials
//! containing URI-reserved characters must be configured percent-encoded.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Serialize, Serializer};

use crate::config::ConnectionConfig;
use crate::error::{Result, RunnerError};

/// Compiled regex for matching `${key}` placeholders.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

const REDACTED: &str = "****";

/// A fully substituted connection endpoint.
///
/// `Debug` and `Display` show the redacted form; use [`Endpoint::expose`]
/// only when handing the value to the migration tool.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    redacted: String,
}

impl Endpoint {
    /// The endpoint including credentials.
    pub fn expose(&self) -> &str {
        &self.url
    }

    /// The endpoint with the password masked.
    pub fn redacted(&self) -> &str {
        &self.redacted
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Endpoint").field(&self.redacted).finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted)
    }
}

impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.redacted)
    }
}

/// Replace all `${key}` placeholders in `template`.
///
/// Lookup is case-insensitive. A placeholder without a value is an error
/// listing the keys that are available.
pub fn replace_placeholders(template: &str, values: &HashMap<String, String>) -> Result<String> {
    let lower_map: HashMap<String, &String> =
        values.iter().map(|(k, v)| (k.to_lowercase(), v)).collect();

    let mut result = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let (Some(full_match), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        result.push_str(&template[last_end..full_match.start()]);

        match lower_map.get(&key.as_str().to_lowercase()) {
            Some(value) => result.push_str(value),
            None => {
                let mut available: Vec<&str> = values.keys().map(String::as_str).collect();
                available.sort_unstable();
                return Err(RunnerError::PlaceholderNotFound {
                    key: key.as_str().to_string(),
                    available: if available.is_empty() {
                        "(none)".to_string()
                    } else {
                        available.join(", ")
                    },
                });
            }
        }

        last_end = full_match.end();
    }

    result.push_str(&template[last_end..]);
    Ok(result)
}

/// Build the placeholder map for one target database.
pub fn build_placeholders(connection: &ConnectionConfig, database: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    map.insert("database".to_string(), database.to_string());
    if let Some(ref host) = connection.host {
        map.insert("host".to_string(), host.clone());
    }
    if let Some(ref user) = connection.user {
        map.insert("user".to_string(), user.clone());
    }
    if let Some(ref password) = connection.password {
        map.insert("password".to_string(), password.clone());
    }
    map
}

/// Render the endpoint for `database` from the configured template.
pub fn render(connection: &ConnectionConfig, database: &str) -> Result<Endpoint> {
    let mut values = build_placeholders(connection, database);
    let url = replace_placeholders(&connection.template, &values)?;

    if values.contains_key("password") {
        values.insert("password".to_string(), REDACTED.to_string());
    }
    let redacted = replace_placeholders(&connection.template, &values)?;

    Ok(Endpoint { url, redacted })
}
