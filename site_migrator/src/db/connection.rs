//! Connection string handling
//!
//! Turns the connection-string credential into a [`ConnectionSpec`]. A strict
//! URL parse is tried first; strings it rejects (or splits in the wrong place
//! because of unencoded reserved characters in the password) go through a
//! permissive manual decomposition instead.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;
use url::{Host, Url};

use crate::error::{Error, Result};

/// Everything except RFC 3986 unreserved characters
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Parsed database connection parameters
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub user: String,
    pub password: String,
    /// Hostname or literal IPv4/IPv6 address, without brackets
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl fmt::Debug for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSpec")
            .field("user", &self.user)
            .field("password", &"****")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectionSpec {
    /// Parse a connection string, falling back to manual decomposition when
    /// the strict parser rejects it.
    pub fn parse(raw: &str, default_port: u16) -> Result<Self> {
        if let Some(spec) = parse_strict(raw, default_port) {
            if spec.is_complete() {
                return Ok(spec);
            }
            tracing::debug!("strict parse left required fields empty; using permissive parser");
        } else {
            tracing::debug!("strict parse rejected connection string; using permissive parser");
        }

        let spec = parse_permissive(raw, default_port)?;
        if !spec.is_complete() {
            return Err(Error::ConnectionString {
                host: non_empty(&spec.host),
                user: non_empty(&spec.user),
                database: non_empty(&spec.database),
            });
        }

        Ok(spec)
    }

    /// True when user, host and database are all present
    pub fn is_complete(&self) -> bool {
        !self.user.is_empty() && !self.host.is_empty() && !self.database.is_empty()
    }

    /// Diagnostic line showing the non-secret fields
    pub fn describe(&self) -> String {
        format!(
            "host={} port={} db={} user={}",
            or_missing(&self.host),
            self.port,
            or_missing(&self.database),
            or_missing(&self.user)
        )
    }

    /// Canonical URI for this spec
    pub fn to_uri(&self) -> String {
        self.to_uri_with_host(&self.host)
    }

    /// Canonical URI pointing at `host` instead of the parsed host, with user,
    /// password and database percent-encoded.
    pub fn to_uri_with_host(&self, host: &str) -> String {
        let mut uri = format!("postgresql://{}", encode_component(&self.user));
        if !self.password.is_empty() {
            uri.push(':');
            uri.push_str(&encode_component(&self.password));
        }
        uri.push('@');
        uri.push_str(&bracket_host(host));
        uri.push_str(&format!(":{}/{}", self.port, encode_component(&self.database)));
        uri
    }
}

/// `host:port` for display, bracketing IPv6 literals
pub fn host_port(host: &str, port: u16) -> String {
    format!("{}:{}", bracket_host(host), port)
}

fn bracket_host(host: &str) -> String {
    if host.contains(':') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

/// Percent-encode a userinfo or path component
pub(crate) fn encode_component(component: &str) -> String {
    utf8_percent_encode(component, COMPONENT).to_string()
}

fn decode(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn or_missing(value: &str) -> &str {
    if value.is_empty() {
        "<missing>"
    } else {
        value
    }
}

/// Structured parse. Returns `None` when the string is not a URL or when the
/// database, query or fragment shows the authority was cut short.
fn parse_strict(raw: &str, default_port: u16) -> Option<ConnectionSpec> {
    let url = Url::parse(raw).ok()?;

    let host = match url.host()? {
        Host::Domain(domain) => domain.to_string(),
        Host::Ipv4(addr) => addr.to_string(),
        Host::Ipv6(addr) => addr.to_string(),
    };

    let path = url.path().trim_start_matches('/');
    if path.contains('/') || path.contains('@') {
        return None;
    }
    // An '@' after '?' or '#' belongs to credentials the parser split early
    let tail_has_at = |part: Option<&str>| part.is_some_and(|part| part.contains('@'));
    if tail_has_at(url.query()) || tail_has_at(url.fragment()) {
        return None;
    }

    Some(ConnectionSpec {
        user: decode(url.username()),
        password: url.password().map(decode).unwrap_or_default(),
        host,
        port: url.port().unwrap_or(default_port),
        database: decode(path),
    })
}

/// Manual decomposition: scheme, then credentials split off at the last `@`,
/// user/password split at the first `:`, then host and port.
fn parse_permissive(raw: &str, default_port: u16) -> Result<ConnectionSpec> {
    let rest = raw.split_once("://").map_or(raw, |(_, rest)| rest);

    let (credentials, location) = match rest.rsplit_once('@') {
        Some((credentials, location)) => (credentials, location),
        None => ("", rest),
    };

    let (user, password) = match credentials.split_once(':') {
        Some((user, password)) => (decode(user), decode(password)),
        None => (decode(credentials), String::new()),
    };

    let (authority, database) = match location.split_once('/') {
        Some((authority, path)) => {
            let database = path.split(['?', '#']).next().unwrap_or_default();
            (authority, decode(database))
        }
        None => (location, String::new()),
    };

    let (host, port) = split_host_port(authority, default_port)?;

    Ok(ConnectionSpec {
        user,
        password,
        host,
        port,
        database,
    })
}

fn split_host_port(authority: &str, default_port: u16) -> Result<(String, u16)> {
    if let Some(bracketed) = authority.strip_prefix('[') {
        return match bracketed.split_once(']') {
            Some((host, tail)) => {
                let port = match tail.strip_prefix(':') {
                    Some(port) => parse_port(port)?,
                    None => default_port,
                };
                Ok((host.to_string(), port))
            }
            None => Ok((bracketed.to_string(), default_port)),
        };
    }

    // More than one colon without brackets: a bare IPv6 literal
    if authority.matches(':').count() > 1 {
        return Ok((authority.to_string(), default_port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), parse_port(port)?)),
        None => Ok((authority.to_string(), default_port)),
    }
}

fn parse_port(port: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|_| Error::InvalidPort(port.to_string()))
}
