//! Endpoint resolution
//!
//! Users configure an instance as whatever they typed into a text field:
//! `lemmy.ml`, `https://lemmy.ml/`, or even a URL copied from a previous
//! session. [`Endpoint::from_instance`] reduces all of these to the bare host
//! and rebuilds the canonical realtime URL:
//!
//! ```text
//! wss://<bare-host>/api/v2/ws
//! ```
//!
//! Normalization is idempotent: feeding an endpoint's own URL back in
//! yields the same endpoint.
//!
//! # Examples
//!
//! ```rust
//! use linkwire_core::Endpoint;
//!
//! let endpoint = Endpoint::from_instance("https://lemmy.ml/").unwrap();
//! assert_eq!(endpoint.as_str(), "wss://lemmy.ml/api/v2/ws");
//! assert_eq!(Endpoint::from_instance(endpoint.as_str()).unwrap(), endpoint);
//! ```

use crate::error::{Error, Result};
use std::fmt;
use url::Url;

/// Path of the realtime API on every instance
pub const API_PATH: &str = "/api/v2/ws";

/// Path of the pictrs image upload endpoint on every instance
pub const PICTRS_IMAGE_PATH: &str = "/pictrs/image";

const STRIPPED_SCHEMES: [&str; 4] = ["https://", "http://", "wss://", "ws://"];

/// Canonical WebSocket URL of an instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Resolve a user-supplied instance host into its canonical endpoint
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the host is empty or cannot form a
    /// valid URL (whitespace, illegal characters, embedded paths).
    pub fn from_instance(instance: &str) -> Result<Self> {
        let host = normalize_instance(instance);

        if host.is_empty() {
            return Err(Error::Configuration(format!(
                "instance host is empty: {:?}",
                instance
            )));
        }
        if host.contains('/') {
            return Err(Error::Configuration(format!(
                "instance host must not contain a path: {:?}",
                instance
            )));
        }

        let url = Url::parse(&format!("wss://{}{}", host, API_PATH)).map_err(|e| {
            Error::Configuration(format!("invalid instance host {:?}: {}", instance, e))
        })?;

        if url.host_str().map_or(true, str::is_empty) {
            return Err(Error::Configuration(format!(
                "instance host has no host component: {:?}",
                instance
            )));
        }

        Ok(Self { url })
    }

    /// Use a full `ws://` or `wss://` URL verbatim
    ///
    /// Meant for local instances and test servers that do not live at the
    /// canonical path or do not speak TLS.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for unparsable URLs or other schemes.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::Configuration(format!("invalid endpoint url {:?}: {}", url, e)))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::Configuration(format!(
                    "endpoint scheme must be ws or wss, got {}",
                    other
                )))
            }
        }
        if url.host_str().is_none() {
            return Err(Error::Configuration(format!(
                "endpoint url has no host: {}",
                url
            )));
        }

        Ok(Self { url })
    }

    /// The full WebSocket URL
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Host (and port, if non-default) of the instance
    pub fn host(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        }
    }

    /// HTTP base URL of the same instance, without a trailing slash
    ///
    /// `wss` endpoints map to `https`, `ws` endpoints to `http`.
    pub fn http_base(&self) -> String {
        let scheme = if self.url.scheme() == "ws" { "http" } else { "https" };
        format!("{}://{}", scheme, self.host())
    }

    /// Resolve an HTTP path (or absolute URL) against this instance
    pub fn http_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.http_base(), path)
        } else {
            format!("{}/{}", self.http_base(), path)
        }
    }

    /// True if `url` points at this instance (same host and port)
    ///
    /// Credentials are only attached to URLs that pass this check.
    pub fn serves(&self, url: &str) -> bool {
        let Ok(other) = Url::parse(url) else {
            return false;
        };
        other.host_str().is_some()
            && other.host_str() == self.url.host_str()
            && other.port_or_known_default() == self.url.port_or_known_default()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Endpoint::from_instance(s)
    }
}

/// Reduce a user-supplied instance string to its bare host
///
/// Strips surrounding whitespace, a leading scheme, trailing slashes and an
/// already-present realtime API path.
pub fn normalize_instance(instance: &str) -> String {
    let mut link = instance.trim();

    for scheme in STRIPPED_SCHEMES {
        if let Some(rest) = link.strip_prefix(scheme) {
            link = rest;
            break;
        }
    }

    link = link.trim_end_matches('/');
    if let Some(rest) = link.strip_suffix(API_PATH) {
        link = rest.trim_end_matches('/');
    }

    link.to_string()
}
