/// Configuration management for thumbnail-service
///
/// Loads configuration from environment variables with sensible defaults.
/// Only the certificate paths are mandatory.
use crate::processor::ThumbnailOptions;
use anyhow::{bail, Context, Result};
use grpc_tls::TlsConfigPaths;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// 32 MiB
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Settings {
    pub server: ServerSettings,
    pub tls: TlsConfigPaths,
    pub thumbnail: ThumbnailOptions,
}

#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    /// Upper bound for decoded request messages.
    pub max_request_bytes: usize,
    /// Upper bound for encoded response messages.
    pub max_response_bytes: usize,
    /// Per-call deadline; `None` leaves calls unbounded.
    pub request_timeout: Option<Duration>,
    /// How long draining may take before in-flight calls are abandoned.
    pub drain_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            max_request_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            max_response_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            request_timeout: Some(Duration::from_secs(30)),
            drain_timeout: Duration::from_secs(25),
        }
    }
}

impl Settings {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Settings::from_env`] with a caller supplied lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ServerSettings::default();
        let thumbnail_defaults = ThumbnailOptions::default();

        let request_timeout_secs: u64 = parse_or(
            &lookup,
            "THUMBNAIL_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.map(|d| d.as_secs()).unwrap_or(0),
        )?;

        let server = ServerSettings {
            addr: parse_or(&lookup, "THUMBNAIL_SERVICE_ADDR", defaults.addr)?,
            max_request_bytes: parse_or(
                &lookup,
                "THUMBNAIL_MAX_REQUEST_BYTES",
                defaults.max_request_bytes,
            )?,
            max_response_bytes: parse_or(
                &lookup,
                "THUMBNAIL_MAX_RESPONSE_BYTES",
                defaults.max_response_bytes,
            )?,
            request_timeout: (request_timeout_secs > 0)
                .then(|| Duration::from_secs(request_timeout_secs)),
            drain_timeout: Duration::from_secs(parse_or(
                &lookup,
                "THUMBNAIL_DRAIN_TIMEOUT_SECS",
                defaults.drain_timeout.as_secs(),
            )?),
        };

        let thumbnail = ThumbnailOptions {
            width: parse_or(&lookup, "THUMBNAIL_WIDTH", thumbnail_defaults.width)?,
            height: parse_or(&lookup, "THUMBNAIL_HEIGHT", thumbnail_defaults.height)?,
        };
        if thumbnail.width == 0 || thumbnail.height == 0 {
            bail!(
                "THUMBNAIL_WIDTH and THUMBNAIL_HEIGHT must be positive (got {}x{})",
                thumbnail.width,
                thumbnail.height
            );
        }
        if server.max_request_bytes == 0 || server.max_response_bytes == 0 {
            bail!("THUMBNAIL_MAX_REQUEST_BYTES and THUMBNAIL_MAX_RESPONSE_BYTES must be positive");
        }

        let tls = TlsConfigPaths::from_lookup(&lookup).context("TLS is required")?;

        Ok(Settings {
            server,
            tls,
            thumbnail,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}={:?}: {}", name, raw, e)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let mut vars: HashMap<String, String> = [
            ("GRPC_CA_CERT_PATH", "/certs/ca.crt"),
            ("GRPC_SERVER_CERT_PATH", "/certs/server.crt"),
            ("GRPC_SERVER_KEY_PATH", "/certs/server.key"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            vars.insert(k.to_string(), v.to_string());
        }
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();

        assert_eq!(settings.server.addr, "0.0.0.0:50051".parse().unwrap());
        assert_eq!(settings.thumbnail, ThumbnailOptions { width: 200, height: 400 });
        assert_eq!(settings.server.max_request_bytes, DEFAULT_MAX_MESSAGE_BYTES);
        assert_eq!(settings.server.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.server.drain_timeout, Duration::from_secs(25));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("THUMBNAIL_SERVICE_ADDR", "127.0.0.1:6000"),
            ("THUMBNAIL_WIDTH", "64"),
            ("THUMBNAIL_HEIGHT", "48"),
            ("THUMBNAIL_MAX_REQUEST_BYTES", "1024"),
            ("THUMBNAIL_REQUEST_TIMEOUT_SECS", "0"),
            ("THUMBNAIL_DRAIN_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();

        assert_eq!(settings.server.addr.port(), 6000);
        assert_eq!(settings.thumbnail, ThumbnailOptions { width: 64, height: 48 });
        assert_eq!(settings.server.max_request_bytes, 1024);
        assert_eq!(settings.server.request_timeout, None);
        assert_eq!(settings.server.drain_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = Settings::from_lookup(lookup(&[("THUMBNAIL_WIDTH", "wide")])).unwrap_err();
        assert!(err.to_string().contains("THUMBNAIL_WIDTH"));
    }

    #[test]
    fn test_zero_dimension_is_rejected() {
        assert!(Settings::from_lookup(lookup(&[("THUMBNAIL_HEIGHT", "0")])).is_err());
    }

    #[test]
    fn test_missing_tls_paths_is_an_error() {
        assert!(Settings::from_lookup(|_| None).is_err());
    }
}
