// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read once from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root for blobs, keys, share database and audit log | `./data` |
//! | `HOST` | IPv4 or IPv6 address to bind | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `PUBLIC_DOWNLOAD_URL` | Download page placed in the access link | `http://localhost:3001/download` |
//! | `ACCESS_TOKEN_SECRET` | HMAC secret for access tokens and OTP digests (≥ 32 bytes) | Required |
//! | `AUTH_JWT_SECRET` | HMAC secret for sender session JWTs (≥ 32 bytes) | Required |
//! | `SHARE_TTL_SECS` | Share and access token lifetime | `300` |
//! | `OTP_TTL_SECS` | One-time code lifetime | `300` |
//! | `OTP_CACHE_CAPACITY` | Max outstanding one-time codes in memory | `10000` |
//! | `RSA_KEY_BITS` | Modulus size for new key versions | `2048` |
//! | `KEY_ROTATION_INTERVAL_SECS` | Min key age before an upload rotates (`0` = every upload) | `0` |
//! | `KEY_GC_DELAY_MS` | Delay before a triggered key GC runs | `2000` |
//! | `SWEEP_INTERVAL_SECS` | Expiry sweeper period | `30` |
//! | `MAX_UPLOAD_BYTES` | Request body limit for uploads | `52428800` |
//! | `CLAMD_ADDR` | clamd `host:port`; unset disables scanning | Optional |
//! | `SCAN_TIMEOUT_SECS` | clamd round-trip timeout | `60` |
//! | `PRIMARY_WEBHOOK_URL` | Access link delivery webhook | Optional |
//! | `SECONDARY_WEBHOOK_URL` | One-time code delivery webhook | Optional |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | Serve HTTPS when both are set | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::storage::paths::DATA_ROOT;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const PUBLIC_DOWNLOAD_URL_ENV: &str = "PUBLIC_DOWNLOAD_URL";
pub const ACCESS_TOKEN_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET";
pub const AUTH_JWT_SECRET_ENV: &str = "AUTH_JWT_SECRET";
pub const SHARE_TTL_SECS_ENV: &str = "SHARE_TTL_SECS";
pub const OTP_TTL_SECS_ENV: &str = "OTP_TTL_SECS";
pub const OTP_CACHE_CAPACITY_ENV: &str = "OTP_CACHE_CAPACITY";
pub const RSA_KEY_BITS_ENV: &str = "RSA_KEY_BITS";
pub const KEY_ROTATION_INTERVAL_SECS_ENV: &str = "KEY_ROTATION_INTERVAL_SECS";
pub const KEY_GC_DELAY_MS_ENV: &str = "KEY_GC_DELAY_MS";
pub const SWEEP_INTERVAL_SECS_ENV: &str = "SWEEP_INTERVAL_SECS";
pub const MAX_UPLOAD_BYTES_ENV: &str = "MAX_UPLOAD_BYTES";
pub const CLAMD_ADDR_ENV: &str = "CLAMD_ADDR";
pub const SCAN_TIMEOUT_SECS_ENV: &str = "SCAN_TIMEOUT_SECS";
pub const PRIMARY_WEBHOOK_URL_ENV: &str = "PRIMARY_WEBHOOK_URL";
pub const SECONDARY_WEBHOOK_URL_ENV: &str = "SECONDARY_WEBHOOK_URL";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

const DEFAULT_PUBLIC_DOWNLOAD_URL: &str = "http://localhost:3001/download";
const MIN_SECRET_BYTES: usize = 32;
const MIN_RSA_KEY_BITS: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

fn invalid(var: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.into(),
    }
}

/// Secret bytes that never show up in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes(<{} bytes redacted>)", self.0.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected `json` or `pretty`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Everything the server needs at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub public_download_url: Url,
    pub access_token_secret: SecretBytes,
    pub auth_jwt_secret: SecretBytes,
    pub share_ttl: Duration,
    pub otp_ttl: Duration,
    pub otp_cache_capacity: usize,
    pub rsa_key_bits: usize,
    pub key_rotation_interval: Duration,
    pub key_gc_delay: Duration,
    pub sweep_interval: Duration,
    pub max_upload_bytes: usize,
    pub clamd_addr: Option<String>,
    pub scan_timeout: Duration,
    pub primary_webhook_url: Option<Url>,
    pub secondary_webhook_url: Option<Url>,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let parse = |var: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(var) {
                Some(raw) => raw.parse::<u64>().map_err(|e| invalid(var, e.to_string())),
                None => Ok(default),
            }
        };

        let secret = |var: &'static str| -> Result<SecretBytes, ConfigError> {
            let value = get(var).ok_or(ConfigError::Missing(var))?;
            if value.len() < MIN_SECRET_BYTES {
                return Err(invalid(var, format!("must be at least {MIN_SECRET_BYTES} bytes")));
            }
            Ok(SecretBytes::new(value.into_bytes()))
        };

        let url = |var: &'static str| -> Result<Option<Url>, ConfigError> {
            get(var)
                .map(|raw| Url::parse(&raw).map_err(|e| invalid(var, e.to_string())))
                .transpose()
        };

        let host = match get(HOST_ENV) {
            Some(raw) => raw
                .trim_start_matches('[')
                .trim_end_matches(']')
                .parse()
                .map_err(|e: std::net::AddrParseError| invalid(HOST_ENV, e.to_string()))?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let port = u16::try_from(parse(PORT_ENV, 8080)?)
            .map_err(|_| invalid(PORT_ENV, "must be at most 65535"))?;

        let share_ttl_secs = parse(SHARE_TTL_SECS_ENV, 300)?;
        if share_ttl_secs == 0 {
            return Err(invalid(SHARE_TTL_SECS_ENV, "must be positive"));
        }
        let otp_ttl_secs = parse(OTP_TTL_SECS_ENV, 300)?;
        if otp_ttl_secs == 0 {
            return Err(invalid(OTP_TTL_SECS_ENV, "must be positive"));
        }

        let rsa_key_bits = usize::try_from(parse(RSA_KEY_BITS_ENV, 2048)?)
            .map_err(|e| invalid(RSA_KEY_BITS_ENV, e.to_string()))?;
        if rsa_key_bits < MIN_RSA_KEY_BITS {
            return Err(invalid(
                RSA_KEY_BITS_ENV,
                format!("must be at least {MIN_RSA_KEY_BITS}"),
            ));
        }

        let sweep_interval_secs = parse(SWEEP_INTERVAL_SECS_ENV, 30)?;
        if sweep_interval_secs == 0 {
            return Err(invalid(SWEEP_INTERVAL_SECS_ENV, "must be positive"));
        }

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: PathBuf::from(cert),
                key: PathBuf::from(key),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(TLS_KEY_PATH_ENV)),
            (None, Some(_)) => return Err(ConfigError::Missing(TLS_CERT_PATH_ENV)),
        };

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse().map_err(|e: String| invalid(LOG_FORMAT_ENV, e))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DATA_ROOT.to_string())),
            host,
            port,
            public_download_url: url(PUBLIC_DOWNLOAD_URL_ENV)?.map_or_else(
                || Url::parse(DEFAULT_PUBLIC_DOWNLOAD_URL).map_err(|e| invalid(PUBLIC_DOWNLOAD_URL_ENV, e.to_string())),
                Ok,
            )?,
            access_token_secret: secret(ACCESS_TOKEN_SECRET_ENV)?,
            auth_jwt_secret: secret(AUTH_JWT_SECRET_ENV)?,
            share_ttl: Duration::from_secs(share_ttl_secs),
            otp_ttl: Duration::from_secs(otp_ttl_secs),
            otp_cache_capacity: usize::try_from(parse(OTP_CACHE_CAPACITY_ENV, 10_000)?)
                .map_err(|e| invalid(OTP_CACHE_CAPACITY_ENV, e.to_string()))?,
            rsa_key_bits,
            key_rotation_interval: Duration::from_secs(parse(KEY_ROTATION_INTERVAL_SECS_ENV, 0)?),
            key_gc_delay: Duration::from_millis(parse(KEY_GC_DELAY_MS_ENV, 2000)?),
            sweep_interval: Duration::from_secs(sweep_interval_secs),
            max_upload_bytes: usize::try_from(parse(MAX_UPLOAD_BYTES_ENV, 50 * 1024 * 1024)?)
                .map_err(|e| invalid(MAX_UPLOAD_BYTES_ENV, e.to_string()))?,
            clamd_addr: get(CLAMD_ADDR_ENV),
            scan_timeout: Duration::from_secs(parse(SCAN_TIMEOUT_SECS_ENV, 60)?),
            primary_webhook_url: url(PRIMARY_WEBHOOK_URL_ENV)?,
            secondary_webhook_url: url(SECONDARY_WEBHOOK_URL_ENV)?,
            tls,
            log_format,
        })
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
