//! otpauth URI parsing and rendering.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

/// Hash algorithm behind an OTP secret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OtpAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl OtpAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SHA1" => Some(Self::Sha1),
            "SHA256" => Some(Self::Sha256),
            "SHA512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// Time or counter based OTP flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpKind {
    Totp { period: u32 },
    Hotp { counter: u64 },
}

/// Errors from parsing an otpauth URI.
#[derive(Debug, Error)]
pub enum OtpParseError {
    #[error("not a valid uri: {0}")]
    InvalidUri(#[from] url::ParseError),
    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("unsupported otp type {0:?}")]
    UnsupportedType(String),
    #[error("missing secret parameter")]
    MissingSecret,
}

/// One-time password configuration carried by an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpElement {
    pub kind: OtpKind,
    /// Base32 encoded shared secret.
    pub secret: String,
    pub digits: u32,
    pub algorithm: OtpAlgorithm,
    pub issuer: Option<String>,
}

impl OtpElement {
    /// Time based element with the usual 30s/6-digit/SHA1 defaults.
    pub fn totp(secret: impl Into<String>) -> Self {
        Self {
            kind: OtpKind::Totp { period: 30 },
            secret: secret.into(),
            digits: 6,
            algorithm: OtpAlgorithm::Sha1,
            issuer: None,
        }
    }

    /// Counter based element starting at zero.
    pub fn hotp(secret: impl Into<String>) -> Self {
        Self {
            kind: OtpKind::Hotp { counter: 0 },
            secret: secret.into(),
            digits: 6,
            algorithm: OtpAlgorithm::Sha1,
            issuer: None,
        }
    }

    /// Render the element as an otpauth URI.
    pub fn otpauth_uri(&self) -> String {
        let type_name = match self.kind {
            OtpKind::Totp { .. } => "totp",
            OtpKind::Hotp { .. } => "hotp",
        };
        let Ok(mut url) = Url::parse(&format!("otpauth://{type_name}/")) else {
            return String::new();
        };
        url.set_path(self.issuer.as_deref().unwrap_or("entry"));
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("secret", &self.secret);
            pairs.append_pair("digits", &self.digits.to_string());
            pairs.append_pair("algorithm", self.algorithm.as_str());
            match self.kind {
                OtpKind::Totp { period } => pairs.append_pair("period", &period.to_string()),
                OtpKind::Hotp { counter } => pairs.append_pair("counter", &counter.to_string()),
            };
            if let Some(issuer) = &self.issuer {
                pairs.append_pair("issuer", issuer);
            }
        }
        url.into()
    }

    /// Parse an otpauth URI.
    pub fn from_otpauth_uri(uri: &str) -> Result<Self, OtpParseError> {
        let url = Url::parse(uri)?;
        if url.scheme() != "otpauth" {
            return Err(OtpParseError::UnsupportedScheme(url.scheme().to_string()));
        }

        let mut secret = None;
        let mut digits = 6;
        let mut period = 30;
        let mut counter = 0;
        let mut algorithm = OtpAlgorithm::Sha1;
        let mut issuer = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "secret" => secret = Some(value.into_owned()),
                "digits" => {
                    if let Ok(parsed) = value.parse() {
                        digits = parsed;
                    }
                }
                "period" => {
                    if let Ok(parsed) = value.parse() {
                        period = parsed;
                    }
                }
                "counter" => {
                    if let Ok(parsed) = value.parse() {
                        counter = parsed;
                    }
                }
                "algorithm" => {
                    if let Some(parsed) = OtpAlgorithm::from_name(&value) {
                        algorithm = parsed;
                    }
                }
                "issuer" => issuer = Some(value.into_owned()),
                _ => {}
            }
        }

        let kind = match url.host_str().unwrap_or_default().to_ascii_lowercase().as_str() {
            "totp" => OtpKind::Totp { period },
            "hotp" => OtpKind::Hotp { counter },
            other => return Err(OtpParseError::UnsupportedType(other.to_string())),
        };
        let secret = secret
            .filter(|s| !s.is_empty())
            .ok_or(OtpParseError::MissingSecret)?;

        Ok(Self {
            kind,
            secret,
            digits,
            algorithm,
            issuer,
        })
    }
}

impl FromStr for OtpElement {
    type Err = OtpParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_otpauth_uri(s)
    }
}

impl fmt::Display for OtpElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.otpauth_uri())
    }
}
