//! Shared domain types for the governance core.
//!
//! Everything here is immutable once constructed. A [`RequestContext`] is
//! built once per inbound request and handed through policy evaluation, risk
//! scoring, and audit logging without modification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing domain enums out of free-form strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeParseError {
    #[error("unknown data classification '{0}' (expected public|internal|confidential|phi|restricted)")]
    Classification(String),

    #[error("unknown industry '{0}' (expected healthcare|financial|legal|government|general)")]
    Industry(String),
}

/// Data-sensitivity levels, ordered from least to most restrictive.
///
/// The ordering is load-bearing: threshold conditions in policy rules compare
/// against it, so `Public < Internal < Confidential < Phi < Restricted`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DataClassification {
    Public,
    Internal,
    Confidential,
    Phi,
    Restricted,
}

impl DataClassification {
    /// Levels that may only be routed to providers with a signed
    /// data-processing agreement.
    pub fn requires_signed_baa(self) -> bool {
        matches!(self, Self::Phi | Self::Restricted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Confidential => "confidential",
            Self::Phi => "phi",
            Self::Restricted => "restricted",
        }
    }
}

impl fmt::Display for DataClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataClassification {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "internal" => Ok(Self::Internal),
            "confidential" => Ok(Self::Confidential),
            "phi" => Ok(Self::Phi),
            "restricted" => Ok(Self::Restricted),
            other => Err(TypeParseError::Classification(other.to_string())),
        }
    }
}

/// Industry tag carried by a request, used to select compliance rules.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    Healthcare,
    Financial,
    Legal,
    Government,
    General,
}

impl Industry {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthcare => "healthcare",
            Self::Financial => "financial",
            Self::Legal => "legal",
            Self::Government => "government",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Industry {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthcare" => Ok(Self::Healthcare),
            "financial" => Ok(Self::Financial),
            "legal" => Ok(Self::Legal),
            "government" => Ok(Self::Government),
            "general" => Ok(Self::General),
            other => Err(TypeParseError::Industry(other.to_string())),
        }
    }
}

/// Identifier of a text-generation provider (e.g. "anthropic", "openai").
///
/// Ordered so provider sets iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable context for one inbound generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique request identifier, caller- or gateway-generated.
    pub request_id: String,

    /// Requesting user. Only a one-way hash of this ever reaches storage.
    pub user_id: String,

    /// The prompt to be generated against. Hashed, never stored raw.
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    pub industry: Industry,

    pub data_classification: DataClassification,
}

impl RequestContext {
    /// Create a context with the least restrictive defaults
    /// (`general` industry, `internal` classification).
    pub fn new(
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            prompt: prompt.into(),
            system_prompt: None,
            industry: Industry::General,
            data_classification: DataClassification::Internal,
        }
    }

    pub fn with_industry(mut self, industry: Industry) -> Self {
        self.industry = industry;
        self
    }

    pub fn with_classification(mut self, classification: DataClassification) -> Self {
        self.data_classification = classification;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}
