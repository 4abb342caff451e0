//! Company profile: the plaintext sealed inside every capability record.
//!
//! The profile carries its own quota counters (`max_requests`,
//! `current_requests`), so the only way to read or change a tenant's usage
//! is to hold the key that decrypts its record.

use serde::{Deserialize, Serialize};

/// Subscription tier of a company.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Team,
    Business,
    Enterprise,
}

impl Tier {
    /// Request allowance granted when a profile does not set one.
    #[must_use]
    pub const fn default_max_requests(self) -> u64 {
        match self {
            Self::Free => 10,
            Self::Pro => 1_000,
            Self::Team => 10_000,
            Self::Business => 100_000,
            Self::Enterprise => u64::MAX,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
            Self::Team => write!(f, "team"),
            Self::Business => write!(f, "business"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "team" => Ok(Self::Team),
            "business" => Ok(Self::Business),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// A company's sensitive profile.
///
/// Deserialization fills absent quota fields from the tier, so records
/// written before quotas existed still resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ProfileDocument")]
pub struct CompanyProfile {
    /// Reference to the external service credential this company uses.
    pub key_service: String,
    pub company_name: String,
    pub license: String,
    pub employees: u64,
    pub services: Vec<String>,
    pub subscription: Tier,
    /// Quota ceiling.
    pub max_requests: u64,
    /// Quota consumed so far.
    pub current_requests: u64,
}

impl CompanyProfile {
    /// Build a profile on the given tier with that tier's allowance and
    /// nothing consumed.
    #[must_use]
    pub fn new(
        key_service: impl Into<String>,
        company_name: impl Into<String>,
        license: impl Into<String>,
        employees: u64,
        services: Vec<String>,
        subscription: Tier,
    ) -> Self {
        Self {
            key_service: key_service.into(),
            company_name: company_name.into(),
            license: license.into(),
            employees,
            services,
            subscription,
            max_requests: subscription.default_max_requests(),
            current_requests: 0,
        }
    }

    /// Requests left before the ceiling. Zero when at or past it.
    #[must_use]
    pub fn remaining_requests(&self) -> u64 {
        self.max_requests.saturating_sub(self.current_requests)
    }
}

/// Wire form with every defaultable field optional.
#[derive(Deserialize)]
struct ProfileDocument {
    key_service: String,
    company_name: String,
    license: String,
    employees: u64,
    #[serde(default)]
    services: Vec<String>,
    #[serde(default)]
    subscription: Tier,
    max_requests: Option<u64>,
    current_requests: Option<u64>,
}

impl From<ProfileDocument> for CompanyProfile {
    fn from(doc: ProfileDocument) -> Self {
        Self {
            key_service: doc.key_service,
            company_name: doc.company_name,
            license: doc.license,
            employees: doc.employees,
            services: doc.services,
            subscription: doc.subscription,
            max_requests: doc
                .max_requests
                .unwrap_or_else(|| doc.subscription.default_max_requests()),
            current_requests: doc.current_requests.unwrap_or(0),
        }
    }
}
