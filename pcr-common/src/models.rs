//! Record models shared by the pipeline and the read-side consumers

use serde::{Deserialize, Serialize};

/// One resolved postal code.
///
/// Every field is always present; values the upstream service omitted are
/// empty strings. `code` is the 8-digit normalized key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressRecord {
    pub code: String,
    pub street: String,
    pub complement: String,
    pub unit: String,
    pub neighborhood: String,
    pub locality: String,
    pub state_code: String,
    pub state_name: String,
    pub region: String,
    pub administrative_code: String,
    pub fiscal_zone_code: String,
    pub area_code: String,
    pub financial_system_code: String,
}

impl AddressRecord {
    /// Column / element names in storage order
    pub const FIELD_NAMES: [&'static str; 13] = [
        "code",
        "street",
        "complement",
        "unit",
        "neighborhood",
        "locality",
        "state_code",
        "state_name",
        "region",
        "administrative_code",
        "fiscal_zone_code",
        "area_code",
        "financial_system_code",
    ];

    /// Field values in the same order as [`Self::FIELD_NAMES`]
    pub fn field_values(&self) -> [&str; 13] {
        [
            self.code.as_str(),
            self.street.as_str(),
            self.complement.as_str(),
            self.unit.as_str(),
            self.neighborhood.as_str(),
            self.locality.as_str(),
            self.state_code.as_str(),
            self.state_name.as_str(),
            self.region.as_str(),
            self.administrative_code.as_str(),
            self.fiscal_zone_code.as_str(),
            self.area_code.as_str(),
            self.financial_system_code.as_str(),
        ]
    }

    /// `(name, value)` pairs in storage order
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        Self::FIELD_NAMES.into_iter().zip(self.field_values())
    }
}

/// A terminal failure.
///
/// `code` is empty for failures not scoped to one postal code (startup probes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: String,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
