//! Query input and verification result types.
//!
//! Field names on the wire follow the registry's own vocabulary (`aciklama`,
//! `tc_vatandasi`, `KimlikNo`, ...), so the JSON produced here can be handed to
//! existing consumers unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Description used when no bucket in the response carried a status code.
pub const RECORD_NOT_FOUND: &str = "record not found";

/// Status code: the person record is active.
pub const CODE_ACTIVE: u32 = 1;
/// Status code: error, mismatch or record not found.
pub const CODE_NOT_FOUND: u32 = 2;
/// Status code: the person is deceased.
pub const CODE_DECEASED: u32 = 3;

/// Identity query input. Birth month and day may be left empty; they are sent as `0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(rename = "tcno")]
    pub national_id: String,
    #[serde(rename = "firstname")]
    pub first_name: String,
    #[serde(rename = "lastname")]
    pub last_name: String,
    #[serde(rename = "birthyear")]
    pub birth_year: String,
    #[serde(rename = "birthmonth", default, skip_serializing_if = "String::is_empty")]
    pub birth_month: String,
    #[serde(rename = "birthday", default, skip_serializing_if = "String::is_empty")]
    pub birth_day: String,
}

impl QueryRequest {
    pub fn new(
        national_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        birth_year: impl Into<String>,
    ) -> Self {
        Self {
            national_id: national_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            birth_year: birth_year.into(),
            birth_month: String::new(),
            birth_day: String::new(),
        }
    }

    pub fn with_birth_month(mut self, month: impl Into<String>) -> Self {
        self.birth_month = month.into();
        self
    }

    pub fn with_birth_day(mut self, day: impl Into<String>) -> Self {
        self.birth_day = day.into();
        self
    }
}

/// Which population registry bucket produced a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersonCategory {
    #[serde(rename = "tc_vatandasi")]
    Citizen,
    #[serde(rename = "yabanci")]
    ForeignNational,
    #[serde(rename = "mavi")]
    BlueCardHolder,
    #[default]
    #[serde(rename = "")]
    Unspecified,
}

impl PersonCategory {
    pub fn is_unspecified(&self) -> bool {
        matches!(self, Self::Unspecified)
    }
}

/// Optional person attributes copied from the winning record into `extra`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonField {
    Identifier,
    GivenName,
    Surname,
    Nationality,
    BirthDate,
    DeathDate,
}

impl PersonField {
    /// Key used in [`VerificationResult::extra`].
    pub fn key(&self) -> &'static str {
        match self {
            Self::Identifier => "KimlikNo",
            Self::GivenName => "Ad",
            Self::Surname => "Soyad",
            Self::Nationality => "Uyruk",
            Self::BirthDate => "DogumTarih",
            Self::DeathDate => "OlumTarih",
        }
    }
}

/// Final outcome of one query. `status` is true exactly when `code == 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: bool,
    /// 1 = active, 2 = error / not found, 3 = deceased.
    pub code: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aciklama: String,
    #[serde(default, skip_serializing_if = "PersonCategory::is_unspecified")]
    pub person: PersonCategory,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
    /// Last raw response body, kept for diagnostics.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw: String,
}

impl VerificationResult {
    /// Result for a record with the given status code; `status` follows from the code.
    pub fn from_code(code: u32, aciklama: impl Into<String>, person: PersonCategory) -> Self {
        Self {
            status: code == CODE_ACTIVE,
            code,
            aciklama: aciklama.into(),
            person,
            extra: BTreeMap::new(),
            raw: String::new(),
        }
    }

    /// The normal "nothing matched" outcome.
    pub fn not_found(raw: impl Into<String>) -> Self {
        Self::failed(RECORD_NOT_FOUND, raw)
    }

    /// Best-effort result attached to a failure.
    pub fn failed(aciklama: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ..Self::from_code(CODE_NOT_FOUND, aciklama, PersonCategory::Unspecified)
        }
    }

    pub fn get(&self, field: PersonField) -> Option<&str> {
        self.extra.get(field.key()).map(String::as_str)
    }

    pub(crate) fn set(&mut self, field: PersonField, value: String) {
        if !value.is_empty() {
            self.extra.insert(field.key().to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_code() {
        assert!(VerificationResult::from_code(1, "", PersonCategory::Citizen).status);
        assert!(!VerificationResult::from_code(3, "", PersonCategory::Citizen).status);
        assert!(!VerificationResult::not_found("").status);
    }

    #[test]
    fn json_omits_empty_fields() {
        let json = serde_json::to_value(VerificationResult::not_found("")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "status": false, "code": 2, "aciklama": "record not found" })
        );
    }

    #[test]
    fn json_uses_registry_vocabulary() {
        let mut res = VerificationResult::from_code(1, "Açık", PersonCategory::BlueCardHolder);
        res.set(PersonField::GivenName, "JOHN".into());
        res.set(PersonField::Surname, String::new());
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["person"], "mavi");
        assert_eq!(json["extra"], serde_json::json!({ "Ad": "JOHN" }));
    }

    #[test]
    fn request_deserializes_without_optional_fields() {
        let req: QueryRequest = serde_json::from_str(
            r#"{"tcno":"99999999999","firstname":"JOHN","lastname":"DOE","birthyear":"1990"}"#,
        )
        .unwrap();
        assert_eq!(req, QueryRequest::new("99999999999", "JOHN", "DOE", "1990"));
    }
}
