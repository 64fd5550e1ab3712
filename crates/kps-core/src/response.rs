//! Verification response parsing.
//!
//! A response can carry up to three person buckets (citizen, foreign national,
//! blue-card holder). Exactly one wins: the service's own "filled component"
//! hint decides the order they are tried in, and the first bucket holding a
//! status code produces the result. Everything is matched by local name, so the
//! prefixes the server chooses do not matter.

use crate::error::{KpsError, QueryFailure};
use crate::models::{PersonCategory, PersonField, VerificationResult};
use crate::xml::{XmlDocument, XmlElement};

/// Description attached when the response cannot be parsed at all.
pub const RESPONSE_NOT_XML: &str = "response is not well-formed XML";

/// Bucket try-order, decoded once from the response's filled-component hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketOrder {
    ForeignFirst,
    CitizenFirst,
    BlueCardFirst,
    Standard,
}

impl BucketOrder {
    /// Decode a normalized hint (lowercase, no spaces). Checks run in a fixed order.
    pub fn from_hint(hint: &str) -> Self {
        if hint.contains("yabanci") {
            Self::ForeignFirst
        } else if hint.contains("tckisi") {
            Self::CitizenFirst
        } else if hint.contains("mavikart") {
            Self::BlueCardFirst
        } else {
            Self::Standard
        }
    }

    pub fn categories(&self) -> [PersonCategory; 3] {
        use PersonCategory::*;
        match self {
            Self::ForeignFirst => [ForeignNational, Citizen, BlueCardHolder],
            Self::CitizenFirst => [Citizen, ForeignNational, BlueCardHolder],
            Self::BlueCardFirst => [BlueCardHolder, Citizen, ForeignNational],
            Self::Standard => [Citizen, BlueCardHolder, ForeignNational],
        }
    }
}

fn container_of(category: PersonCategory) -> Option<&'static str> {
    match category {
        PersonCategory::Citizen => Some("TCVatandasiKisiKutukleri"),
        PersonCategory::ForeignNational => Some("YabanciKisiKutukleri"),
        PersonCategory::BlueCardHolder => Some("MaviKartliKisiKutukleri"),
        PersonCategory::Unspecified => None,
    }
}

/// A logical field and the descendant paths tried, in order, until one yields text.
struct ExtractionRule {
    paths: &'static [&'static [&'static str]],
}

impl ExtractionRule {
    fn apply(&self, person: &XmlElement) -> String {
        self.paths
            .iter()
            .filter_map(|path| person.value_at(path))
            .find(|v| !v.is_empty())
            .unwrap_or_default()
    }
}

const STATUS_CODE: ExtractionRule = ExtractionRule {
    paths: &[&["DurumBilgisi", "Durum", "Kod"], &["Durum", "Kod"]],
};
const STATUS_TEXT: ExtractionRule = ExtractionRule {
    paths: &[&["DurumBilgisi", "Durum", "Aciklama"], &["Durum", "Aciklama"]],
};
const IDENTIFIER: ExtractionRule = ExtractionRule {
    paths: &[&["TCKimlikNo"], &["KimlikNo"]],
};
const GIVEN_NAME: ExtractionRule = ExtractionRule {
    paths: &[&["TemelBilgisi", "Ad"]],
};
const SURNAME: ExtractionRule = ExtractionRule {
    paths: &[&["TemelBilgisi", "Soyad"]],
};
const NATIONALITY: ExtractionRule = ExtractionRule {
    paths: &[&["TemelBilgisi", "Uyruk"]],
};

/// Year/month/day extraction for one dated event under `DurumBilgisi`.
struct DateRule {
    year: ExtractionRule,
    month: ExtractionRule,
    day: ExtractionRule,
}

impl DateRule {
    fn apply(&self, person: &XmlElement) -> String {
        join_date(
            &self.year.apply(person),
            &self.month.apply(person),
            &self.day.apply(person),
        )
    }
}

const BIRTH_DATE: DateRule = DateRule {
    year: ExtractionRule { paths: &[&["DurumBilgisi", "DogumTarih", "Yil"]] },
    month: ExtractionRule { paths: &[&["DurumBilgisi", "DogumTarih", "Ay"]] },
    day: ExtractionRule { paths: &[&["DurumBilgisi", "DogumTarih", "Gun"]] },
};
const DEATH_DATE: DateRule = DateRule {
    year: ExtractionRule { paths: &[&["DurumBilgisi", "OlumTarih", "Yil"]] },
    month: ExtractionRule { paths: &[&["DurumBilgisi", "OlumTarih", "Ay"]] },
    day: ExtractionRule { paths: &[&["DurumBilgisi", "OlumTarih", "Gun"]] },
};

/// `YYYY`, `YYYY-MM` or `YYYY-MM-DD` from whatever parts are present. No year, no date.
pub fn join_date(year: &str, month: &str, day: &str) -> String {
    let (year, month, day) = (year.trim(), month.trim(), day.trim());
    if year.is_empty() {
        String::new()
    } else if month.is_empty() && day.is_empty() {
        year.to_string()
    } else if day.is_empty() {
        format!("{year}-{}", pad2(month))
    } else {
        format!("{year}-{}-{}", pad2(month), pad2(day))
    }
}

fn pad2(part: &str) -> String {
    if part.len() == 1 {
        format!("0{part}")
    } else {
        part.to_string()
    }
}

/// Status codes are non-negative integers; anything else reads as 0.
fn parse_code(raw: &str) -> u32 {
    raw.parse().unwrap_or(0)
}

fn bucket_hint(doc: &XmlDocument) -> String {
    doc.elements_named("DoluBilesenler")
        .flat_map(|d| d.child_elements())
        .filter(|e| e.local_name().contains("DogrulaServisDoluBilesen"))
        .find(|e| !e.is_nil())
        .map(|e| normalize_hint(&e.text()))
        .unwrap_or_default()
}

/// Lowercase with spaces removed. Turkish dotted capital `İ` folds to a plain `i`.
fn normalize_hint(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c == '\u{130}' { 'i' } else { c })
        .flat_map(char::to_lowercase)
        .filter(|&c| c != ' ' && c != '\u{307}')
        .collect()
}

fn person_in<'a>(doc: &'a XmlDocument, container: &'a str) -> Option<&'a XmlElement> {
    doc.elements_named(container)
        .filter(|c| !c.is_nil())
        .flat_map(|c| c.child_elements().filter(|k| k.local_name() == "KisiBilgisi"))
        .next()
}

fn read_person(person: &XmlElement, category: PersonCategory) -> Option<VerificationResult> {
    let code = STATUS_CODE.apply(person);
    if code.is_empty() {
        return None;
    }
    let mut result =
        VerificationResult::from_code(parse_code(&code), STATUS_TEXT.apply(person), category);
    result.set(PersonField::Identifier, IDENTIFIER.apply(person));
    result.set(PersonField::GivenName, GIVEN_NAME.apply(person));
    result.set(PersonField::Surname, SURNAME.apply(person));
    result.set(PersonField::Nationality, NATIONALITY.apply(person));
    result.set(PersonField::BirthDate, BIRTH_DATE.apply(person));
    result.set(PersonField::DeathDate, DEATH_DATE.apply(person));
    Some(result)
}

/// Turn a service response into a result. A response with no usable bucket is a
/// normal "record not found"; only an unparsable document is a failure.
pub fn parse_response(raw: &str) -> Result<VerificationResult, QueryFailure> {
    let doc = XmlDocument::parse(raw).map_err(|e| {
        tracing::warn!(target: "kps::response", error = %e, "response is not well-formed");
        QueryFailure::new(
            KpsError::ResponseMalformed(e.to_string()),
            VerificationResult::failed(RESPONSE_NOT_XML, raw),
        )
    })?;

    let order = BucketOrder::from_hint(&bucket_hint(&doc));
    tracing::debug!(target: "kps::response", ?order, "bucket order");

    let found = order.categories().into_iter().find_map(|category| {
        let container = container_of(category)?;
        read_person(person_in(&doc, container)?, category)
    });

    Ok(match found {
        Some(mut result) => {
            result.raw = raw.to_string();
            result
        }
        None => VerificationResult::not_found(raw),
    })
}
