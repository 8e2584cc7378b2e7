use std::collections::BTreeMap;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

pub const DATE_FIELD: &str = "date";
pub const AGREEMENT_FIELD: &str = "agreement";
pub const EMAIL_FIELD: &str = "email";
pub const COMPANY_FIELD: &str = "company";

/// Field values decoded from the signing form.
///
/// The pipeline reads `email`, `company` and `date` directly; every other key is a
/// free-form template placeholder and unknown placeholders render empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Submission {
    fields: BTreeMap<String, String>,
}

impl Submission {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn email(&self) -> Option<&str> {
        self.get(EMAIL_FIELD)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn company(&self) -> &str {
        self.get(COMPANY_FIELD).unwrap_or_default()
    }

    pub fn date(&self) -> &str {
        self.get(DATE_FIELD).unwrap_or_default()
    }

    /// Record the signing date in `Month Day(ordinal), Year` form.
    pub fn stamp_date(&mut self, date: NaiveDate) {
        self.insert(DATE_FIELD, format_agreement_date(date));
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

impl From<BTreeMap<String, String>> for Submission {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self::new(fields)
    }
}

impl<K, V> FromIterator<(K, V)> for Submission
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Formats a date as `January 1st, 2024`.
pub fn format_agreement_date(date: NaiveDate) -> String {
    let day = date.day();
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{} {}{}, {}", date.format("%B"), day, suffix, date.year())
}

/// Source of the signing date.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Input control rendered on the signing form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type", default = "FormField::default_kind")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl FormField {
    fn default_kind() -> String {
        "text".to_string()
    }
}

/// Field layout of the signing form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSchema {
    pub fields: Vec<FormField>,
}

impl FormSchema {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Check that every required field carries a non-blank value.
    ///
    /// Keys outside the schema are left alone.
    pub fn validate(&self, submission: &Submission) -> Result<(), SubmissionError> {
        let missing: Vec<String> = self
            .fields
            .iter()
            .filter(|field| field.required)
            .filter(|field| {
                submission
                    .get(&field.name)
                    .map_or(true, |value| value.trim().is_empty())
            })
            .map(|field| field.name.clone())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SubmissionError::MissingFields(missing))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn formats_ordinal_suffixes() {
        assert_eq!(format_agreement_date(date(2024, 1, 1)), "January 1st, 2024");
        assert_eq!(format_agreement_date(date(2024, 2, 2)), "February 2nd, 2024");
        assert_eq!(format_agreement_date(date(2024, 3, 3)), "March 3rd, 2024");
        assert_eq!(format_agreement_date(date(2024, 4, 4)), "April 4th, 2024");
        assert_eq!(format_agreement_date(date(2024, 5, 11)), "May 11th, 2024");
        assert_eq!(format_agreement_date(date(2024, 6, 12)), "June 12th, 2024");
        assert_eq!(format_agreement_date(date(2024, 7, 13)), "July 13th, 2024");
        assert_eq!(format_agreement_date(date(2024, 8, 21)), "August 21st, 2024");
        assert_eq!(format_agreement_date(date(2024, 9, 22)), "September 22nd, 2024");
        assert_eq!(format_agreement_date(date(2024, 10, 23)), "October 23rd, 2024");
        assert_eq!(format_agreement_date(date(2024, 12, 31)), "December 31st, 2024");
    }

    #[test]
    fn stamp_date_overwrites_client_value() {
        let mut submission: Submission = [("date", "yesterday")].into_iter().collect();
        submission.stamp_date(date(2024, 1, 1));
        assert_eq!(submission.date(), "January 1st, 2024");
    }

    #[test]
    fn blank_email_is_treated_as_missing() {
        let submission: Submission = [("email", "   ")].into_iter().collect();
        assert!(submission.email().is_none());
    }

    #[test]
    fn schema_reports_blank_required_fields() {
        let schema = FormSchema::from_json(
            r#"{"fields": [
                {"name": "name", "label": "Name", "required": true},
                {"name": "email", "label": "Email", "type": "email", "required": true},
                {"name": "notes", "label": "Notes"}
            ]}"#,
        )
        .expect("schema parses");
        assert_eq!(schema.fields[0].kind, "text");

        let submission: Submission = [("name", " "), ("extra", "kept")].into_iter().collect();
        match schema.validate(&submission) {
            Err(SubmissionError::MissingFields(fields)) => {
                assert_eq!(fields, vec!["name".to_string(), "email".to_string()]);
            }
            other => panic!("expected missing fields, got {other:?}"),
        }

        let complete: Submission = [("name", "Jane"), ("email", "jane@acme.test")]
            .into_iter()
            .collect();
        schema.validate(&complete).expect("required fields present");
    }
}
