use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

lazy_static! {
    /// Two letters (region), two digits (district), two letters (series),
    /// four digits (unique number).
    static ref GRAMMAR: Regex =
        Regex::new(r"^[A-Z]{2}[0-9]{2}[A-Z]{2}[0-9]{4}$").expect("plate grammar regex");
    static ref TOKEN: Regex = Regex::new(r"[A-Z]{1,2}|[0-9]{1,4}").expect("plate token regex");
}

/// A plate that satisfies the regional grammar. Only `normalize` and
/// `TryFrom<String>` produce one, so holding a value means the text is valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalPlate(String);

impl CanonicalPlate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalPlate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalPlate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CanonicalPlate> for String {
    fn from(plate: CanonicalPlate) -> String {
        plate.0
    }
}

impl TryFrom<String> for CanonicalPlate {
    type Error = String;

    /// Strict: the text must already be canonical.
    fn try_from(s: String) -> Result<Self, Self::Error> {
        if GRAMMAR.is_match(&s) {
            Ok(CanonicalPlate(s))
        } else {
            Err(format!("'{}' is not a canonical plate", s))
        }
    }
}

/// Turns raw OCR output into a canonical plate, or `None` if it cannot be
/// made to fit the grammar. Fields longer than their width are truncated.
pub fn normalize(raw: &str) -> Option<CanonicalPlate> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect();

    if GRAMMAR.is_match(&cleaned) {
        return Some(CanonicalPlate(cleaned));
    }

    let tokens: Vec<&str> = TOKEN.find_iter(&cleaned).map(|m| m.as_str()).collect();
    if tokens.len() < 4 {
        return None;
    }

    let region = take(tokens[0], 2, |c| c.is_ascii_alphabetic());
    let district = take(tokens[1], 2, |c| c.is_ascii_digit());
    let series = take(tokens[2], 2, |c| c.is_ascii_alphabetic());
    let unique = take(&tokens[3..].concat(), 4, |c| c.is_ascii_digit());

    if region.len() == 2 && district.len() == 2 && series.len() == 2 && unique.len() == 4 {
        Some(CanonicalPlate(format!(
            "{}{}{}{}",
            region, district, series, unique
        )))
    } else {
        None
    }
}

fn take(token: &str, width: usize, keep: impl Fn(&char) -> bool) -> String {
    token.chars().filter(keep).take(width).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> Option<String> {
        normalize(raw).map(String::from)
    }

    #[test]
    fn spaced_plate_takes_fast_path() {
        assert_eq!(norm("MH 12 AB 1234").as_deref(), Some("MH12AB1234"));
    }

    #[test]
    fn punctuation_and_case_are_cleaned() {
        assert_eq!(norm("mh-12-ab-1234!!").as_deref(), Some("MH12AB1234"));
        assert_eq!(norm(" dl.05.xy.9999 ").as_deref(), Some("DL05XY9999"));
    }

    #[test]
    fn short_input_is_rejected() {
        assert_eq!(norm("AB99"), None);
        assert_eq!(norm(""), None);
        assert_eq!(norm("  --  "), None);
    }

    #[test]
    fn excess_unique_digits_are_truncated() {
        assert_eq!(norm("MH12AB12345").as_deref(), Some("MH12AB1234"));
    }

    #[test]
    fn unique_number_is_gathered_across_tokens() {
        // Tokens: MH 12 AB 12 X 34
        assert_eq!(norm("MH12AB12X34").as_deref(), Some("MH12AB1234"));
    }

    #[test]
    fn long_letter_run_is_split_into_tokens() {
        // Tokens: MH 12 AB C 1234 -> series AB, unique from "C1234"
        assert_eq!(norm("MH12ABC1234").as_deref(), Some("MH12AB1234"));
    }

    #[test]
    fn wrong_field_kinds_are_rejected() {
        assert_eq!(norm("M12AB1234"), None);
        assert_eq!(norm("MH1AB1234"), None);
        assert_eq!(norm("MH12AB123"), None);
        assert_eq!(norm("1234MH12AB"), None);
    }

    #[test]
    fn non_ascii_letters_never_leak_into_output() {
        assert_eq!(norm("MH12ÉAB1234").as_deref(), Some("MH12AB1234"));
        assert_eq!(norm("ÉÉ12AB1234"), None);
    }

    #[test]
    fn results_always_fit_grammar() {
        let inputs = [
            "MH 12 AB 1234",
            "ka 01 mm 0001 xx",
            "TN09BC99999999",
            "a1b2c3d4",
            "GJ-5-CD-77",
            "UP16 BT 3456 / 7",
            "ZZ99ZZ9999",
        ];
        for raw in inputs.iter() {
            if let Some(plate) = normalize(raw) {
                assert_eq!(plate.as_str().len(), 10, "{}", raw);
                assert!(GRAMMAR.is_match(plate.as_str()), "{}", raw);
            }
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["mh-12-ab-1234!!", "TN09BC99999999", "MH12AB12X34"].iter() {
            let once = normalize(raw).expect("normalizes");
            assert_eq!(normalize(once.as_str()), Some(once.clone()));
        }
    }

    #[test]
    fn strict_conversion_rejects_noisy_text() {
        assert!(CanonicalPlate::try_from("MH12AB1234".to_string()).is_ok());
        assert!(CanonicalPlate::try_from("MH 12 AB 1234".to_string()).is_err());
        assert!(CanonicalPlate::try_from("mh12ab1234".to_string()).is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let plate = normalize("KA01MM0001").expect("normalizes");
        assert_eq!(serde_json::to_string(&plate).unwrap(), "\"KA01MM0001\"");
        let back: CanonicalPlate = serde_json::from_str("\"KA01MM0001\"").unwrap();
        assert_eq!(back, plate);
        assert!(serde_json::from_str::<CanonicalPlate>("\"nope\"").is_err());
    }
}
