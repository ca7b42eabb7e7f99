use anyhow::{Context, Result};
use regex::Regex;

use crate::model::{ClassifiedLine, LineRole, LineType};

#[derive(Debug)]
pub struct LineClassifier {
    entry: Regex,
    see_synonym: Regex,
    genus_synonym: Regex,
    page_number: Regex,
}

impl LineClassifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            entry: Regex::new(r"(?i)(?P<value>[a-z\x{00C0}-\x{024F}]+)[,.]?\s*(?P<rest>.*)")
                .context("failed to compile index entry regex")?,
            see_synonym: Regex::new(r"(?i)\(see (?P<synonym>[a-z\x{00C0}-\x{024F}]*)\)")
                .context("failed to compile synonym reference regex")?,
            genus_synonym: Regex::new(r"\((?P<value>[A-Z][a-z\x{00C0}-\x{024F}]+)\)")
                .context("failed to compile genus synonym regex")?,
            page_number: Regex::new(r"[0-9]+").context("failed to compile page number regex")?,
        })
    }

    pub fn classify(&self, text: &str, role: LineRole) -> ClassifiedLine {
        let mut line = ClassifiedLine {
            line_type: role.into(),
            value: None,
            synonym_reference: None,
            cited_pages: Vec::new(),
            raw_text: text.to_string(),
            needs_verification: false,
        };

        let mut chars = text.chars();
        let Some(first) = chars.next() else {
            line.line_type = LineType::Error;
            return line;
        };
        let second = chars.next();

        let mut candidate = text.to_string();
        let case_matches = match role {
            LineRole::Genus => first.is_uppercase(),
            LineRole::Species if first.is_lowercase() => true,
            LineRole::Species if first.is_uppercase() && second.is_some() => {
                // OCR sometimes capitalizes the leading letter of an epithet.
                candidate = lowercase_first(text);
                line.needs_verification = true;
                true
            }
            LineRole::Species => false,
        };

        let entry = if case_matches {
            self.entry.captures(&candidate)
        } else {
            None
        };
        if let Some(captures) = entry {
            line.line_type = role.into();
            line.value = Some(captures["value"].to_string());

            let rest = captures.name("rest").map_or("", |found| found.as_str());
            if !rest.is_empty() {
                line.synonym_reference = self
                    .see_synonym
                    .captures(rest)
                    .map(|found| found["synonym"].to_string());
                line.cited_pages = self.cited_pages(rest);
            }
            return line;
        }

        if role == LineRole::Species && first.is_uppercase() {
            line.line_type = LineType::Error;
        } else if first.is_ascii_digit() {
            line.line_type = LineType::Continuation;
            line.cited_pages = self.cited_pages(text);
        } else if let Some(synonym) = self.parenthesized_genus(text, first, second) {
            line.line_type = LineType::GenusSynonym;
            line.value = Some(synonym);
        } else {
            line.line_type = LineType::Error;
        }

        line
    }

    fn parenthesized_genus(&self, text: &str, first: char, second: Option<char>) -> Option<String> {
        if first != '(' || !second.is_some_and(char::is_uppercase) {
            return None;
        }
        self.genus_synonym
            .captures(text)
            .map(|captures| captures["value"].to_string())
    }

    // Pages keep OCR order and duplicates; a run too long for u32 saturates
    // rather than being dropped.
    pub fn cited_pages(&self, text: &str) -> Vec<u32> {
        self.page_number
            .find_iter(text)
            .map(|found| found.as_str().parse::<u32>().unwrap_or(u32::MAX))
            .collect()
    }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> LineClassifier {
        LineClassifier::new().unwrap()
    }

    #[test]
    fn genus_line_extracts_name_and_pages() {
        let line = classifier().classify("Aaptos,  . . 171", LineRole::Genus);

        assert_eq!(line.line_type, LineType::Genus);
        assert_eq!(line.value.as_deref(), Some("Aaptos"));
        assert_eq!(line.cited_pages, vec![171]);
        assert!(!line.needs_verification);
    }

    #[test]
    fn species_line_extracts_name_and_pages() {
        let line = classifier().classify("aaptos, . . . 171", LineRole::Species);

        assert_eq!(line.line_type, LineType::Species);
        assert_eq!(line.value.as_deref(), Some("aaptos"));
        assert_eq!(line.cited_pages, vec![171]);
    }

    #[test]
    fn see_reference_becomes_synonym() {
        let line = classifier().classify("Halichondria (see Reniera), 12, 40", LineRole::Genus);

        assert_eq!(line.line_type, LineType::Genus);
        assert_eq!(line.value.as_deref(), Some("Halichondria"));
        assert_eq!(line.synonym_reference.as_deref(), Some("Reniera"));
        assert_eq!(line.cited_pages, vec![12, 40]);
    }

    #[test]
    fn capitalized_species_is_lowercased_and_flagged() {
        let line = classifier().classify("Abyssorchomene", LineRole::Species);

        assert_eq!(line.line_type, LineType::Species);
        assert_eq!(line.value.as_deref(), Some("abyssorchomene"));
        assert_eq!(line.raw_text, "Abyssorchomene");
        assert!(line.needs_verification);
    }

    #[test]
    fn single_capital_letter_in_species_column_is_an_error() {
        let line = classifier().classify("A", LineRole::Species);

        assert_eq!(line.line_type, LineType::Error);
        assert!(!line.needs_verification);
    }

    #[test]
    fn continuation_keeps_every_page_in_order() {
        let line = classifier().classify("172, 204, 172, 9", LineRole::Species);

        assert_eq!(line.line_type, LineType::Continuation);
        assert_eq!(line.cited_pages, vec![172, 204, 172, 9]);
        assert_eq!(line.value, None);
    }

    #[test]
    fn continuation_in_genus_column() {
        let line = classifier().classify("42 ; 43", LineRole::Genus);

        assert_eq!(line.line_type, LineType::Continuation);
        assert_eq!(line.cited_pages, vec![42, 43]);
    }

    #[test]
    fn parenthesized_genus_is_a_synonym() {
        let line = classifier().classify("(Reniera)", LineRole::Genus);

        assert_eq!(line.line_type, LineType::GenusSynonym);
        assert_eq!(line.value.as_deref(), Some("Reniera"));
    }

    #[test]
    fn parenthesized_genus_in_species_column_is_a_synonym() {
        let line = classifier().classify("(Reniera) 33", LineRole::Species);

        assert_eq!(line.line_type, LineType::GenusSynonym);
        assert_eq!(line.value.as_deref(), Some("Reniera"));
    }

    #[test]
    fn unmatched_lines_are_errors() {
        let classifier = classifier();

        assert_eq!(classifier.classify("", LineRole::Genus).line_type, LineType::Error);
        assert_eq!(classifier.classify("- . .", LineRole::Genus).line_type, LineType::Error);
        assert_eq!(classifier.classify("(r", LineRole::Genus).line_type, LineType::Error);
        assert_eq!(classifier.classify("(", LineRole::Genus).line_type, LineType::Error);
        assert_eq!(classifier.classify("aaptos", LineRole::Genus).line_type, LineType::Error);
    }

    #[test]
    fn extended_latin_letters_are_part_of_names() {
        let line = classifier().classify("Müllerina, 88", LineRole::Genus);
        assert_eq!(line.value.as_deref(), Some("Müllerina"));
    }

    #[test]
    fn reclassifying_raw_text_is_idempotent() {
        let classifier = classifier();
        for (text, role) in [
            ("Abyssorchomene, 12", LineRole::Species),
            ("Aega, . . 42", LineRole::Genus),
            ("172, 204", LineRole::Species),
            ("(Reniera)", LineRole::Genus),
            ("~~", LineRole::Species),
        ] {
            let first = classifier.classify(text, role);
            let second = classifier.classify(&first.raw_text, role);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn oversized_page_numbers_saturate() {
        let pages = classifier().cited_pages("12 99999999999 13");
        assert_eq!(pages, vec![12, u32::MAX, 13]);
    }
}
