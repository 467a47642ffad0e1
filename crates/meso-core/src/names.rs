//! Place-name canonicalisation.
//!
//! Site databases and cave inventories spell the same place differently
//! ("Grotta dell'Orso", "GROTTA DELL ORSO", "Cova de l'Or (Beniarrés)").
//! `canonical_name` reduces a raw name to a whitespace-free, accent-free key
//! used only for joining. Steps run in a fixed order:
//!
//! 1. transliterate to ASCII (drops diacritics)
//! 2. remove `(` and `)`
//! 3. remove stopword tokens (case-insensitive; a token is a maximal run of
//!    letters, so digits and punctuation separate tokens)
//! 4. remove periods and apostrophes
//! 5. remove digits, then drop any stopword the removals uncovered
//! 6. title-case
//! 7. remove whitespace
//!
//! Any input yields some output, the empty string included; two unrelated
//! names may collapse to the same key. Keys of names differing only in case
//! can still differ in interior capitals ("DeLuca" vs "Deluca"), so keys are
//! compared through `join_key`.
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{Error, Result};

/// Articles, prepositions and generic cave nouns in Italian, Spanish, French
/// and Catalan. Single letters cover elided articles (`l'`, `d'`) and
/// abbreviations once punctuation is gone.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    // Italian
    "grotta", "grotte", "grottino", "grotticella", "riparo", "ripari", "caverna", "caverne",
    "tana", "buca", "buco", "arma", "antro", "pertuso", "il", "lo", "gli", "di", "del", "dello",
    "della", "dei", "degli", "delle", "dell", "da", "dal", "dalla", "in", "sul", "sulla",
    // Spanish
    "cueva", "cuevas", "abrigo", "abrigos", "covacho", "covacha", "sima", "los", "las", "de",
    "la", "el",
    // French
    "abri", "abris", "baume", "aven", "sous", "roche", "le", "les", "du", "des",
    // Catalan
    "cova", "coves", "balma", "balmes", "avenc", "els", "dels", "sa", "es", "en",
    // single letters
    "a", "d", "e", "i", "l", "o", "s", "y",
];

/// Stopword set, matched against letter runs. Build once and pass it to every
/// `canonical_name` call.
#[derive(Debug, Clone)]
pub struct Stopwords {
    words: Vec<String>,
    lookup: HashSet<String>,
}

static LETTER_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}+").expect("letter-run pattern compiles"));

static DEFAULT: Lazy<Stopwords> =
    Lazy::new(|| Stopwords::from_words(DEFAULT_STOPWORDS.iter().map(|w| w.to_string()).collect()));

impl Stopwords {
    /// The built-in list extended with `extra` (duplicates ignored).
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Result<Self> {
        if extra.is_empty() {
            return Ok(DEFAULT.clone());
        }
        let mut words = DEFAULT.words.clone();
        for w in extra {
            let w = w.as_ref().trim().to_lowercase();
            if !w.is_empty() && !w.chars().all(char::is_alphabetic) {
                return Err(Error::Config(format!("stopword {w:?} must be letters only")));
            }
            words.push(w);
        }
        Ok(Self::from_words(words))
    }

    pub fn from_words(mut words: Vec<String>) -> Self {
        for w in &mut words {
            *w = w.to_lowercase();
        }
        words.retain(|w| !w.is_empty());
        words.sort();
        words.dedup();
        let lookup = words.iter().cloned().collect();
        Self { words, lookup }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn contains(&self, token: &str) -> bool {
        self.lookup.contains(&token.to_lowercase())
    }

    /// Blank out every letter run that is a stopword.
    fn strip(&self, s: &str) -> String {
        if self.lookup.is_empty() {
            return s.to_string();
        }
        LETTER_RUN
            .replace_all(s, |c: &Captures| {
                if self.contains(&c[0]) {
                    " ".to_string()
                } else {
                    c[0].to_string()
                }
            })
            .into_owned()
    }
}

impl Default for Stopwords {
    fn default() -> Self {
        DEFAULT.clone()
    }
}

/// Reduce a raw place name to its canonical join key.
pub fn canonical_name(raw: &str, stopwords: &Stopwords) -> String {
    let ascii = deunicode::deunicode(raw);
    let no_parens: String = ascii.chars().filter(|c| *c != '(' && *c != ')').collect();
    let no_stopwords = stopwords.strip(&no_parens);
    let no_punct: String = no_stopwords.chars().filter(|c| *c != '.' && *c != '\'').collect();
    let no_digits: String = no_punct.chars().filter(|c| !c.is_ascii_digit()).collect();
    // "si1ma" only becomes the stopword "sima" once the digit is gone.
    let no_digits = stopwords.strip(&no_digits);
    let titled = title_case(&no_digits);
    titled.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Comparison form of a canonical key. Deduplication and the site/cave
/// join match keys through it, so "DeLuca" and "Deluca" are one place.
pub fn join_key(canonical: &str) -> String {
    canonical.to_lowercase()
}

/// Capitalise the letter that starts each word (string start or after a
/// non-letter). A word with no lower-case letters is lower-cased first so
/// that shouted names match; mixed-case words keep their interior capitals,
/// which keeps already-canonical keys stable.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, word) in s.split(char::is_whitespace).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let letters = word.chars().filter(|c| c.is_alphabetic()).count();
        let shouted = letters >= 2 && !word.chars().any(|c| c.is_lowercase());
        let mut prev_letter = false;
        for c in word.chars() {
            let c = if shouted { c.to_ascii_lowercase() } else { c };
            if c.is_alphabetic() && !prev_letter {
                out.extend(c.to_uppercase());
            } else {
                out.push(c);
            }
            prev_letter = c.is_alphabetic();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> String {
        canonical_name(s, &Stopwords::default())
    }

    #[test]
    fn apostrophe_and_shouting_collapse_to_same_key() {
        assert_eq!(key("Grotta dell'Orso"), "Orso");
        assert_eq!(key("GROTTA DELL ORSO"), "Orso");
    }

    #[test]
    fn accents_are_transliterated() {
        assert_eq!(key("Cueva de Los Azules"), "Azules");
        assert_eq!(key("Cova de l'Or (Beniarrés)"), "OrBeniarres");
        assert_eq!(key("Abri du Poeymaü"), "Poeymau");
        assert_eq!(key("Cueva de la Peña de Candamo"), "PenaCandamo");
    }

    #[test]
    fn digits_and_periods_are_removed() {
        assert_eq!(key("Arma dello Stefanin 2"), "Stefanin");
        assert_eq!(key("S. Juan de Ortega"), "JuanOrtega");
        assert_eq!(key("Riparo Mochi n. 3"), "MochiN");
    }

    #[test]
    fn normalising_is_idempotent() {
        for raw in [
            "Grotta dell'Orso",
            "Cova de l'Or (Beniarrés)",
            "Arene Candide",
            "Sant-Joan de les Abadesses",
            "Cueva 14",
            "MontNegre",
            "Cueva 2a",
            "Grotta Dell1",
            "Abrigo 1d de Sant Gregori",
            "si1ma",
            "",
        ] {
            let once = key(raw);
            assert_eq!(key(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn stopword_only_names_become_empty() {
        assert_eq!(key("La Cueva"), "");
        assert_eq!(key("   "), "");
    }

    #[test]
    fn stopwords_respect_word_boundaries() {
        // "del" inside "Delfino" and "arma" inside "Armanelli" stay.
        assert_eq!(key("Grotta Delfino"), "Delfino");
        assert_eq!(key("Arma Armanelli"), "Armanelli");
    }

    #[test]
    fn digits_separate_stopword_tokens() {
        assert_eq!(key("Cueva 2a"), "");
        assert_eq!(key("Grotta Dell1 Orso"), "Orso");
        assert_eq!(key("Abrigo 1d de Sant Gregori"), "SantGregori");
        assert_eq!(key("si1ma"), "");
    }

    #[test]
    fn case_variants_share_a_join_key() {
        let mixed = key("Grotta DeLuca");
        let shouted = key("GROTTA DELUCA");
        assert_eq!(mixed, "DeLuca");
        assert_eq!(shouted, "Deluca");
        assert_eq!(join_key(&mixed), join_key(&shouted));
        assert_eq!(join_key(&key("Cova de l'Or (Beniarrés)")), join_key(&key("COVA DE L'OR (BENIARRES)")));
    }

    #[test]
    fn extra_stopwords_extend_the_defaults() {
        let sw = Stopwords::with_extra(&["Pozzo"]).unwrap();
        assert_eq!(canonical_name("Pozzo del Merro", &sw), "Merro");
        assert!(sw.words().iter().any(|w| w == "cueva"));
        assert!(sw.contains("POZZO"));
        assert!(matches!(Stopwords::with_extra(&["l'"]), Err(Error::Config(_))));
    }
}

