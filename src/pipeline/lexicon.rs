//! Word lists and lemma rules used by the rule-based normaliser.
//!
//! Closed-class words (determiners, prepositions, coordinating
//! conjunctions) are fixed sets in English, so plain lookup tags them
//! exactly. Open-class words get a role from their suffix and are reduced
//! to a lemma with a short irregular table plus suffix rules.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Grammatical role assigned to a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Determiner,
    Preposition,
    Conjunction,
    Verb,
    Noun,
    Adjective,
    Adverb,
    Numeral,
    Punctuation,
}

impl Role {
    /// Closed-class roles carry no topic signal and are removed.
    pub fn is_closed_class(self) -> bool {
        matches!(
            self,
            Role::Determiner | Role::Preposition | Role::Conjunction
        )
    }
}

static DETERMINERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "this", "that", "these", "those", "each", "every", "either",
        "neither", "another", "any", "some", "all", "both", "no", "such",
    ]
    .into_iter()
    .collect()
});

// Subordinators such as "if" and "because" are listed here too: they take
// the same preposition-like slot in tagged English text.
static PREPOSITIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "about", "above", "across", "after", "against", "along", "among", "around", "as", "at",
        "because", "before", "behind", "below", "beneath", "beside", "besides", "between",
        "beyond", "by", "despite", "down", "during", "except", "for", "from", "if", "in",
        "inside", "into", "like", "near", "of", "off", "on", "onto", "outside", "over", "per",
        "regarding", "since", "than", "through", "throughout", "toward", "towards", "under",
        "underneath", "unless", "until", "unto", "upon", "via", "whether", "while", "with",
        "within", "without", "although", "though",
    ]
    .into_iter()
    .collect()
});

static CONJUNCTIONS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["and", "but", "or", "nor", "yet", "so", "plus"].into_iter().collect());

/// General English stop words.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
        "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his",
        "himself", "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself",
        "they", "them", "their", "theirs", "themselves", "what", "which", "who", "whom", "this",
        "that", "that'll", "these", "those", "am", "is", "are", "was", "were", "be", "been",
        "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an", "the",
        "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by", "for",
        "with", "about", "against", "between", "into", "through", "during", "before", "after",
        "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
        "again", "further", "then", "once", "here", "there", "when", "where", "why", "how",
        "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
        "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can",
        "will", "just", "don", "don't", "should", "should've", "now", "d", "ll", "m", "o", "re",
        "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn", "didn't", "doesn",
        "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn", "isn't", "ma",
        "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan", "shan't",
        "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
        "wouldn't",
    ]
    .into_iter()
    .collect()
});

/// Irregular forms mapped to their lemma.
static IRREGULAR: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("am", "be"), ("is", "be"), ("are", "be"), ("was", "be"), ("were", "be"),
        ("been", "be"), ("being", "be"), ("has", "have"), ("had", "have"),
        ("having", "have"), ("does", "do"), ("did", "do"), ("done", "do"),
        ("doing", "do"), ("went", "go"), ("gone", "go"), ("goes", "go"),
        ("said", "say"), ("says", "say"), ("took", "take"), ("taken", "take"),
        ("made", "make"), ("knew", "know"), ("known", "know"), ("got", "get"),
        ("gotten", "get"), ("saw", "see"), ("seen", "see"), ("came", "come"),
        ("gave", "give"), ("given", "give"), ("thought", "think"), ("told", "tell"),
        ("found", "find"), ("became", "become"), ("left", "leave"), ("felt", "feel"),
        ("brought", "bring"), ("began", "begin"), ("begun", "begin"), ("kept", "keep"),
        ("held", "hold"), ("wrote", "write"), ("written", "write"), ("stood", "stand"),
        ("heard", "hear"), ("meant", "mean"), ("met", "meet"), ("paid", "pay"),
        ("sat", "sit"), ("spoke", "speak"), ("spoken", "speak"), ("led", "lead"),
        ("understood", "understand"), ("ran", "run"), ("sent", "send"), ("spent", "spend"),
        ("built", "build"), ("lost", "lose"), ("fell", "fall"), ("fallen", "fall"),
        ("bought", "buy"), ("taught", "teach"), ("sold", "sell"), ("shown", "show"),
        ("chose", "choose"), ("chosen", "choose"), ("drew", "draw"), ("drawn", "draw"),
        ("drove", "drive"), ("driven", "drive"), ("forgot", "forget"),
        ("forgotten", "forget"), ("caught", "catch"), ("sought", "seek"),
        ("children", "child"), ("men", "man"), ("women", "woman"), ("feet", "foot"),
        ("teeth", "tooth"), ("mice", "mouse"),
    ]
    .into_iter()
    .collect()
});

/// Nouns ending in "s" that are not plurals.
const SINGULAR_S: &[&str] = &[
    "ss", "us", "is", "ous", "news", "series", "species", "lens", "always", "perhaps",
];

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(token)
}

/// Assign a grammatical role to a lower-cased token.
pub fn tag(token: &str) -> Role {
    if DETERMINERS.contains(token) {
        return Role::Determiner;
    }
    if PREPOSITIONS.contains(token) {
        return Role::Preposition;
    }
    if CONJUNCTIONS.contains(token) {
        return Role::Conjunction;
    }
    if !token.chars().any(|c| c.is_alphanumeric()) {
        return Role::Punctuation;
    }
    if token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return Role::Numeral;
    }
    if IRREGULAR.contains_key(token) {
        return if matches!(token, "children" | "men" | "women" | "feet" | "teeth" | "mice") {
            Role::Noun
        } else {
            Role::Verb
        };
    }
    if token.len() > 4 && token.ends_with("ly") {
        return Role::Adverb;
    }
    if token.len() > 4 && (token.ends_with("ing") || token.ends_with("ed")) {
        return Role::Verb;
    }
    if token.len() > 5
        && ["ous", "ful", "ive", "able", "ible", "less", "ical"]
            .iter()
            .any(|s| token.ends_with(s))
    {
        return Role::Adjective;
    }
    Role::Noun
}

/// Canonical lemma of a token given its role.
pub fn lemmatize(token: &str, role: Role) -> String {
    if let Some(lemma) = IRREGULAR.get(token) {
        return (*lemma).to_string();
    }
    match role {
        Role::Verb => verb_lemma(token),
        Role::Noun => noun_lemma(token),
        _ => token.to_string(),
    }
}

fn verb_lemma(token: &str) -> String {
    let stem = if let Some(s) = token.strip_suffix("ied") {
        return format!("{s}y");
    } else if let Some(s) = token.strip_suffix("ing") {
        s
    } else if let Some(s) = token.strip_suffix("ed") {
        s
    } else {
        return token.to_string();
    };
    if stem.len() < 3 {
        return token.to_string();
    }
    // stopped → stop, planning → plan
    let bytes = stem.as_bytes();
    let n = bytes.len();
    if bytes[n - 1] == bytes[n - 2] && !matches!(bytes[n - 1], b'l' | b's' | b'z' | b'f') {
        return stem[..n - 1].to_string();
    }
    stem.to_string()
}

fn noun_lemma(token: &str) -> String {
    if token.len() <= 3 || !token.ends_with('s') || SINGULAR_S.iter().any(|s| token.ends_with(s))
    {
        return token.to_string();
    }
    if let Some(s) = token.strip_suffix("ies") {
        return format!("{s}y");
    }
    for suffix in ["sses", "xes", "ches", "shes", "zes"] {
        if token.ends_with(suffix) {
            return token[..token.len() - 2].to_string();
        }
    }
    token[..token.len() - 1].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_class_words_are_tagged() {
        assert_eq!(tag("the"), Role::Determiner);
        assert_eq!(tag("between"), Role::Preposition);
        assert_eq!(tag("and"), Role::Conjunction);
        assert!(tag("of").is_closed_class());
        assert!(!tag("witness").is_closed_class());
    }

    #[test]
    fn numbers_and_punctuation() {
        assert_eq!(tag("2023"), Role::Numeral);
        assert_eq!(tag("?"), Role::Punctuation);
    }

    #[test]
    fn irregular_forms() {
        assert_eq!(lemmatize("was", tag("was")), "be");
        assert_eq!(lemmatize("took", tag("took")), "take");
        assert_eq!(lemmatize("children", tag("children")), "child");
    }

    #[test]
    fn regular_verbs() {
        assert_eq!(lemmatize("stopped", Role::Verb), "stop");
        assert_eq!(lemmatize("reviewed", Role::Verb), "review");
        assert_eq!(lemmatize("testifying", Role::Verb), "testify");
        assert_eq!(lemmatize("studied", Role::Verb), "study");
        assert_eq!(lemmatize("called", Role::Verb), "call");
    }

    #[test]
    fn regular_nouns() {
        assert_eq!(lemmatize("loans", Role::Noun), "loan");
        assert_eq!(lemmatize("attorneys", Role::Noun), "attorney");
        assert_eq!(lemmatize("parties", Role::Noun), "party");
        assert_eq!(lemmatize("witnesses", Role::Noun), "witness");
        assert_eq!(lemmatize("status", Role::Noun), "status");
        assert_eq!(lemmatize("business", Role::Noun), "business");
    }

    #[test]
    fn stop_words() {
        assert!(is_stop_word("you"));
        assert!(is_stop_word("didn't"));
        assert!(!is_stop_word("deposition"));
    }
}
