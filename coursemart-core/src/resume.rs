//! Résumé parsing
//!
//! Extracts contact details and a rough skill profile from plain résumé text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::{Error, Result};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("valid regex")
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\d[\d\s\-().]{8,}\d").expect("valid regex"));

static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"')]+"#).expect("valid regex"));

static YEARS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d{1,2})(?:\.\d+)?\s*\+?\s*(?:years?|yrs?)").expect("valid regex")
});

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z.'\-]*(?:\s+[A-Za-z][A-Za-z.'\-]*){1,3}$").expect("valid regex")
});

/// Skills recognised in résumé text, with the spelling reported back
const SKILLS: &[(&str, &str)] = &[
    ("rust", "Rust"),
    ("python", "Python"),
    ("javascript", "JavaScript"),
    ("typescript", "TypeScript"),
    ("java", "Java"),
    ("golang", "Go"),
    ("c++", "C++"),
    ("c#", "C#"),
    ("react", "React"),
    ("node.js", "Node.js"),
    ("nodejs", "Node.js"),
    ("express", "Express"),
    ("mongodb", "MongoDB"),
    ("sql", "SQL"),
    ("postgresql", "PostgreSQL"),
    ("docker", "Docker"),
    ("kubernetes", "Kubernetes"),
    ("aws", "AWS"),
    ("git", "Git"),
    ("html", "HTML"),
    ("css", "CSS"),
    ("machine learning", "Machine Learning"),
];

/// Words that show a line is a heading rather than a name
const HEADING_WORDS: &[&str] = &[
    "resume",
    "curriculum",
    "vitae",
    "profile",
    "summary",
    "experience",
    "education",
    "skills",
    "contact",
];

/// Details extracted from a résumé
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub links: Vec<String>,
    pub skills: Vec<String>,
    pub years_of_experience: Option<u32>,
}

/// Parse plain résumé text
pub fn parse_resume(text: &str) -> Result<ResumeProfile> {
    if text.trim().is_empty() {
        return Err(Error::Validation("Résumé text is empty".to_string()));
    }

    let email = EMAIL_RE.find(text).map(|m| m.as_str().to_lowercase());

    let phone = PHONE_RE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .find(|candidate| {
            let digits = candidate.chars().filter(char::is_ascii_digit).count();
            (10..=15).contains(&digits)
        });

    let mut links: Vec<String> = Vec::new();
    for m in LINK_RE.find_iter(text) {
        let link = m.as_str().trim_end_matches(['.', ',', ';']).to_string();
        if !links.contains(&link) {
            links.push(link);
        }
    }

    let years_of_experience = YEARS_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .max();

    Ok(ResumeProfile {
        name: find_name(text),
        email,
        phone,
        links,
        skills: find_skills(text),
        years_of_experience,
    })
}

fn find_name(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(5)
        .find(|line| {
            let lower = line.to_lowercase();
            NAME_RE.is_match(line) && !HEADING_WORDS.iter().any(|w| lower.contains(w))
        })
        .map(str::to_string)
}

fn find_skills(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut found: Vec<String> = Vec::new();
    for (needle, label) in SKILLS {
        if contains_word(&lower, needle) && !found.iter().any(|s| s == label) {
            found.push(label.to_string());
        }
    }
    found
}

/// Substring match that refuses to match inside a longer word, so `java`
/// does not fire on `javascript`
fn contains_word(haystack: &str, needle: &str) -> bool {
    let is_word = |c: char| c.is_ascii_alphanumeric();
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}
