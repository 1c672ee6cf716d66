// src/patterns/normalizer.rs — Failure text → canonical fingerprint
//
// Every step is a total regex substitution: malformed input never fails,
// it just yields fewer keywords.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Extensions that mark a bare `name.ext` token as a file name.
const SOURCE_EXTENSIONS: &str =
    "rs|ts|tsx|js|jsx|mjs|cjs|py|go|java|kt|rb|php|c|cc|cpp|h|hpp|cs|swift|vue|svelte|json|toml|ya?ml|css|scss|html";

#[allow(clippy::expect_used)]
static RE_FILE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:[A-Za-z]:)?(?:\.{{1,2}}/|/)?(?:[\w.@-]+/)+[\w.@-]+\.[A-Za-z0-9]+|\b[\w.-]+\.(?:{SOURCE_EXTENSIONS})\b"
    ))
    .expect("valid regex")
});
/// Directory-qualified paths capture the file name; bare file names match the second branch.
#[allow(clippy::expect_used)]
static RE_PATH_FOLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:[A-Za-z]:)?(?:[\w.@-]*/)+([\w.@-]+\.[A-Za-z0-9]+)|\b[\w.-]+\.(?:{SOURCE_EXTENSIONS})\b"
    ))
    .expect("valid regex")
});
#[allow(clippy::expect_used)]
static RE_LINE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bline\s+\d+").expect("valid regex"));
#[allow(clippy::expect_used)]
static RE_LINE_COL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\d+:\d+").expect("valid regex"));
#[allow(clippy::expect_used)]
static RE_PAREN_POS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\d+,\s*\d+\)").expect("valid regex"));
#[allow(clippy::expect_used)]
static RE_SQUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'[^'\n]*'").expect("valid regex"));
#[allow(clippy::expect_used)]
static RE_DQUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"\n]*""#).expect("valid regex"));
#[allow(clippy::expect_used)]
static RE_BTICK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`\n]*`").expect("valid regex"));
#[allow(clippy::expect_used)]
static RE_HEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b0[xX][0-9a-fA-F]+\b").expect("valid regex"));
#[allow(clippy::expect_used)]
static RE_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\b").expect("valid regex"));
#[allow(clippy::expect_used)]
static RE_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Placeholders inserted by normalization. Tokens carrying one are not keywords.
const PLACEHOLDERS: &[&str] = &["<file>", "<n>", "<var>", "<addr>"];

/// Domain terms a token must contain to count as a keyword.
const VOCABULARY: &[&str] = &[
    // type system
    "type", "assignable", "property", "argument", "mismatched",
    // imports
    "import", "module", "export", "resolve", "cannot", "find",
    // syntax
    "syntax", "expected", "token", "parse",
    // build
    "build", "compil", "link",
    // runtime
    "undefined", "null", "exception", "panic", "runtime", "reference",
    // tests
    "test", "assert", "fail",
    // lint
    "lint", "warning", "unused", "deprecated",
];

/// Error category assigned from the keyword set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    TypeMismatch,
    ImportResolution,
    Syntax,
    TestFailure,
    Lint,
    Build,
    Runtime,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeMismatch => "type-mismatch",
            Self::ImportResolution => "import-resolution",
            Self::Syntax => "syntax",
            Self::TestFailure => "test-failure",
            Self::Lint => "lint",
            Self::Build => "build",
            Self::Runtime => "runtime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        CATEGORY_RULES
            .iter()
            .map(|(c, _)| *c)
            .find(|c| c.as_str() == s)
    }

    /// Helper type suggested for a fresh pattern of this category.
    pub fn suggested_agent(&self) -> &'static str {
        match self {
            Self::TypeMismatch | Self::Syntax => "language-specialist",
            Self::ImportResolution | Self::Runtime => "recurring-failure-detector",
            Self::TestFailure | Self::Build => "regression-fixer",
            Self::Lint => "quality-guard",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label used in reports for patterns with no category.
pub const UNCATEGORIZED: &str = "uncategorized";

/// View over a keyword set used by the category rules.
struct KeywordView<'a>(&'a [String]);

impl KeywordView<'_> {
    /// Exact keyword present.
    fn has(&self, word: &str) -> bool {
        self.0.iter().any(|k| k == word)
    }

    /// Some keyword contains `term`.
    fn contains(&self, term: &str) -> bool {
        self.0.iter().any(|k| k.contains(term))
    }

    fn contains_any(&self, terms: &[&str]) -> bool {
        terms.iter().any(|t| self.contains(t))
    }
}

type CategoryRule = fn(&KeywordView<'_>) -> bool;

/// Evaluated in order; the first matching rule wins.
const CATEGORY_RULES: &[(ErrorCategory, CategoryRule)] = &[
    (ErrorCategory::TypeMismatch, |k| {
        (k.has("type") || k.has("types"))
            && k.contains_any(&["assignable", "property", "argument", "mismatched"])
    }),
    (ErrorCategory::ImportResolution, |k| {
        k.contains_any(&["import", "module", "resolve"]) || (k.has("cannot") && k.has("find"))
    }),
    (ErrorCategory::Syntax, |k| {
        k.contains_any(&["syntax", "parse", "token"]) || k.has("expected") || k.has("unexpected")
    }),
    (ErrorCategory::TestFailure, |k| k.contains_any(&["test", "assert"])),
    (ErrorCategory::Lint, |k| {
        k.contains_any(&["lint", "unused", "deprecated", "warning"])
    }),
    (ErrorCategory::Build, |k| k.contains_any(&["build", "compil", "link"])),
    (ErrorCategory::Runtime, |k| {
        k.contains_any(&["undefined", "null", "exception", "panic", "runtime", "reference"])
    }),
];

/// Result of normalizing one raw failure message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub original: String,
    pub normalized: String,
    /// Sorted, de-duplicated keyword set.
    pub keywords: Vec<String>,
    /// Fingerprint of the keyword set; also the pattern id.
    pub hash: String,
    pub category: Option<ErrorCategory>,
    pub file_path: Option<String>,
}

impl NormalizedError {
    pub fn category_label(&self) -> &'static str {
        self.category.map(|c| c.as_str()).unwrap_or(UNCATEGORIZED)
    }
}

/// Normalize a raw failure message into its canonical form.
pub fn normalize_error(raw: &str) -> NormalizedError {
    let file_path = RE_FILE_PATH.find(raw).map(|m| m.as_str().to_string());
    let normalized = canonicalize(raw);
    let keywords = extract_keywords(&normalized);
    let hash = keyword_hash(&keywords);
    let category = categorize(&keywords);

    NormalizedError {
        original: raw.to_string(),
        normalized,
        keywords,
        hash,
        category,
        file_path,
    }
}

/// Strip variable content (paths, positions, literals, addresses, numbers).
pub fn canonicalize(raw: &str) -> String {
    let text = RE_PATH_FOLD.replace_all(raw, |caps: &Captures<'_>| match caps.get(1) {
        Some(name) => format!("<FILE>/{}", name.as_str()),
        None => "<FILE>".to_string(),
    });
    let text = RE_LINE_WORD.replace_all(&text, "line <N>");
    let text = RE_LINE_COL.replace_all(&text, ":<N>:<N>");
    let text = RE_PAREN_POS.replace_all(&text, "(<N>,<N>)");
    let text = RE_SQUOTE.replace_all(&text, "<VAR>");
    let text = RE_DQUOTE.replace_all(&text, "<VAR>");
    let text = RE_BTICK.replace_all(&text, "<VAR>");
    let text = RE_HEX.replace_all(&text, "<ADDR>");
    let text = RE_INT.replace_all(&text, "<N>");
    RE_WS.replace_all(&text, " ").trim().to_string()
}

/// Keywords of a canonical text, sorted and de-duplicated.
pub fn extract_keywords(normalized: &str) -> Vec<String> {
    let lower = normalized.to_lowercase();
    let set: BTreeSet<String> = lower
        .split_whitespace()
        .filter(|token| !PLACEHOLDERS.iter().any(|p| token.contains(p)))
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| VOCABULARY.iter().any(|term| token.contains(term)))
        .map(str::to_string)
        .collect();
    set.into_iter().collect()
}

/// 16-hex-char SHA-256 prefix of the pipe-joined sorted keywords.
pub fn keyword_hash(keywords: &[String]) -> String {
    let digest = Sha256::digest(keywords.join("|").as_bytes());
    hex::encode(digest)[..16].to_string()
}

pub fn categorize(keywords: &[String]) -> Option<ErrorCategory> {
    let view = KeywordView(keywords);
    CATEGORY_RULES
        .iter()
        .find(|(_, rule)| rule(&view))
        .map(|(category, _)| *category)
}

/// Jaccard similarity of two keyword sets. Two empty sets score 0.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}
