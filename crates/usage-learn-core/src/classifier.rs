//! Rule-based text/code classifier.
//!
//! Categories are decided by ordered, first-match precedence rather than by
//! the highest-scoring rule:
//!
//! 1. [`Category::CodeSnippet`]: declarations, imports, variable bindings,
//!    control flow, fenced blocks, markup tags, or a line opening with `{`/`[`.
//! 2. [`Category::ApiUsage`]: method calls, property assignments,
//!    constructor calls, annotations, URLs, networking keywords.
//! 3. [`Category::FixPatch`]: fix/bug/error vocabulary in the text or the
//!    supplied context, or a unified-diff `-`/`+` line pair.
//! 4. [`Category::MetadataTransformation`]: everything else.
//!
//! Confidence comes from a closed lookup table and never changes the
//! category:
//!
//! | Category | Condition | Confidence |
//! |----------|-----------|------------|
//! | CodeSnippet | function or class feature | 0.9 |
//! | CodeSnippet | import feature only | 0.7 |
//! | CodeSnippet | otherwise | 0.5 |
//! | ApiUsage | method-call feature | 0.8 |
//! | ApiUsage | otherwise | 0.6 |
//! | FixPatch | diff-format feature | 0.9 |
//! | FixPatch | otherwise | 0.7 |
//! | MetadataTransformation | always | 0.6 |
//!
//! A [`ClassificationBackend`] may be attached to consult a model first;
//! when it declines (returns `None`) the rule table is used.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::models::{Category, ClassificationResult};

const MODIFIERS: &str = r"(?:(?:public|private|protected|internal|static|export|default|async|override|open|suspend|inline|abstract|data|sealed|final|pub(?:\([^)]*\))?)\s+)*";

const MIN_CONFIDENCE: f64 = 0.5;
const MAX_CONFIDENCE: f64 = 0.9;

static FUNCTION_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?m)^[ \t]*{MODIFIERS}(?:fun|fn|function|def|func)\s+\w+"
    ))
    .expect("valid function declaration regex")
});

static CLASS_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?m)^[ \t]*{MODIFIERS}(?:class|interface|struct|trait|enum|object)\s+\w+"
    ))
    .expect("valid class declaration regex")
});

static IMPORT_STMT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?m)^[ \t]*(?:",
        r"import\s+(?:[\w.*]+(?:\s+as\s+\w+)?\s*;?[ \t]*$|[^\n]*\bfrom\s+['\x22]|['\x22])",
        r"|package\s+[\w.]+\s*;?[ \t]*$",
        r"|using\s+(?:static\s+)?[\w.]+(?:\s*=\s*[\w.]+)?\s*;",
        r"|#include\s*[<\x22]",
        r"|from\s+[\w.]+\s+import\s",
        r"|use\s+[\w:]+(?:::\{[^}\n]*\}|::\*)?(?:\s+as\s+\w+)?\s*;",
        r")"
    ))
        .expect("valid import regex")
});

static VARIABLE_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:val|var|let|const)\s+(?:mut\s+)?\w+")
        .expect("valid variable declaration regex")
});

static CONTROL_FLOW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:if|for|while|switch|when)\b[ \t]*(?:\(|[^\n]*[{:][ \t]*$)")
        .expect("valid control flow regex")
});

static MARKUP_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<[A-Za-z][\w.-]*(?:\s[^<>]*)?/?>|</[A-Za-z][\w.-]*>")
        .expect("valid markup regex")
});

static LEADING_BRACKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*[{\[]").expect("valid leading bracket regex"));

static METHOD_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.[A-Za-z_]\w*\s*\(").expect("valid method call regex"));

static PROPERTY_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z_]\w*\.[A-Za-z_]\w*\s*=[^=]").expect("valid property assignment regex")
});

static CONSTRUCTOR_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bnew\s+[A-Z]\w*\s*\(|\b[A-Z][a-z]\w*\([^)]*\)")
        .expect("valid constructor regex")
});

static ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(?:^|\s)@[A-Za-z]\w*").expect("valid annotation regex"));

static HTTP_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bhttps?://|\b(?:GET|POST|PUT|DELETE|PATCH)\s+/")
        .expect("valid http token regex")
});

static NETWORK_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:retrofit|okhttp|ktor|axios|fetch|xmlhttprequest|urlsession|httpclient|requests|websocket|grpc)\b")
        .expect("valid network keyword regex")
});

static FIX_VOCABULARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:fix\w*|bug\w*|error\w*|patch\w*|resolv\w*|issue\w*|changed)\b")
        .expect("valid fix vocabulary regex")
});

static DIFF_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^-[^\n]*\n\+").expect("valid diff regex"));

/// Signals extracted from a text. Used to derive confidence, never category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Features {
    pub has_function: bool,
    pub has_class: bool,
    pub has_import: bool,
    pub has_variable: bool,
    pub has_control_flow: bool,
    pub has_code_block: bool,
    pub has_markup: bool,
    pub has_leading_bracket: bool,
    pub has_api_call: bool,
    pub has_property_assignment: bool,
    pub has_constructor_call: bool,
    pub has_annotation: bool,
    pub has_http: bool,
    pub has_network_keyword: bool,
    pub has_fix_keyword: bool,
    pub has_diff_format: bool,
    pub line_count: usize,
    pub char_count: usize,
}

impl Features {
    fn looks_like_code(&self) -> bool {
        self.has_function
            || self.has_class
            || self.has_import
            || self.has_variable
            || self.has_control_flow
            || self.has_code_block
            || self.has_markup
            || self.has_leading_bracket
    }

    fn looks_like_api(&self) -> bool {
        self.has_api_call
            || self.has_property_assignment
            || self.has_constructor_call
            || self.has_annotation
            || self.has_http
            || self.has_network_keyword
    }
}

/// Extract the feature set for `text`.
pub fn extract_features(text: &str) -> Features {
    Features {
        has_function: FUNCTION_DECL.is_match(text),
        has_class: CLASS_DECL.is_match(text),
        has_import: IMPORT_STMT.is_match(text),
        has_variable: VARIABLE_DECL.is_match(text),
        has_control_flow: CONTROL_FLOW.is_match(text),
        has_code_block: text.contains("```"),
        has_markup: MARKUP_TAG.is_match(text),
        has_leading_bracket: LEADING_BRACKET.is_match(text),
        has_api_call: METHOD_CALL.is_match(text),
        has_property_assignment: PROPERTY_ASSIGNMENT.is_match(text),
        has_constructor_call: CONSTRUCTOR_CALL.is_match(text),
        has_annotation: ANNOTATION.is_match(text),
        has_http: HTTP_TOKEN.is_match(text),
        has_network_keyword: NETWORK_KEYWORD.is_match(text),
        has_fix_keyword: FIX_VOCABULARY.is_match(text),
        has_diff_format: DIFF_PAIR.is_match(text),
        line_count: text.lines().count(),
        char_count: text.chars().count(),
    }
}

/// A model-backed classifier consulted ahead of the rule table.
///
/// Loading and running the model is the implementor's business; returning
/// `None` defers to the rules.
pub trait ClassificationBackend: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, text: &str, context: Option<&str>) -> Option<ClassificationResult>;
}

/// Text/code categorizer. Cheap to clone.
#[derive(Clone, Default)]
pub struct Classifier {
    backend: Option<Arc<dyn ClassificationBackend>>,
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

impl Classifier {
    /// A classifier that only uses the deterministic rule table.
    pub fn rule_based() -> Self {
        Self { backend: None }
    }

    pub fn with_backend(backend: Arc<dyn ClassificationBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.name())
    }

    pub fn classify(&self, text: &str, context: Option<&str>) -> Category {
        self.classify_with_confidence(text, context).category
    }

    /// Category and confidence. A backend's confidence is clamped to the
    /// rule table's range `[0.5, 0.9]`.
    pub fn classify_with_confidence(
        &self,
        text: &str,
        context: Option<&str>,
    ) -> ClassificationResult {
        if let Some(backend) = &self.backend {
            if let Some(result) = backend.classify(text, context) {
                return ClassificationResult {
                    category: result.category,
                    confidence: result.confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE),
                };
            }
        }
        classify_by_rules(text, context)
    }
}

/// Apply the ordered rule groups and the confidence table.
pub fn classify_by_rules(text: &str, context: Option<&str>) -> ClassificationResult {
    let features = extract_features(text);

    let category = if features.looks_like_code() {
        Category::CodeSnippet
    } else if features.looks_like_api() {
        Category::ApiUsage
    } else if features.has_fix_keyword
        || features.has_diff_format
        || context.is_some_and(|c| FIX_VOCABULARY.is_match(c))
    {
        Category::FixPatch
    } else {
        Category::MetadataTransformation
    };

    ClassificationResult {
        category,
        confidence: confidence_for(category, &features),
    }
}

fn confidence_for(category: Category, features: &Features) -> f64 {
    match category {
        Category::CodeSnippet => {
            if features.has_function || features.has_class {
                0.9
            } else if features.has_import {
                0.7
            } else {
                0.5
            }
        }
        Category::ApiUsage => {
            if features.has_api_call {
                0.8
            } else {
                0.6
            }
        }
        Category::FixPatch => {
            if features.has_diff_format {
                0.9
            } else {
                0.7
            }
        }
        Category::MetadataTransformation => 0.6,
    }
}
