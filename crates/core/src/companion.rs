//! Companion artifacts derived from downloaded results.
//!
//! A [`CompanionRule`] fires on a result file whose name matches its
//! pattern and whose content carries all required CIF tags. The built-in
//! rule turns aspheric form-factor CIF output into a `.tscb` table next to
//! the CIF.

use regex::Regex;

use crate::cif::{parse_cif, CifBlock};
use crate::error::CoreError;
use crate::tsc::{TscbFile, REQUIRED_CIF_TAGS};

/// What a rule produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionKind {
    /// Binary form-factor table built from an `_aspheric_ff` loop.
    Tscb,
}

impl CompanionKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Tscb => "tscb",
        }
    }
}

/// Trigger and output of one companion artifact.
#[derive(Debug, Clone)]
pub struct CompanionRule {
    pub name: String,
    pub file_pattern: Regex,
    pub required_tags: Vec<String>,
    pub kind: CompanionKind,
}

impl CompanionRule {
    pub fn new(
        name: impl Into<String>,
        file_pattern: &str,
        required_tags: &[&str],
        kind: CompanionKind,
    ) -> Result<Self, CoreError> {
        let file_pattern = Regex::new(file_pattern).map_err(|e| {
            CoreError::Validation(format!("invalid companion file pattern '{file_pattern}': {e}"))
        })?;
        Ok(Self {
            name: name.into(),
            file_pattern,
            required_tags: required_tags.iter().map(|t| t.to_string()).collect(),
            kind,
        })
    }

    /// `<stem>.cif` with aspheric form factors -> `<stem>.tscb`.
    pub fn aspheric_form_factors() -> Self {
        Self {
            name: "aspheric_form_factors".to_string(),
            file_pattern: Regex::new(r"(?i)\.cif$").expect("valid regex"),
            required_tags: REQUIRED_CIF_TAGS
                .iter()
                .map(|t| t.to_string())
                .chain(std::iter::once("_aspheric_ff.index_h".to_string()))
                .collect(),
            kind: CompanionKind::Tscb,
        }
    }

    fn matching_block<'a>(&self, blocks: &'a [CifBlock]) -> Option<&'a CifBlock> {
        blocks
            .iter()
            .find(|b| self.required_tags.iter().all(|t| b.contains(t)))
    }

    /// Whether this rule fires for a downloaded file.
    pub fn matches(&self, file_name: &str, content: &[u8]) -> bool {
        if !self.file_pattern.is_match(file_name) {
            return false;
        }
        let Ok(text) = std::str::from_utf8(content) else {
            return false;
        };
        // Cheap pre-check before parsing the whole file.
        if !self
            .required_tags
            .iter()
            .all(|t| text.contains(t.as_str()) || text.contains(&t.replace('.', "_")))
        {
            return false;
        }
        match parse_cif(text) {
            Ok(blocks) => self.matching_block(&blocks).is_some(),
            Err(e) => {
                tracing::debug!(file_name, rule = %self.name, error = %e, "Result is not readable CIF");
                false
            }
        }
    }

    /// File name of the companion for `file_name`.
    pub fn companion_name(&self, file_name: &str) -> String {
        let stem = match file_name.rfind('.') {
            Some(idx) if idx > 0 => &file_name[..idx],
            _ => file_name,
        };
        format!("{stem}.{}", self.kind.extension())
    }

    /// Build the companion artifact from the source content.
    pub fn derive(&self, content: &[u8]) -> Result<Vec<u8>, CoreError> {
        let text = std::str::from_utf8(content)
            .map_err(|e| CoreError::Validation(format!("result is not UTF-8 text: {e}")))?;
        let blocks = parse_cif(text)?;
        let block = self.matching_block(&blocks).ok_or_else(|| {
            CoreError::NotFound(format!("no data block matching rule '{}'", self.name))
        })?;
        match self.kind {
            CompanionKind::Tscb => TscbFile::from_cif_block(block)?.to_bytes(),
        }
    }
}

/// Rules applied when configuration names none.
pub fn default_rules() -> Vec<CompanionRule> {
    vec![CompanionRule::aspheric_form_factors()]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
