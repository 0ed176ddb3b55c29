//! CIF text utilities.
//!
//! Result CIFs from the service use DDL2 data names (`_cell.length_a`);
//! many hosts only read DDL1 (`_cell_length_a`). [`convert_ddl2_to_ddl1`]
//! rewrites data names line by line and leaves values and `;` text fields
//! untouched.
//!
//! [`parse_cif`] is a small reader covering what the companion rules need:
//! data blocks, single items, `loop_` tables, quoted strings, text fields
//! and comments. Tag lookups are case-insensitive and do not distinguish
//! the DDL1 and DDL2 spellings of a name.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

static DATA_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(_[a-zA-Z0-9_.\-]+)").expect("valid regex"));

static VALID_DATA_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^_[a-zA-Z0-9_.\-]+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// DDL conversion
// ---------------------------------------------------------------------------

/// Replace dots with underscores in every data name that starts a line.
///
/// Lines inside `;` text fields are copied verbatim, as is everything after
/// the data name on a line (so `10.5` stays `10.5`).
pub fn convert_ddl2_to_ddl1(cif_text: &str) -> String {
    let mut in_text_field = false;
    let lines: Vec<String> = cif_text
        .split('\n')
        .map(|line| {
            if line.starts_with(';') {
                in_text_field = !in_text_field;
                return line.to_string();
            }
            if in_text_field {
                return line.to_string();
            }
            match DATA_NAME_RE.captures(line) {
                Some(caps) => {
                    let whole = caps.get(0).map_or(0, |m| m.end());
                    let indent = caps.get(1).map_or("", |m| m.as_str());
                    let name = caps.get(2).map_or("", |m| m.as_str());
                    format!("{indent}{}{}", name.replace('.', "_"), &line[whole..])
                }
                None => line.to_string(),
            }
        })
        .collect();
    lines.join("\n")
}

/// Whether `name` is a syntactically valid CIF data name.
pub fn is_valid_data_name(name: &str) -> bool {
    VALID_DATA_NAME_RE.is_match(name)
}

/// Canonical lookup key: lower case, DDL2 dots folded to underscores.
pub fn normalize_tag(tag: &str) -> String {
    tag.to_ascii_lowercase().replace('.', "_")
}

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// A `loop_` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CifLoop {
    /// Tags as written in the file.
    pub tags: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CifLoop {
    /// Values of one column, in row order.
    pub fn column(&self, tag: &str) -> Option<Vec<&str>> {
        let key = normalize_tag(tag);
        let idx = self.tags.iter().position(|t| normalize_tag(t) == key)?;
        Some(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let key = normalize_tag(tag);
        self.tags.iter().any(|t| normalize_tag(t) == key)
    }
}

/// One `data_` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CifBlock {
    pub name: String,
    /// Single-valued items keyed by [`normalize_tag`].
    pub items: BTreeMap<String, String>,
    pub loops: Vec<CifLoop>,
}

impl CifBlock {
    /// Value of a single item. A one-row loop column also counts.
    pub fn get(&self, tag: &str) -> Option<&str> {
        if let Some(v) = self.items.get(&normalize_tag(tag)) {
            return Some(v.as_str());
        }
        self.loops.iter().find_map(|lp| match lp.column(tag) {
            Some(col) if col.len() == 1 => Some(col[0]),
            _ => None,
        })
    }

    /// Whether the tag appears anywhere in the block.
    pub fn contains(&self, tag: &str) -> bool {
        self.items.contains_key(&normalize_tag(tag)) || self.loops.iter().any(|l| l.has_tag(tag))
    }

    /// First loop containing `tag`.
    pub fn loop_with(&self, tag: &str) -> Option<&CifLoop> {
        self.loops.iter().find(|l| l.has_tag(tag))
    }

    /// First loop whose tags all share `prefix` (e.g. `_aspheric_ff`).
    pub fn find_loop(&self, prefix: &str) -> Option<&CifLoop> {
        let prefix = normalize_tag(prefix);
        self.loops.iter().find(|l| {
            !l.tags.is_empty() && l.tags.iter().all(|t| normalize_tag(t).starts_with(&prefix))
        })
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Data(String),
    Loop,
    Tag(String),
    Value(String),
}

fn parse_error(line: usize, message: impl Into<String>) -> CoreError {
    CoreError::CifParse {
        line,
        message: message.into(),
    }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, CoreError> {
    let mut tokens = Vec::new();
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l));

    while let Some((lineno, line)) = lines.next() {
        if let Some(first) = line.strip_prefix(';') {
            let mut field = vec![first.to_string()];
            let mut closed = false;
            for (_, inner) in lines.by_ref() {
                if inner.starts_with(';') {
                    closed = true;
                    break;
                }
                field.push(inner.to_string());
            }
            if !closed {
                return Err(parse_error(lineno, "unterminated text field"));
            }
            let value = field.join("\n").trim_start_matches('\n').to_string();
            tokens.push((lineno, Token::Value(value.trim_end().to_string())));
            continue;
        }
        tokenize_line(lineno, line, &mut tokens)?;
    }
    Ok(tokens)
}

fn tokenize_line(
    lineno: usize,
    line: &str,
    tokens: &mut Vec<(usize, Token)>,
) -> Result<(), CoreError> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            break;
        }
        if c == '\'' || c == '"' {
            // A quote only closes when followed by whitespace or end of line.
            let mut j = i + 1;
            loop {
                if j >= chars.len() {
                    return Err(parse_error(lineno, "unterminated quoted string"));
                }
                if chars[j] == c && chars.get(j + 1).map_or(true, |n| n.is_whitespace()) {
                    break;
                }
                j += 1;
            }
            tokens.push((lineno, Token::Value(chars[i + 1..j].iter().collect())));
            i = j + 1;
            continue;
        }
        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() {
            i += 1;
        }
        let word: String = chars[start..i].iter().collect();
        let lower = word.to_ascii_lowercase();
        let token = if lower.starts_with("data_") {
            Token::Data(word[5..].to_string())
        } else if lower == "loop_" {
            Token::Loop
        } else if lower.starts_with("save_") || lower == "global_" || lower == "stop_" {
            return Err(parse_error(
                lineno,
                format!("unsupported CIF construct '{word}'"),
            ));
        } else if word.starts_with('_') {
            Token::Tag(word)
        } else {
            Token::Value(word)
        };
        tokens.push((lineno, token));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse CIF text into its data blocks.
pub fn parse_cif(text: &str) -> Result<Vec<CifBlock>, CoreError> {
    let tokens = tokenize(text)?;
    let mut blocks: Vec<CifBlock> = Vec::new();
    let mut iter = tokens.into_iter().peekable();

    while let Some((lineno, token)) = iter.next() {
        match token {
            Token::Data(name) => blocks.push(CifBlock {
                name,
                ..Default::default()
            }),
            Token::Tag(tag) => {
                let block = blocks
                    .last_mut()
                    .ok_or_else(|| parse_error(lineno, "data item before any data_ block"))?;
                match iter.next() {
                    Some((_, Token::Value(v))) => {
                        block.items.insert(normalize_tag(&tag), v);
                    }
                    _ => return Err(parse_error(lineno, format!("missing value for {tag}"))),
                }
            }
            Token::Loop => {
                let block = blocks
                    .last_mut()
                    .ok_or_else(|| parse_error(lineno, "loop_ before any data_ block"))?;
                let mut lp = CifLoop::default();
                while let Some((_, Token::Tag(_))) = iter.peek() {
                    if let Some((_, Token::Tag(tag))) = iter.next() {
                        lp.tags.push(tag);
                    }
                }
                if lp.tags.is_empty() {
                    return Err(parse_error(lineno, "loop_ without tags"));
                }
                let mut values = Vec::new();
                while let Some((_, Token::Value(_))) = iter.peek() {
                    if let Some((_, Token::Value(v))) = iter.next() {
                        values.push(v);
                    }
                }
                if values.len() % lp.tags.len() != 0 {
                    return Err(parse_error(
                        lineno,
                        format!(
                            "loop has {} values for {} tags",
                            values.len(),
                            lp.tags.len()
                        ),
                    ));
                }
                let width = lp.tags.len();
                lp.rows = values.chunks(width).map(<[String]>::to_vec).collect();
                block.loops.push(lp);
            }
            Token::Value(v) => {
                return Err(parse_error(lineno, format!("unexpected value '{v}'")));
            }
        }
    }
    Ok(blocks)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn converts_data_names_only() {
        let cif = "_cell.length_a 10.5\n_refine.ls_R_factor_gt 0.0234";
        assert_eq!(
            convert_ddl2_to_ddl1(cif),
            "_cell_length_a 10.5\n_refine_ls_R_factor_gt 0.0234"
        );
    }

    #[test]
    fn text_fields_are_untouched() {
        let cif = ";\nnote about _cell.length_a\n;\n  _cell.length_b 12.3";
        let out = convert_ddl2_to_ddl1(cif);
        assert_eq!(out, ";\nnote about _cell.length_a\n;\n  _cell_length_b 12.3");
    }

    #[test]
    fn loop_values_keep_their_dots() {
        let cif = "loop_\n_atom_site.label\n_atom_site.fract_x\nC1 0.125\n";
        assert_eq!(
            convert_ddl2_to_ddl1(cif),
            "loop_\n_atom_site_label\n_atom_site_fract_x\nC1 0.125\n"
        );
    }

    #[test]
    fn data_name_validation() {
        assert!(is_valid_data_name("_cell.length_a"));
        assert!(is_valid_data_name("_atom-site_x"));
        assert!(!is_valid_data_name("cell_length_a"));
        assert!(!is_valid_data_name("_cell length"));
        assert!(!is_valid_data_name(""));
    }

    const SAMPLE: &str = "\
# comment line
data_test
_cell.length_a   10.5   # trailing comment
_symmetry_space_group_name_H-M 'P 21/c'
_publ_section_title
;
A multi-line
title
;
loop_
_atom_site.label
_atom_site.type_symbol
C1 C
O1 O
";

    #[test]
    fn parses_items_loops_and_text_fields() {
        let blocks = parse_cif(SAMPLE).unwrap();
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.name, "test");
        assert_eq!(block.get("_cell.length_a"), Some("10.5"));
        // DDL1 spelling finds the DDL2 item.
        assert_eq!(block.get("_cell_length_a"), Some("10.5"));
        assert_eq!(block.get("_symmetry_space_group_name_H-M"), Some("P 21/c"));
        assert_eq!(block.get("_publ_section_title"), Some("A multi-line\ntitle"));

        let lp = block.find_loop("_atom_site").unwrap();
        assert_eq!(lp.column("_atom_site.label").unwrap(), vec!["C1", "O1"]);
        assert!(block.contains("_atom_site_type_symbol"));
    }

    #[test]
    fn quotes_may_contain_quote_characters() {
        let blocks = parse_cif("data_x\n_a 'it's fine'\n").unwrap();
        assert_eq!(blocks[0].get("_a"), Some("it's fine"));
    }

    #[test]
    fn ragged_loop_is_rejected() {
        let err = parse_cif("data_x\nloop_\n_a\n_b\n1 2 3\n").unwrap_err();
        assert_matches!(err, CoreError::CifParse { line: 2, .. });
    }

    #[test]
    fn item_outside_block_is_rejected() {
        assert_matches!(parse_cif("_a 1\n"), Err(CoreError::CifParse { line: 1, .. }));
    }

    #[test]
    fn unterminated_text_field() {
        assert_matches!(
            parse_cif("data_x\n_a\n;\nnever closed\n"),
            Err(CoreError::CifParse { line: 3, .. })
        );
    }
}
