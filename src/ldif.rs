//! LDIF records.
//!
//! Schema definitions are stored as LDIF content records, one per file. This
//! module parses LDIF text into [`LdifEntry`] values and writes entries back
//! out in a canonical form. Continuation lines are unfolded and comments are
//! dropped before the text reaches the grammar in `ldif.pest`.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::error::{DirectoryError, Result};

#[derive(Parser)]
#[grammar = "ldif.pest"]
struct LdifParser;

// ------------- Attribute -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    values: Vec<String>,
}
impl Attribute {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

// ------------- Entry -------------
/// A single LDIF content record. Attribute names compare case-insensitively
/// and keep the order in which they were first seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdifEntry {
    dn: String,
    attributes: Vec<Attribute>,
}

impl LdifEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }
    pub fn dn(&self) -> &str {
        &self.dn
    }
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
    pub fn contains(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }
    /// First value of the named attribute.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attribute(name)
            .and_then(|a| a.values.first())
            .map(String::as_str)
    }
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.attribute(name)
            .map(|a| a.values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
    /// Adds a value, merging into an existing attribute of the same name.
    /// Duplicate values are ignored.
    pub fn add_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => {
                if !existing.values.contains(&value) {
                    existing.values.push(value);
                }
            }
            None => self.attributes.push(Attribute {
                name: name.to_string(),
                values: vec![value],
            }),
        }
    }
}

impl fmt::Display for LdifEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_line(f, "dn", &self.dn)?;
        for attribute in &self.attributes {
            for value in &attribute.values {
                write_line(f, &attribute.name, value)?;
            }
        }
        Ok(())
    }
}

fn write_line(f: &mut fmt::Formatter, name: &str, value: &str) -> fmt::Result {
    if is_safe_string(value) {
        writeln!(f, "{}: {}", name, value)
    } else {
        writeln!(f, "{}:: {}", name, STANDARD.encode(value.as_bytes()))
    }
}

// SAFE-STRING in RFC 2849, additionally refusing a trailing space.
fn is_safe_string(value: &str) -> bool {
    if let Some(first) = value.chars().next() {
        if first == ' ' || first == ':' || first == '<' {
            return false;
        }
    }
    !value.ends_with(' ')
        && value
            .bytes()
            .all(|b| b.is_ascii() && b != b'\0' && b != b'\n' && b != b'\r')
}

// ------------- Document -------------
#[derive(Debug, Clone, Default)]
pub struct LdifDocument {
    pub version: Option<u32>,
    pub entries: Vec<LdifEntry>,
}

/// Joins continuation lines onto their predecessor and drops comments,
/// including folded comment lines.
fn unfold(text: &str) -> String {
    let mut unfolded = String::with_capacity(text.len());
    let mut in_comment = false;
    for line in text.lines() {
        if line.trim().is_empty() {
            in_comment = false;
            unfolded.push('\n');
        } else if let Some(rest) = line.strip_prefix(' ') {
            if in_comment {
                continue;
            }
            if unfolded.ends_with('\n') {
                unfolded.pop();
            }
            unfolded.push_str(rest);
            unfolded.push('\n');
        } else if line.starts_with('#') {
            in_comment = true;
        } else {
            in_comment = false;
            unfolded.push_str(line);
            unfolded.push('\n');
        }
    }
    unfolded
}

pub fn parse_ldif(text: &str) -> Result<LdifDocument> {
    let unfolded = unfold(text);
    let mut pairs = LdifParser::parse(Rule::ldif, &unfolded).map_err(|e| {
        let (line, col) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        DirectoryError::Parse {
            message: e.variant.message().to_string(),
            line: Some(line),
            col: Some(col),
        }
    })?;
    let mut document = LdifDocument::default();
    let Some(root) = pairs.next() else {
        return Ok(document);
    };
    for pair in root.into_inner() {
        match pair.as_rule() {
            Rule::version_spec => {
                let number = pair.into_inner().as_str();
                document.version = Some(number.parse().map_err(|_| DirectoryError::Parse {
                    message: format!("invalid version {}", number),
                    line: None,
                    col: None,
                })?);
            }
            Rule::record => document.entries.push(parse_record(pair)?),
            _ => {}
        }
    }
    Ok(document)
}

fn parse_record(record: Pair<Rule>) -> Result<LdifEntry> {
    let mut entry: Option<LdifEntry> = None;
    for part in record.into_inner() {
        match part.as_rule() {
            Rule::dn_spec => {
                let value = parse_value(part.into_inner())?;
                entry = Some(LdifEntry::new(value));
            }
            Rule::attrval => {
                let mut inner = part.into_inner();
                let name = inner.next().map(|p| p.as_str()).unwrap_or_default();
                let value = parse_value(inner)?;
                if let Some(entry) = entry.as_mut() {
                    entry.add_attribute(name, value);
                }
            }
            _ => {}
        }
    }
    entry.ok_or_else(|| DirectoryError::Parse {
        message: "record without dn".to_string(),
        line: None,
        col: None,
    })
}

fn parse_value(mut pairs: pest::iterators::Pairs<Rule>) -> Result<String> {
    let Some(value) = pairs.next() else {
        return Ok(String::new());
    };
    let rule = value.as_rule();
    let (line, col) = value.line_col();
    let text = value.into_inner().as_str();
    match rule {
        Rule::plain_value => Ok(text.to_string()),
        Rule::base64_value => {
            let bytes = STANDARD.decode(text.trim()).map_err(|e| DirectoryError::Parse {
                message: format!("invalid base64 value: {}", e),
                line: Some(line),
                col: Some(col),
            })?;
            String::from_utf8(bytes).map_err(|_| DirectoryError::Parse {
                message: "binary values are not supported".to_string(),
                line: Some(line),
                col: Some(col),
            })
        }
        _ => Err(DirectoryError::Parse {
            message: format!("URL values are not supported: {}", text),
            line: Some(line),
            col: Some(col),
        }),
    }
}
