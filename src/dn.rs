use std::fmt;

use crate::error::{DirectoryError, Result};

pub const SCHEMA_DN: &str = "ou=schema";
pub const SYSTEM_DN: &str = "ou=system";

// ------------- Rdn -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rdn {
    attribute: String,
    value: String,
}
impl Rdn {
    pub fn attribute(&self) -> &str {
        &self.attribute
    }
    pub fn value(&self) -> &str {
        &self.value
    }
    fn normalized(&self) -> String {
        format!(
            "{}={}",
            self.attribute.to_ascii_lowercase(),
            self.value.to_lowercase()
        )
    }
}
impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}={}", self.attribute, self.value)
    }
}

// ------------- Dn -------------
/// A distinguished name, most specific RDN first. Escaped separators are
/// not supported; the names handled here are partition suffixes and schema
/// entry names.
#[derive(Debug, Clone)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    pub fn parse(text: &str) -> Result<Self> {
        let mut rdns = Vec::new();
        if text.trim().is_empty() {
            return Ok(Self { rdns });
        }
        for component in text.split(',') {
            let (attribute, value) = component.split_once('=').ok_or_else(|| DirectoryError::Parse {
                message: format!("invalid RDN '{}' in DN '{}'", component.trim(), text),
                line: None,
                col: None,
            })?;
            let attribute = attribute.trim();
            let value = value.trim();
            if attribute.is_empty() || value.is_empty() {
                return Err(DirectoryError::Parse {
                    message: format!("empty RDN component in DN '{}'", text),
                    line: None,
                    col: None,
                });
            }
            rdns.push(Rdn {
                attribute: attribute.to_string(),
                value: value.to_string(),
            });
        }
        Ok(Self { rdns })
    }
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }
    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }
    pub fn normalized(&self) -> String {
        self.rdns
            .iter()
            .map(Rdn::normalized)
            .collect::<Vec<_>>()
            .join(",")
    }
    /// True when `self` equals `ancestor` or sits below it.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        if ancestor.rdns.len() > self.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - ancestor.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(ancestor.rdns.iter())
            .all(|(a, b)| a.normalized() == b.normalized())
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}
impl Eq for Dn {}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.rdns.iter().map(Rdn::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}
