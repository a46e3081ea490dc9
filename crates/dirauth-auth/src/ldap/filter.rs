//! LDAP search filter tree
//!
//! Filters are built and carried as a tree, rendered to RFC 4515 text only
//! at the wire boundary. Caller-supplied fragments from configuration are
//! parsed into the same tree so they can be validated up front and
//! evaluated by the in-process directory.

use dirauth_core::types::DirectoryEntry;
use ldap3::{ldap_escape, ldap_unescape};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid search filter at position {position}: {reason}")]
pub struct FilterError {
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality {
        attr: String,
        value: String,
    },
    Present {
        attr: String,
    },
    Substring {
        attr: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
    GreaterOrEqual {
        attr: String,
        value: String,
    },
    LessOrEqual {
        attr: String,
        value: String,
    },
    Approx {
        attr: String,
        value: String,
    },
}

impl Filter {
    pub fn equality(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equality {
            attr: attr.into(),
            value: value.into(),
        }
    }

    /// `(&(objectClass=<class>)(<field>=<username>)<extra>)`
    ///
    /// The username is always a literal assertion value.
    pub fn user_lookup(
        object_class: &str,
        field: &str,
        username: &str,
        extra: Option<&Filter>,
    ) -> Self {
        let mut terms = vec![
            Filter::equality("objectClass", object_class),
            Filter::equality(field, username),
        ];
        if let Some(extra) = extra {
            terms.push(extra.clone());
        }
        Filter::And(terms)
    }

    /// Parse RFC 4515 text. A fragment without outer parentheses is wrapped.
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(FilterError {
                position: 0,
                reason: "empty filter".into(),
            });
        }

        let text = if trimmed.starts_with('(') {
            trimmed.to_string()
        } else {
            format!("({})", trimmed)
        };

        let mut parser = Parser {
            input: text.as_bytes(),
            pos: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.input.len() {
            return Err(parser.error("trailing characters after filter"));
        }
        Ok(filter)
    }

    /// Evaluate against an entry. Attribute names and values compare
    /// case-insensitively.
    pub fn matches(&self, entry: &DirectoryEntry) -> bool {
        match self {
            Filter::And(terms) => terms.iter().all(|f| f.matches(entry)),
            Filter::Or(terms) => terms.iter().any(|f| f.matches(entry)),
            Filter::Not(inner) => !inner.matches(entry),
            Filter::Equality { attr, value } | Filter::Approx { attr, value } => entry
                .values(attr)
                .map(|vals| vals.iter().any(|v| v.eq_ignore_ascii_case(value)))
                .unwrap_or(false),
            Filter::Present { attr } => entry
                .values(attr)
                .map(|vals| !vals.is_empty())
                .unwrap_or(false),
            Filter::Substring {
                attr,
                initial,
                any,
                last,
            } => entry
                .values(attr)
                .map(|vals| {
                    vals.iter()
                        .any(|v| substring_match(v, initial.as_deref(), any, last.as_deref()))
                })
                .unwrap_or(false),
            Filter::GreaterOrEqual { attr, value } => entry
                .values(attr)
                .map(|vals| {
                    vals.iter()
                        .any(|v| v.to_lowercase() >= value.to_lowercase())
                })
                .unwrap_or(false),
            Filter::LessOrEqual { attr, value } => entry
                .values(attr)
                .map(|vals| {
                    vals.iter()
                        .any(|v| v.to_lowercase() <= value.to_lowercase())
                })
                .unwrap_or(false),
        }
    }
}

fn substring_match(value: &str, initial: Option<&str>, any: &[String], last: Option<&str>) -> bool {
    let value = value.to_lowercase();
    let mut rest = value.as_str();

    if let Some(initial) = initial {
        let initial = initial.to_lowercase();
        match rest.strip_prefix(initial.as_str()) {
            Some(r) => rest = r,
            None => return false,
        }
    }

    for part in any {
        let part = part.to_lowercase();
        match rest.find(part.as_str()) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }

    match last {
        Some(last) => rest.ends_with(last.to_lowercase().as_str()),
        None => true,
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(terms) => {
                f.write_str("(&")?;
                for term in terms {
                    write!(f, "{}", term)?;
                }
                f.write_str(")")
            }
            Filter::Or(terms) => {
                f.write_str("(|")?;
                for term in terms {
                    write!(f, "{}", term)?;
                }
                f.write_str(")")
            }
            Filter::Not(inner) => write!(f, "(!{})", inner),
            Filter::Equality { attr, value } => write!(f, "({}={})", attr, ldap_escape(value.as_str())),
            Filter::Present { attr } => write!(f, "({}=*)", attr),
            Filter::Substring {
                attr,
                initial,
                any,
                last,
            } => {
                write!(f, "({}=", attr)?;
                if let Some(initial) = initial {
                    f.write_str(&ldap_escape(initial.as_str()))?;
                }
                f.write_str("*")?;
                for part in any {
                    write!(f, "{}*", ldap_escape(part.as_str()))?;
                }
                if let Some(last) = last {
                    f.write_str(&ldap_escape(last.as_str()))?;
                }
                f.write_str(")")
            }
            Filter::GreaterOrEqual { attr, value } => {
                write!(f, "({}>={})", attr, ldap_escape(value.as_str()))
            }
            Filter::LessOrEqual { attr, value } => {
                write!(f, "({}<={})", attr, ldap_escape(value.as_str()))
            }
            Filter::Approx { attr, value } => write!(f, "({}~={})", attr, ldap_escape(value.as_str())),
        }
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> FilterError {
        FilterError {
            position: self.pos,
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, c: u8) -> Result<(), FilterError> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c as char)))
        }
    }

    fn filter(&mut self) -> Result<Filter, FilterError> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut terms = Vec::new();
        while self.peek() == Some(b'(') {
            terms.push(self.filter()?);
        }
        Ok(terms)
    }

    fn item(&mut self) -> Result<Filter, FilterError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'-' || c == b'.' || c == b';' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected attribute description"));
        }
        let attr = self.slice(start, self.pos)?.to_string();

        let op = match (self.peek(), self.input.get(self.pos + 1).copied()) {
            (Some(b'='), _) => {
                self.pos += 1;
                b'='
            }
            (Some(op @ (b'~' | b'>' | b'<')), Some(b'=')) => {
                self.pos += 2;
                op
            }
            _ => return Err(self.error("expected filter operator")),
        };

        let value_start = self.pos;
        while let Some(c) = self.peek() {
            match c {
                b')' => break,
                b'(' => return Err(self.error("unescaped '(' in assertion value")),
                _ => self.pos += 1,
            }
        }
        let raw = self.slice(value_start, self.pos)?;

        match op {
            b'~' => Ok(Filter::Approx {
                attr,
                value: self.unescape(raw)?,
            }),
            b'>' => Ok(Filter::GreaterOrEqual {
                attr,
                value: self.unescape(raw)?,
            }),
            b'<' => Ok(Filter::LessOrEqual {
                attr,
                value: self.unescape(raw)?,
            }),
            _ if raw == "*" => Ok(Filter::Present { attr }),
            _ if raw.contains('*') => self.substring(attr, raw),
            _ => Ok(Filter::Equality {
                attr,
                value: self.unescape(raw)?,
            }),
        }
    }

    fn substring(&self, attr: String, raw: &str) -> Result<Filter, FilterError> {
        let parts: Vec<&str> = raw.split('*').collect();
        let (first, rest) = parts.split_first().ok_or_else(|| self.error("empty substring"))?;
        let (end, middle) = rest.split_last().ok_or_else(|| self.error("empty substring"))?;

        let initial = Some(*first)
            .filter(|s| !s.is_empty())
            .map(|s| self.unescape(s))
            .transpose()?;
        let last = Some(*end)
            .filter(|s| !s.is_empty())
            .map(|s| self.unescape(s))
            .transpose()?;
        let mut any = Vec::new();
        for part in middle {
            if part.is_empty() {
                return Err(self.error("consecutive '*' in substring filter"));
            }
            any.push(self.unescape(part)?);
        }

        Ok(Filter::Substring {
            attr,
            initial,
            any,
            last,
        })
    }

    fn slice(&self, start: usize, end: usize) -> Result<&'a str, FilterError> {
        std::str::from_utf8(&self.input[start..end]).map_err(|_| self.error("invalid UTF-8"))
    }

    fn unescape(&self, raw: &str) -> Result<String, FilterError> {
        ldap_unescape(raw)
            .map(|v| v.into_owned())
            .map_err(|_| self.error("invalid escape sequence in assertion value"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bob() -> DirectoryEntry {
        DirectoryEntry::new("uid=bob,ou=people,dc=x")
            .with_attribute("objectClass", ["top", "person"])
            .with_attribute("uid", ["bob"])
            .with_attribute("cn", ["Bob Builder"])
            .with_attribute("employeeNumber", ["0042"])
    }

    #[test]
    fn test_user_lookup_rendering() {
        let filter = Filter::user_lookup("person", "uid", "bob", None);
        assert_eq!(filter.to_string(), "(&(objectClass=person)(uid=bob))");

        let extra = Filter::parse("(!(cn=disabled))").unwrap();
        let filter = Filter::user_lookup("person", "uid", "bob", Some(&extra));
        assert_eq!(
            filter.to_string(),
            "(&(objectClass=person)(uid=bob)(!(cn=disabled)))"
        );
    }

    #[test]
    fn test_username_is_escaped() {
        let filter = Filter::user_lookup("person", "uid", "*)(uid=*", None);
        assert_eq!(
            filter.to_string(),
            "(&(objectClass=person)(uid=\\2a\\29\\28uid=\\2a))"
        );
        assert!(!filter.matches(&bob()));
    }

    #[test]
    fn test_parse_wraps_bare_fragment() {
        let filter = Filter::parse("memberOf=cn=devs,dc=x").unwrap();
        assert_eq!(filter, Filter::equality("memberOf", "cn=devs,dc=x"));
    }

    #[test]
    fn test_parse_compound() {
        let filter = Filter::parse("(|(cn=Bob*)(!(uid=alice))(mail=*))").unwrap();
        match &filter {
            Filter::Or(terms) => {
                assert_eq!(terms.len(), 3);
                assert!(matches!(terms[2], Filter::Present { .. }));
            }
            other => panic!("unexpected filter: {:?}", other),
        }
        assert!(filter.matches(&bob()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Filter::parse("").is_err());
        assert!(Filter::parse("(uid=bob").is_err());
        assert!(Filter::parse("(uid=bob))").is_err());
        assert!(Filter::parse("(=bob)").is_err());
        assert!(Filter::parse("(uid bob)").is_err());
        assert!(Filter::parse("(cn=a**b)").is_err());
    }

    #[test]
    fn test_parse_escapes() {
        let filter = Filter::parse("(cn=Bob \\28admin\\29)").unwrap();
        assert_eq!(filter, Filter::equality("cn", "Bob (admin)"));
        assert_eq!(filter.to_string(), "(cn=Bob \\28admin\\29)");
    }

    #[test]
    fn test_matching() {
        let entry = bob();

        assert!(Filter::parse("(objectclass=PERSON)").unwrap().matches(&entry));
        assert!(Filter::parse("(cn=*build*)").unwrap().matches(&entry));
        assert!(Filter::parse("(cn=bob*er)").unwrap().matches(&entry));
        assert!(!Filter::parse("(cn=*alice*)").unwrap().matches(&entry));
        assert!(Filter::parse("(employeeNumber>=0040)").unwrap().matches(&entry));
        assert!(!Filter::parse("(employeeNumber<=0040)").unwrap().matches(&entry));
        assert!(!Filter::parse("(mail=*)").unwrap().matches(&entry));
        assert!(Filter::parse("(&)").unwrap().matches(&entry));
    }
}
