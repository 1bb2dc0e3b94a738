//! Label selectors over target labels
//!
//! A [`LabelSelector`] is the declarative form stored on a request
//! (`matchLabels` plus `matchExpressions`). It is validated into a
//! [`Selector`] before use. Selectors can also be parsed from the usual
//! textual form, e.g. `env=prod,tier!=db,region in (us,eu),!legacy`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::errors::SelectorError;

const MAX_NAME_LENGTH: usize = 63;
const MAX_PREFIX_LENGTH: usize = 253;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl fmt::Display for SelectorOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectorOperator::In => "In",
            SelectorOperator::NotIn => "NotIn",
            SelectorOperator::Exists => "Exists",
            SelectorOperator::DoesNotExist => "DoesNotExist",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Declarative selector as stored on a collection request.
/// The empty selector matches every target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            match_labels: labels
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            match_expressions: Vec::new(),
        }
    }

    pub fn to_selector(&self) -> Result<Selector, SelectorError> {
        let mut requirements = Vec::with_capacity(self.match_labels.len() + self.match_expressions.len());

        for (key, value) in &self.match_labels {
            requirements.push(Requirement::new(
                key,
                SelectorOperator::In,
                std::iter::once(value.clone()),
            )?);
        }
        for expression in &self.match_expressions {
            requirements.push(Requirement::new(
                &expression.key,
                expression.operator,
                expression.values.iter().cloned(),
            )?);
        }

        Ok(Selector { requirements })
    }
}

/// A single validated requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: SelectorOperator,
    values: BTreeSet<String>,
}

impl Requirement {
    pub fn new(
        key: &str,
        operator: SelectorOperator,
        values: impl IntoIterator<Item = String>,
    ) -> Result<Self, SelectorError> {
        validate_key(key)?;
        let values: BTreeSet<String> = values.into_iter().collect();

        match operator {
            SelectorOperator::In | SelectorOperator::NotIn if values.is_empty() => {
                return Err(SelectorError::InvalidRequirement {
                    key: key.to_string(),
                    operator: operator.to_string(),
                    reason: "requires at least one value".to_string(),
                });
            }
            SelectorOperator::Exists | SelectorOperator::DoesNotExist if !values.is_empty() => {
                return Err(SelectorError::InvalidRequirement {
                    key: key.to_string(),
                    operator: operator.to_string(),
                    reason: "does not accept values".to_string(),
                });
            }
            _ => {}
        }
        for value in &values {
            validate_value(key, value)?;
        }

        Ok(Self {
            key: key.to_string(),
            operator,
            values,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> SelectorOperator {
        self.operator
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            SelectorOperator::In => value.is_some_and(|v| self.values.contains(v)),
            SelectorOperator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            SelectorOperator::Exists => value.is_some(),
            SelectorOperator::DoesNotExist => value.is_none(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.iter().cloned().collect::<Vec<_>>().join(",");
        match self.operator {
            SelectorOperator::In if self.values.len() == 1 => write!(f, "{}={}", self.key, values),
            SelectorOperator::NotIn if self.values.len() == 1 => {
                write!(f, "{}!={}", self.key, values)
            }
            SelectorOperator::In => write!(f, "{} in ({})", self.key, values),
            SelectorOperator::NotIn => write!(f, "{} notin ({})", self.key, values),
            SelectorOperator::Exists => write!(f, "{}", self.key),
            SelectorOperator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// Validated selector: a conjunction of requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.trim().is_empty() {
            return Ok(Selector::everything());
        }

        let parse_error = |reason: &str| SelectorError::Parse {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let mut requirements = Vec::new();
        for term in split_terms(input).map_err(parse_error)? {
            let term = term.trim();
            if term.is_empty() {
                return Err(parse_error("empty requirement"));
            }
            requirements.push(parse_term(term).map_err(|e| match e {
                ParseFailure::Syntax(reason) => parse_error(reason),
                ParseFailure::Invalid(e) => e,
            })?);
        }

        Ok(Selector { requirements })
    }
}

enum ParseFailure {
    Syntax(&'static str),
    Invalid(SelectorError),
}

impl From<SelectorError> for ParseFailure {
    fn from(e: SelectorError) -> Self {
        ParseFailure::Invalid(e)
    }
}

/// Splits on commas that are not inside a value set.
fn split_terms(input: &str) -> Result<Vec<&str>, &'static str> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match c {
            '(' => {
                if depth > 0 {
                    return Err("nested parentheses");
                }
                depth += 1;
            }
            ')' => {
                if depth == 0 {
                    return Err("unbalanced parentheses");
                }
                depth -= 1;
            }
            ',' if depth == 0 => {
                terms.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unbalanced parentheses");
    }
    terms.push(&input[start..]);
    Ok(terms)
}

fn parse_term(term: &str) -> Result<Requirement, ParseFailure> {
    if let Some(key) = term.strip_prefix('!') {
        return Ok(Requirement::new(
            key.trim(),
            SelectorOperator::DoesNotExist,
            std::iter::empty(),
        )?);
    }

    if let Some(open) = term.find('(') {
        let close = term.rfind(')').ok_or(ParseFailure::Syntax("missing ')'"))?;
        if close != term.len() - 1 {
            return Err(ParseFailure::Syntax("unexpected text after ')'"));
        }
        let mut head = term[..open].split_whitespace();
        let (Some(key), Some(op), None) = (head.next(), head.next(), head.next()) else {
            return Err(ParseFailure::Syntax("expected '<key> in|notin (<values>)'"));
        };
        let operator = match op {
            "in" => SelectorOperator::In,
            "notin" => SelectorOperator::NotIn,
            _ => return Err(ParseFailure::Syntax("unknown set operator")),
        };
        let values: Vec<String> = term[open + 1..close]
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        return Ok(Requirement::new(key, operator, values)?);
    }

    if let Some((key, value)) = term.split_once("!=") {
        return Ok(Requirement::new(
            key.trim(),
            SelectorOperator::NotIn,
            std::iter::once(value.trim().to_string()),
        )?);
    }

    if let Some((key, value)) = term.split_once('=') {
        let value = value.strip_prefix('=').unwrap_or(value);
        return Ok(Requirement::new(
            key.trim(),
            SelectorOperator::In,
            std::iter::once(value.trim().to_string()),
        )?);
    }

    if term.contains(char::is_whitespace) {
        return Err(ParseFailure::Syntax("unexpected whitespace in key"));
    }
    Ok(Requirement::new(term, SelectorOperator::Exists, std::iter::empty())?)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.len() > MAX_NAME_LENGTH {
        return Err(format!("must be no more than {} characters", MAX_NAME_LENGTH));
    }
    if !name.chars().all(is_name_char) {
        return Err("may only contain alphanumerics, '-', '_' or '.'".to_string());
    }
    let starts_ok = name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let ends_ok = name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
    if !starts_ok || !ends_ok {
        return Err("must start and end with an alphanumeric character".to_string());
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<(), SelectorError> {
    let invalid = |reason: String| SelectorError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    let name = match key.split_once('/') {
        Some((prefix, name)) => {
            if prefix.is_empty() || prefix.len() > MAX_PREFIX_LENGTH {
                return Err(invalid(format!(
                    "prefix must be 1-{} characters",
                    MAX_PREFIX_LENGTH
                )));
            }
            if !prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
            {
                return Err(invalid("prefix must be a lowercase DNS subdomain".to_string()));
            }
            name
        }
        None => key,
    };

    if name.is_empty() {
        return Err(invalid("name part must not be empty".to_string()));
    }
    validate_name(name).map_err(invalid)
}

fn validate_value(key: &str, value: &str) -> Result<(), SelectorError> {
    if value.is_empty() {
        return Ok(());
    }
    validate_name(value).map_err(|reason| SelectorError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    })
}
