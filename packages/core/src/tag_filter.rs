//! Declarative tag predicates.
//!
//! A filter is a disjunction of clauses separated by `|`; each clause is a
//! conjunction of conditions separated by `&`. A condition is one of:
//!
//! | Syntax         | Matches when                                   |
//! |----------------|------------------------------------------------|
//! | `key->a,b`     | `key` is present with value `a` or `b`         |
//! | `key->*`       | `key` is present                               |
//! | `key->!`       | `key` is absent                                |
//! | `key->!a,b`    | `key` is absent or its value is neither `a` nor `b` |
//!
//! Value comparison ignores ASCII case. An empty definition matches
//! everything; [`TagFilter::none`] is the filter that matches nothing.

use std::str::FromStr;

use topocheck_feature_models::Tags;

/// Malformed filter definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterParseError {
    /// A condition without the `->` separator.
    #[error("Condition '{condition}' in filter '{definition}' has no '->'")]
    MissingArrow {
        /// The full filter text.
        definition: String,
        /// The offending condition.
        condition: String,
    },

    /// A condition with an empty key.
    #[error("Condition '{condition}' in filter '{definition}' has an empty key")]
    EmptyKey {
        /// The full filter text.
        definition: String,
        /// The offending condition.
        condition: String,
    },

    /// A condition with an empty value list entry (e.g. `key->a,,b`).
    #[error("Condition '{condition}' in filter '{definition}' has an empty value")]
    EmptyValue {
        /// The full filter text.
        definition: String,
        /// The offending condition.
        condition: String,
    },

    /// An empty clause (e.g. `a->b||c->d` or a trailing `&`).
    #[error("Filter '{definition}' has an empty clause or condition")]
    EmptyClause {
        /// The full filter text.
        definition: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Condition {
    Present(String),
    Absent(String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
}

impl Condition {
    fn matches(&self, tags: &Tags) -> bool {
        match self {
            Self::Present(key) => tags.contains_key(key),
            Self::Absent(key) => !tags.contains_key(key),
            Self::In(key, values) => tags
                .get(key)
                .is_some_and(|value| values.iter().any(|v| v.eq_ignore_ascii_case(value))),
            Self::NotIn(key, values) => tags
                .get(key)
                .is_none_or(|value| !values.iter().any(|v| v.eq_ignore_ascii_case(value))),
        }
    }
}

/// A parsed tag filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    definition: String,
    /// Disjunction of conjunctions. One empty clause matches everything, no
    /// clauses match nothing.
    clauses: Vec<Vec<Condition>>,
}

impl TagFilter {
    /// A filter that matches every tag map.
    #[must_use]
    pub fn all() -> Self {
        Self {
            definition: String::new(),
            clauses: vec![Vec::new()],
        }
    }

    /// A filter that matches no tag map.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            definition: String::new(),
            clauses: Vec::new(),
        }
    }

    /// Parses a filter definition.
    ///
    /// # Errors
    ///
    /// * If a clause or condition is empty
    /// * If a condition lacks `->`, a key, or has an empty value
    pub fn parse(definition: &str) -> Result<Self, FilterParseError> {
        let definition = definition.trim();
        if definition.is_empty() {
            return Ok(Self::all());
        }

        let mut clauses = Vec::new();
        for clause in definition.split('|') {
            let mut conditions = Vec::new();
            for condition in clause.split('&') {
                let condition = condition.trim();
                if condition.is_empty() {
                    return Err(FilterParseError::EmptyClause {
                        definition: definition.to_string(),
                    });
                }
                conditions.push(parse_condition(definition, condition)?);
            }
            clauses.push(conditions);
        }

        Ok(Self {
            definition: definition.to_string(),
            clauses,
        })
    }

    /// Whether `tags` satisfies at least one clause.
    #[must_use]
    pub fn matches(&self, tags: &Tags) -> bool {
        self.clauses
            .iter()
            .any(|clause| clause.iter().all(|condition| condition.matches(tags)))
    }
}

fn parse_condition(definition: &str, condition: &str) -> Result<Condition, FilterParseError> {
    let error_context = || (definition.to_string(), condition.to_string());

    let Some((key, values)) = condition.split_once("->") else {
        let (definition, condition) = error_context();
        return Err(FilterParseError::MissingArrow {
            definition,
            condition,
        });
    };

    let key = key.trim();
    if key.is_empty() {
        let (definition, condition) = error_context();
        return Err(FilterParseError::EmptyKey {
            definition,
            condition,
        });
    }

    let values = values.trim();
    let (negated, values) = values
        .strip_prefix('!')
        .map_or((false, values), |rest| (true, rest.trim()));

    match (negated, values) {
        (false, "*") => return Ok(Condition::Present(key.to_string())),
        (true, "") => return Ok(Condition::Absent(key.to_string())),
        _ => {}
    }

    let list: Vec<String> = values.split(',').map(|v| v.trim().to_string()).collect();
    if list.iter().any(String::is_empty) {
        let (definition, condition) = error_context();
        return Err(FilterParseError::EmptyValue {
            definition,
            condition,
        });
    }

    Ok(if negated {
        Condition::NotIn(key.to_string(), list)
    } else {
        Condition::In(key.to_string(), list)
    })
}

impl FromStr for TagFilter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for TagFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.definition)
    }
}
