//! Instruction templates with locale fallback.
//!
//! Each check ships a built-in list of templates. Configuration may supply
//! per-language lists; a template is looked up in the configured locale,
//! then in `en`, then in the built-in list. Templates use `{n}` positional
//! placeholders.

use std::collections::BTreeMap;

use crate::flag_builder::FlagError;

pub const DEFAULT_LOCALE: &str = "en";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instructions {
    fallback: Vec<String>,
    localized: BTreeMap<String, Vec<String>>,
    locale: String,
}

impl Instructions {
    #[must_use]
    pub fn new(fallback: &[&str]) -> Self {
        Self {
            fallback: fallback.iter().map(ToString::to_string).collect(),
            localized: BTreeMap::new(),
            locale: DEFAULT_LOCALE.to_string(),
        }
    }

    #[must_use]
    pub fn with_localized(mut self, localized: BTreeMap<String, Vec<String>>) -> Self {
        self.localized = localized;
        self
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Template at `index`, honouring the locale fallback chain.
    #[must_use]
    pub fn template(&self, index: usize) -> Option<&str> {
        [self.locale.as_str(), DEFAULT_LOCALE]
            .iter()
            .filter_map(|locale| self.localized.get(*locale))
            .find_map(|list| list.get(index))
            .or_else(|| self.fallback.get(index))
            .map(String::as_str)
    }

    /// Renders template `index` with positional `args`.
    ///
    /// # Errors
    ///
    /// * [`FlagError::TemplateOutOfRange`] if no list has `index`
    /// * [`FlagError::PlaceholderOutOfRange`] if the template references a
    ///   missing argument
    pub fn render(&self, index: usize, args: &[String]) -> Result<String, FlagError> {
        let template = self
            .template(index)
            .ok_or(FlagError::TemplateOutOfRange { index })?;
        render_template(template, args)
    }
}

/// Substitutes `{n}` placeholders. Braces not enclosing a number are copied
/// as is.
///
/// # Errors
///
/// * [`FlagError::PlaceholderOutOfRange`] if `n >= args.len()`
pub fn render_template(template: &str, args: &[String]) -> Result<String, FlagError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let placeholder = after
            .find('}')
            .and_then(|close| after[..close].parse::<usize>().ok().map(|n| (n, close)));

        match placeholder {
            Some((n, close)) => {
                let arg = args.get(n).ok_or(FlagError::PlaceholderOutOfRange {
                    placeholder: n,
                    available: args.len(),
                })?;
                out.push_str(arg);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn renders_positional_placeholders() {
        let rendered = render_template("{1} then {0} then {1}", &args(&["a", "b"])).unwrap();
        assert_eq!(rendered, "b then a then b");
    }

    #[test]
    fn non_numeric_braces_are_literal() {
        let rendered = render_template("{x} {0} {", &args(&["a"])).unwrap();
        assert_eq!(rendered, "{x} a {");
    }

    #[test]
    fn missing_argument_fails() {
        assert!(matches!(
            render_template("{2}", &args(&["a"])),
            Err(FlagError::PlaceholderOutOfRange {
                placeholder: 2,
                available: 1
            })
        ));
    }

    #[test]
    fn locale_falls_back_to_english_then_builtin() {
        let localized = BTreeMap::from([
            ("fr".to_string(), vec!["Route {0}".to_string()]),
            (
                "en".to_string(),
                vec!["Road {0}".to_string(), "Second {0}".to_string()],
            ),
        ]);
        let instructions = Instructions::new(&["Built-in {0}", "Built-in two", "Built-in three"])
            .with_localized(localized)
            .with_locale("fr");

        assert_eq!(instructions.template(0), Some("Route {0}"));
        assert_eq!(instructions.template(1), Some("Second {0}"));
        assert_eq!(instructions.template(2), Some("Built-in three"));
        assert_eq!(instructions.template(3), None);
        assert!(matches!(
            instructions.render(3, &[]),
            Err(FlagError::TemplateOutOfRange { index: 3 })
        ));
    }
}
