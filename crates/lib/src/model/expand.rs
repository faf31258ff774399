//! `${...}` template expansion for commands and deferred dependencies.
//!
//! Templates reference properties by name plus the implicit `target`,
//! `srcs` and `outs` values supplied by the caller. `$$` produces a
//! literal `$`, so shell constructs like `$$PWD` pass through.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::model::property::PropertySet;
use crate::symbol::Symbol;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
  #[error("unclosed '${{' at position {0}")]
  Unclosed(usize),

  #[error("empty '${{}}' placeholder")]
  Empty,

  #[error("undefined property '{0}' in template")]
  Undefined(String),
}

/// Values available to a template beyond the property set.
#[derive(Debug, Default)]
pub struct ExpandScope {
  specials: BTreeMap<&'static str, String>,
}

impl ExpandScope {
  pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
    self.specials.insert(name, value.into());
    self
  }
}

/// Expand every placeholder in `template`.
///
/// # Errors
///
/// Fails on malformed placeholders and on names that are neither a scope
/// special nor a defined property.
pub fn expand(template: &str, properties: &PropertySet, scope: &ExpandScope) -> Result<String, ExpandError> {
  let mut out = String::with_capacity(template.len());
  let mut rest = template;
  let mut offset = 0;

  while let Some(pos) = rest.find('$') {
    out.push_str(&rest[..pos]);
    let after = &rest[pos + 1..];

    if let Some(tail) = after.strip_prefix('$') {
      out.push('$');
      offset += pos + 2;
      rest = tail;
    } else if let Some(body) = after.strip_prefix('{') {
      let Some(end) = body.find('}') else {
        return Err(ExpandError::Unclosed(offset + pos));
      };
      let name = &body[..end];
      if name.is_empty() {
        return Err(ExpandError::Empty);
      }
      out.push_str(&lookup(name, properties, scope)?);
      offset += pos + 2 + end + 1;
      rest = &body[end + 1..];
    } else {
      // Bare '$' (e.g. a shell variable): pass through unchanged.
      out.push('$');
      offset += pos + 1;
      rest = after;
    }
  }

  out.push_str(rest);
  Ok(out)
}

/// Whether a string contains any `${...}` placeholder (as opposed to bare
/// or escaped dollars).
pub fn has_placeholder(text: &str) -> bool {
  let mut rest = text;
  while let Some(pos) = rest.find('$') {
    let after = &rest[pos + 1..];
    if let Some(tail) = after.strip_prefix('$') {
      rest = tail;
    } else if after.starts_with('{') {
      return true;
    } else {
      rest = after;
    }
  }
  false
}

fn lookup(name: &str, properties: &PropertySet, scope: &ExpandScope) -> Result<String, ExpandError> {
  if let Some(value) = scope.specials.get(name) {
    return Ok(value.clone());
  }
  properties
    .get(Symbol::intern(name))
    .map(|v| v.as_str().to_string())
    .ok_or_else(|| ExpandError::Undefined(name.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn props(pairs: &[(&str, &str)]) -> PropertySet {
    let mut set = PropertySet::default();
    for (name, value) in pairs {
      set.set(Symbol::intern(name), Symbol::intern(value), false);
    }
    set
  }

  #[test]
  fn expands_properties() {
    let result = expand("${cc} -O${opt}", &props(&[("cc", "gcc"), ("opt", "2")]), &ExpandScope::default());
    assert_eq!(result.unwrap(), "gcc -O2");
  }

  #[test]
  fn scope_specials_win_over_properties() {
    let scope = ExpandScope::default().with("target", "hello.o");
    let result = expand("${target}", &props(&[("target", "shadowed")]), &scope);
    assert_eq!(result.unwrap(), "hello.o");
  }

  #[test]
  fn escaped_and_bare_dollars_pass_through() {
    let result = expand("echo $$HOME costs $5", &props(&[]), &ExpandScope::default());
    assert_eq!(result.unwrap(), "echo $HOME costs $5");
  }

  #[test]
  fn undefined_property_is_an_error() {
    let err = expand("${nope}", &props(&[]), &ExpandScope::default()).unwrap_err();
    assert_eq!(err, ExpandError::Undefined("nope".to_string()));
  }

  #[test]
  fn unclosed_placeholder_is_an_error() {
    let err = expand("cc ${src", &props(&[]), &ExpandScope::default()).unwrap_err();
    assert!(matches!(err, ExpandError::Unclosed(_)));
  }

  #[test]
  fn placeholder_detection() {
    assert!(has_placeholder("lib${variant}.a"));
    assert!(!has_placeholder("plain-name"));
    assert!(!has_placeholder("$$escaped and $BARE"));
  }
}
