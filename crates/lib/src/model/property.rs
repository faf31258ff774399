//! The model's property set.
//!
//! Properties are name → value pairs with a "hard" flag: a hard property
//! was forced by the user (command line or `build.properties`) and is never
//! overwritten by script-derived defaults; a non-hard property may be
//! replaced by either a later derivation or a hard set.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::symbol::Symbol;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PropertyValue {
  value: Symbol,
  hard: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySet {
  entries: BTreeMap<Symbol, PropertyValue>,
}

impl PropertySet {
  /// Set a property. A non-hard set never overwrites a hard value.
  /// Returns whether the set changed anything.
  pub fn set(&mut self, name: Symbol, value: Symbol, hard: bool) -> bool {
    match self.entries.get(&name) {
      Some(existing) if existing.hard && !hard => false,
      Some(existing) if existing.value == value && existing.hard == hard => false,
      _ => {
        self.entries.insert(name, PropertyValue { value, hard });
        true
      }
    }
  }

  /// Clear a property. A non-hard clear leaves a hard value in place.
  /// Returns whether anything was removed.
  pub fn clear(&mut self, name: Symbol, hard: bool) -> bool {
    match self.entries.get(&name) {
      Some(existing) if existing.hard && !hard => false,
      Some(_) => {
        self.entries.remove(&name);
        true
      }
      None => false,
    }
  }

  pub fn get(&self, name: Symbol) -> Option<Symbol> {
    self.entries.get(&name).map(|p| p.value)
  }

  pub fn is_hard(&self, name: Symbol) -> bool {
    self.entries.get(&name).is_some_and(|p| p.hard)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// Parse a `build.properties` file: one `key=value` per line, `#` comments
/// and blank lines ignored. Lines without `=` are skipped.
pub fn read_properties_file(path: &Path) -> std::io::Result<Vec<(String, String)>> {
  let content = std::fs::read_to_string(path)?;
  let mut pairs = Vec::new();
  for line in content.lines() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }
    if let Some((key, value)) = line.split_once('=') {
      pairs.push((key.trim().to_string(), value.trim().to_string()));
    }
  }
  Ok(pairs)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sym(s: &str) -> Symbol {
    Symbol::intern(s)
  }

  #[test]
  fn hard_survives_soft_set() {
    let mut props = PropertySet::default();
    assert!(props.set(sym("opt"), sym("2"), true));
    assert!(!props.set(sym("opt"), sym("0"), false));
    assert_eq!(props.get(sym("opt")), Some(sym("2")));
    assert!(props.is_hard(sym("opt")));
  }

  #[test]
  fn hard_overwrites_soft() {
    let mut props = PropertySet::default();
    props.set(sym("cc"), sym("gcc"), false);
    assert!(props.set(sym("cc"), sym("clang"), true));
    assert_eq!(props.get(sym("cc")), Some(sym("clang")));
  }

  #[test]
  fn soft_replaces_soft() {
    let mut props = PropertySet::default();
    props.set(sym("mode"), sym("debug"), false);
    assert!(props.set(sym("mode"), sym("release"), false));
    assert_eq!(props.get(sym("mode")), Some(sym("release")));
  }

  #[test]
  fn soft_clear_leaves_hard() {
    let mut props = PropertySet::default();
    props.set(sym("jobs"), sym("4"), true);
    assert!(!props.clear(sym("jobs"), false));
    assert_eq!(props.get(sym("jobs")), Some(sym("4")));

    assert!(props.clear(sym("jobs"), true));
    assert_eq!(props.get(sym("jobs")), None);
  }

  #[test]
  fn redundant_set_reports_unchanged() {
    let mut props = PropertySet::default();
    props.set(sym("x"), sym("1"), false);
    assert!(!props.set(sym("x"), sym("1"), false));
  }

  #[test]
  fn properties_file_parsing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("build.properties");
    std::fs::write(&path, "# overrides\ncc = clang\n\nmode=release\nnot a pair\n").unwrap();

    let pairs = read_properties_file(&path).unwrap();
    assert_eq!(
      pairs,
      vec![
        ("cc".to_string(), "clang".to_string()),
        ("mode".to_string(), "release".to_string()),
      ]
    );
  }
}
