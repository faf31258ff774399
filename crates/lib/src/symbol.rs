//! Interned symbols for names in the build model.
//!
//! Every name that flows through the model — targets, rules, properties —
//! is interned into a process-wide arena and handled as a [`Symbol`], a
//! cheap `Copy` index. Two symbols with equal content are the same handle,
//! so equality checks and map keys cost an integer compare instead of a
//! string compare.
//!
//! The arena is append-only and never frees entries; the name population is
//! bounded by script size, not by data volume. Symbol order is handle order:
//! stable and total, but arbitrary — use [`Symbol::as_str`] for display.

use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, RwLock};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A handle to an interned string.
///
/// Obtained via [`Symbol::intern`]; identity equality is content equality.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

struct Arena {
  /// Leaked strings indexed by handle. Entries live for the process.
  entries: Vec<&'static str>,
  lookup: HashMap<&'static str, u32>,
}

static ARENA: OnceLock<RwLock<Arena>> = OnceLock::new();

fn arena() -> &'static RwLock<Arena> {
  ARENA.get_or_init(|| {
    RwLock::new(Arena {
      entries: Vec::new(),
      lookup: HashMap::new(),
    })
  })
}

impl Symbol {
  /// Intern `content`, returning a handle equal to any handle previously
  /// returned for byte-identical content.
  ///
  /// Safe to call from concurrent worker threads: the common case is a
  /// read-locked lookup, and racing inserts of the same new string are
  /// serialized on the write lock and re-checked under it, so exactly one
  /// entry wins and both callers receive the same handle.
  pub fn intern(content: &str) -> Symbol {
    {
      let arena = arena().read().expect("symbol arena poisoned");
      if let Some(&idx) = arena.lookup.get(content) {
        return Symbol(idx);
      }
    }

    let mut arena = arena().write().expect("symbol arena poisoned");
    // Re-check: another thread may have inserted between the locks.
    if let Some(&idx) = arena.lookup.get(content) {
      return Symbol(idx);
    }

    let leaked: &'static str = Box::leak(content.to_owned().into_boxed_str());
    let idx = u32::try_from(arena.entries.len()).expect("symbol arena overflow");
    arena.entries.push(leaked);
    arena.lookup.insert(leaked, idx);
    Symbol(idx)
  }

  /// The interned content.
  pub fn as_str(self) -> &'static str {
    arena().read().expect("symbol arena poisoned").entries[self.0 as usize]
  }
}

impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl fmt::Debug for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Symbol({:?})", self.as_str())
  }
}

impl From<&str> for Symbol {
  fn from(content: &str) -> Symbol {
    Symbol::intern(content)
  }
}

// Handles are process-local, so the cache blob stores the content and
// re-interns on load.
impl Serialize for Symbol {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

impl<'de> Deserialize<'de> for Symbol {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Symbol, D::Error> {
    struct SymbolVisitor;

    impl Visitor<'_> for SymbolVisitor {
      type Value = Symbol;

      fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an interned symbol string")
      }

      fn visit_str<E: de::Error>(self, value: &str) -> Result<Symbol, E> {
        Ok(Symbol::intern(value))
      }
    }

    deserializer.deserialize_str(SymbolVisitor)
  }
}
