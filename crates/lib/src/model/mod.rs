//! The build model: rules, targets and properties, from parse to job graph.
//!
//! The model goes through a two-phase lifecycle. Parsing ingests build
//! script declarations in symbolic form — declaration order across files is
//! meaningless, so nothing is checked yet. [`BuildModel::resolve`] is the
//! single deferred pass that binds every rule name and dependency name to a
//! concrete entry, diagnosing all unresolvable references at once.
//!
//! [`BuildModel::ensure_up_to_date`] keeps the *model itself* incremental:
//! persisted script fingerprints are compared against the filesystem and
//! only changed files are re-parsed. This is distinct from the staleness of
//! build outputs, which [`BuildModel::queue_target`] computes when it
//! materializes the job graph.

pub mod cache;
pub mod discover;
pub mod expand;
pub mod fingerprint;
pub mod property;
pub mod rule;
pub mod target;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{BUILD_FILENAME, CACHE_DIR, MODEL_FORMAT_VERSION};
use crate::queue::DependencyQueue;
use crate::script::{self, ScriptDecls, ScriptError};
use crate::symbol::Symbol;

use expand::{ExpandError, ExpandScope, expand, has_placeholder};
use fingerprint::Fingerprint;
use property::PropertySet;
use rule::Rule;
use target::{Target, TargetState};

/// One schedulable unit of work for a target.
///
/// Configuration (deriving a target's full dependency set) is a distinct
/// job type rather than a side effect of queueing: it runs inside the
/// executor's coordinating flow, where model mutation is safe, and it may
/// grow the job graph mid-drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildJob {
  /// Derive the target's remaining dependencies.
  Configure(Symbol),
  /// Run the target's build action.
  Run(Symbol),
}

/// The queue type the model materializes jobs into.
pub type BuildQueue = DependencyQueue<BuildJob>;

/// A parsed script plus the fingerprint it was parsed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRecord {
  pub fingerprint: Fingerprint,
  pub decls: ScriptDecls,
}

/// One unresolvable reference or conflicting declaration, with the script
/// it came from.
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("{}: target '{}' uses unknown rule '{}'", .script.display(), .target, .rule)]
  UnknownRule {
    script: PathBuf,
    target: Symbol,
    rule: Symbol,
  },

  #[error("{}: target '{}' depends on undefined target '{}'", .script.display(), .target, .dependency)]
  UnknownDependency {
    script: PathBuf,
    target: Symbol,
    dependency: Symbol,
  },

  #[error("{}: duplicate definition of target '{}'", .script.display(), .target)]
  DuplicateTarget { script: PathBuf, target: Symbol },

  #[error("{}: duplicate definition of rule '{}'", .script.display(), .rule)]
  DuplicateRule { script: PathBuf, rule: Symbol },

  #[error("{}: copy target '{}' needs exactly one source, has {}", .script.display(), .target, .count)]
  CopySourceCount {
    script: PathBuf,
    target: Symbol,
    count: usize,
  },
}

#[derive(Debug, Error)]
pub enum ModelError {
  #[error(transparent)]
  Script(#[from] ScriptError),

  /// Resolution failed; every diagnosed reference is listed.
  #[error("build model does not resolve ({} errors)", .errors.len())]
  Resolve { errors: Vec<ResolveError> },

  #[error("cannot scan source tree: {0}")]
  Walk(#[from] walkdir::Error),
}

/// Outcome of a [`BuildModel::ensure_up_to_date`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnsureReport {
  /// Scripts parsed this pass (new or changed).
  pub parsed: usize,
  /// Script records dropped because the file is gone.
  pub removed: usize,
}

impl EnsureReport {
  pub fn changed(&self) -> bool {
    self.parsed > 0 || self.removed > 0
  }
}

/// Error from the configure step of a single target.
#[derive(Debug, Error)]
pub enum ConfigureError {
  #[error(transparent)]
  Expand(#[from] ExpandError),

  #[error("target '{target}' depends on undefined target '{dependency}' after configuration")]
  UnknownDependency { target: Symbol, dependency: Symbol },
}

/// The aggregate owning rules, targets, properties and parsed scripts.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildModel {
  format: u32,
  source_root: PathBuf,
  build_root: PathBuf,
  scripts: BTreeMap<PathBuf, ScriptRecord>,
  rules: BTreeMap<Symbol, Rule>,
  targets: BTreeMap<Symbol, Target>,
  properties: PropertySet,

  #[serde(skip)]
  dirty: bool,
  #[serde(skip)]
  cache_path: Option<PathBuf>,
}

impl BuildModel {
  /// An empty model for the given roots. In-tree builds pass the same path
  /// for both.
  pub fn new(source_root: PathBuf, build_root: PathBuf) -> BuildModel {
    BuildModel {
      format: MODEL_FORMAT_VERSION,
      source_root,
      build_root,
      scripts: BTreeMap::new(),
      rules: Rule::builtins().into_iter().collect(),
      targets: BTreeMap::new(),
      properties: PropertySet::default(),
      dirty: true,
      cache_path: None,
    }
  }

  pub fn source_root(&self) -> &Path {
    &self.source_root
  }

  pub fn build_root(&self) -> &Path {
    &self.build_root
  }

  pub fn target(&self, name: Symbol) -> Option<&Target> {
    self.targets.get(&name)
  }

  pub fn has_target(&self, name: &str) -> bool {
    self.targets.contains_key(&Symbol::intern(name))
  }

  pub fn rule_of(&self, target: &Target) -> &Rule {
    &self.rules[&target.rule]
  }

  pub fn properties(&self) -> &PropertySet {
    &self.properties
  }

  pub fn property(&self, name: &str) -> Option<Symbol> {
    self.properties.get(Symbol::intern(name))
  }

  /// A source path, relative to the source root.
  pub fn src_path(&self, rel: &str) -> PathBuf {
    self.source_root.join(rel)
  }

  /// An output path, relative to the build root.
  pub fn out_path(&self, rel: &str) -> PathBuf {
    self.build_root.join(rel)
  }

  /// The resolved prerequisites of a target. Empty for unknown names.
  pub fn prereqs(&self, name: Symbol) -> Vec<Symbol> {
    self.targets.get(&name).map(|t| t.deps.clone()).unwrap_or_default()
  }

  pub fn target_state(&self, name: Symbol) -> TargetState {
    self.targets.get(&name).map(|t| t.state).unwrap_or_default()
  }

  pub fn set_target_state(&mut self, name: Symbol, state: TargetState) {
    if let Some(target) = self.targets.get_mut(&name) {
      target.state = state;
    }
  }

  /************* Initialization and parsing *************/

  /// Parse one build script file into the model, in unresolved form.
  /// May be called any number of times across files; forward references
  /// are legal until [`resolve`](Self::resolve) runs.
  pub fn parse_build(&mut self, path: &Path) -> Result<(), ModelError> {
    let decls = script::evaluate_script(path)?;
    let fingerprint = Fingerprint::capture(path).map_err(|source| ScriptError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    self.scripts.insert(path.to_path_buf(), ScriptRecord { fingerprint, decls });
    self.dirty = true;
    Ok(())
  }

  /// Set a property. Hard properties are user-forced inputs that
  /// script-derived defaults never overwrite.
  pub fn set_property(&mut self, name: &str, value: &str, hard: bool) {
    if self.properties.set(Symbol::intern(name), Symbol::intern(value), hard) {
      self.dirty = true;
    }
  }

  /// Clear a property. A non-hard clear leaves a hard value in place.
  pub fn clear_property(&mut self, name: &str, hard: bool) {
    if self.properties.clear(Symbol::intern(name), hard) {
      self.dirty = true;
    }
  }

  /// Bind every symbolic reference to a concrete rule or target.
  ///
  /// Rebuilds the rule and target dictionaries from the accumulated script
  /// declarations, then checks every rule binding and every literal
  /// dependency name. Dependency entries containing `${...}` defer to the
  /// configure step instead of binding here.
  ///
  /// # Errors
  ///
  /// [`ModelError::Resolve`] listing *all* diagnosed references — this is
  /// the only place "undefined reference" is reported, deliberately
  /// deferred because declaration order across files carries no meaning.
  pub fn resolve(&mut self) -> Result<(), ModelError> {
    let mut errors = Vec::new();
    let mut rules: BTreeMap<Symbol, Rule> = Rule::builtins().into_iter().collect();
    let mut targets: BTreeMap<Symbol, Target> = BTreeMap::new();
    let mut raw_deps: Vec<(Symbol, String)> = Vec::new();

    for (script_path, record) in &self.scripts {
      for decl in &record.decls.rules {
        let name = Symbol::intern(&decl.name);
        if rules.contains_key(&name) {
          errors.push(ResolveError::DuplicateRule {
            script: script_path.clone(),
            rule: name,
          });
          continue;
        }
        rules.insert(
          name,
          Rule::Command {
            command: decl.command.clone(),
            description: decl.description.clone(),
          },
        );
      }

      for decl in &record.decls.targets {
        let name = Symbol::intern(&decl.name);
        if targets.contains_key(&name) {
          errors.push(ResolveError::DuplicateTarget {
            script: script_path.clone(),
            target: name,
          });
          continue;
        }
        for dep in &decl.deps {
          raw_deps.push((name, dep.clone()));
        }
        targets.insert(
          name,
          Target {
            name,
            rule: Symbol::intern(&decl.rule),
            srcs: decl.srcs.clone(),
            deps: Vec::new(),
            deferred_deps: Vec::new(),
            outputs: decl.outputs.clone(),
            configured: false,
            script: script_path.clone(),
            state: TargetState::Unknown,
          },
        );
      }
    }

    // Bind dependency names. Placeholder entries stay symbolic until the
    // configure step expands them against the final property set.
    let known: BTreeSet<Symbol> = targets.keys().copied().collect();
    for (target_name, dep) in raw_deps {
      let target = targets.get_mut(&target_name).expect("dep of undeclared target");
      if has_placeholder(&dep) {
        target.deferred_deps.push(dep);
      } else {
        let dep_sym = Symbol::intern(&dep);
        if known.contains(&dep_sym) {
          target.deps.push(dep_sym);
        } else {
          errors.push(ResolveError::UnknownDependency {
            script: target.script.clone(),
            target: target_name,
            dependency: dep_sym,
          });
        }
      }
    }

    // Bind rules and validate per-rule shape.
    for target in targets.values_mut() {
      match rules.get(&target.rule) {
        None => errors.push(ResolveError::UnknownRule {
          script: target.script.clone(),
          target: target.name,
          rule: target.rule,
        }),
        Some(Rule::Copy) if target.srcs.len() != 1 => errors.push(ResolveError::CopySourceCount {
          script: target.script.clone(),
          target: target.name,
          count: target.srcs.len(),
        }),
        Some(_) => {}
      }
      target.configured = target.deferred_deps.is_empty();
    }

    if !errors.is_empty() {
      return Err(ModelError::Resolve { errors });
    }

    // Script property defaults never displace user-forced values.
    for record in self.scripts.values() {
      for decl in &record.decls.properties {
        self
          .properties
          .set(Symbol::intern(&decl.name), Symbol::intern(&decl.value), false);
      }
    }

    info!(targets = targets.len(), rules = rules.len(), "model resolved");
    self.rules = rules;
    self.targets = targets;
    self.dirty = true;
    Ok(())
  }

  /// Check the model itself for up-to-dateness: re-parse any new or
  /// modified scripts, drop records for deleted ones, and re-resolve if
  /// anything changed. A second call with no filesystem changes in between
  /// parses nothing.
  pub fn ensure_up_to_date(&mut self) -> Result<EnsureReport, ModelError> {
    let mut report = EnsureReport::default();

    let mut found: BTreeSet<PathBuf> = BTreeSet::new();
    let walker = walkdir::WalkDir::new(&self.source_root)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(|e| e.file_name() != CACHE_DIR);
    for entry in walker {
      let entry = entry?;
      if entry.file_type().is_file() && entry.file_name() == BUILD_FILENAME {
        found.insert(entry.path().to_path_buf());
      }
    }

    for path in &found {
      let fresh = match self.scripts.get(path) {
        None => true,
        Some(record) => !record.fingerprint.matches(path),
      };
      if fresh {
        debug!(script = %path.display(), "re-parsing changed script");
        self.parse_build(path)?;
        report.parsed += 1;
      }
    }

    let gone: Vec<PathBuf> = self.scripts.keys().filter(|p| !found.contains(*p)).cloned().collect();
    for path in gone {
      debug!(script = %path.display(), "dropping deleted script");
      self.scripts.remove(&path);
      report.removed += 1;
    }

    if report.changed() {
      self.resolve()?;
    }

    Ok(report)
  }

  /******************** Operation ***********************/

  /// Queue the given target and its not-up-to-date transitive closure into
  /// `queue`. Targets still requiring configuration get a distinct
  /// `Configure` job their `Run` job waits on. Returns whether the target
  /// is at least conditionally buildable — `false` means the name is
  /// unknown and the queue was left untouched.
  pub fn queue_target(&mut self, queue: &mut BuildQueue, name: &str) -> bool {
    let goal = Symbol::intern(name);
    if !self.targets.contains_key(&goal) {
      return false;
    }
    self.queue_closure(queue, goal);
    true
  }

  /// Queue the closure rooted at `goal`, skipping up-to-date targets and
  /// targets already in the queue. Wait edges are installed after all
  /// members are queued, so a dependency cycle simply leaves its jobs
  /// blocked for the executor's starvation detection.
  fn queue_closure(&mut self, queue: &mut BuildQueue, goal: Symbol) {
    let mut visited: HashSet<Symbol> = HashSet::new();
    let mut needed: Vec<Symbol> = Vec::new();
    let mut stack = vec![goal];

    while let Some(name) = stack.pop() {
      if !visited.insert(name) || queue.is_queued(BuildJob::Run(name)) {
        continue;
      }
      if self.compute_state(name) == TargetState::UpToDate {
        self.set_target_state(name, TargetState::UpToDate);
        debug!(target = %name, "up to date");
        continue;
      }
      self.set_target_state(name, TargetState::Stale);
      needed.push(name);
      stack.extend(self.prereqs(name));
    }

    for &name in &needed {
      queue.queue_job(BuildJob::Run(name), []);
      if self.targets[&name].needs_configure() {
        queue.queue_job(BuildJob::Configure(name), []);
        queue.add_dependency(BuildJob::Run(name), BuildJob::Configure(name));
      }
    }

    for &name in &needed {
      for dep in self.prereqs(name) {
        if queue.is_queued(BuildJob::Run(dep)) {
          queue.add_dependency(BuildJob::Run(name), BuildJob::Run(dep));
        }
      }
    }

    debug!(goal = %goal, queued = needed.len(), "queued target closure");
  }

  /// Run the configure step for one target: expand its deferred dependency
  /// templates against the property set, bind them, and queue any newly
  /// discovered subgraphs with late wait edges.
  ///
  /// Must only be called from the executor's coordinating flow — it
  /// mutates both the model and the queue.
  ///
  /// # Errors
  ///
  /// Expansion failures and unknown expanded names leave the target
  /// unbuildable; the caller fails the corresponding `Run` job.
  pub fn configure_target(&mut self, queue: &mut BuildQueue, name: Symbol) -> Result<(), ConfigureError> {
    let templates = match self.targets.get(&name) {
      Some(t) => t.deferred_deps.clone(),
      None => Vec::new(),
    };

    let mut expanded_deps = Vec::new();
    for template in &templates {
      let expanded = expand(template, &self.properties, &ExpandScope::default())?;
      let dep = Symbol::intern(&expanded);
      if !self.targets.contains_key(&dep) {
        return Err(ConfigureError::UnknownDependency {
          target: name,
          dependency: dep,
        });
      }
      expanded_deps.push(dep);
    }

    if let Some(target) = self.targets.get_mut(&name) {
      target.deferred_deps.clear();
      target.deps.extend(expanded_deps.iter().copied());
      target.configured = true;
    }
    self.dirty = true;

    for dep in expanded_deps {
      debug!(target = %name, dep = %dep, "configuration discovered dependency");
      if !queue.is_queued(BuildJob::Run(dep)) {
        self.queue_closure(queue, dep);
      }
      if queue.is_queued(BuildJob::Run(dep)) {
        queue.add_dependency(BuildJob::Run(name), BuildJob::Run(dep));
      }
    }

    Ok(())
  }

  /// Compute whether a target's outputs are current on disk. Phony and
  /// unconfigured targets are always stale; file-producing targets are up
  /// to date when every output exists and none is older than any input.
  fn compute_state(&self, name: Symbol) -> TargetState {
    let target = &self.targets[&name];
    if target.needs_configure() {
      return TargetState::Stale;
    }
    let rule = &self.rules[&target.rule];
    if !rule.produces_output() {
      return TargetState::Stale;
    }

    let mut newest_input: Option<SystemTime> = None;
    for src in &target.srcs {
      match mtime(&self.src_path(src)) {
        Some(t) => newest_input = Some(newest_input.map_or(t, |n| n.max(t))),
        None => return TargetState::Stale,
      }
    }
    for dep in &target.deps {
      let dep_target = &self.targets[dep];
      if !self.rules[&dep_target.rule].produces_output() {
        // A phony prerequisite has no timestamp to compare against.
        return TargetState::Stale;
      }
      for out in dep_target.effective_outputs() {
        match mtime(&self.out_path(out)) {
          Some(t) => newest_input = Some(newest_input.map_or(t, |n| n.max(t))),
          None => return TargetState::Stale,
        }
      }
    }

    for out in target.effective_outputs() {
      match mtime(&self.out_path(out)) {
        Some(out_time) => {
          if newest_input.is_some_and(|input| input > out_time) {
            return TargetState::Stale;
          }
        }
        None => return TargetState::Stale,
      }
    }

    TargetState::UpToDate
  }
}

/// Modification time, with any probe failure reading as "does not exist".
fn mtime(path: &Path) -> Option<SystemTime> {
  std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
