//! Queue of jobs with dependencies between them.
//!
//! Despite the name, the queue enforces no total order on its tasks beyond
//! this: jobs are handed out in the order in which they became runnable.
//! That gives a fair, breadth-first-ish drain without an up-front
//! topological sort, and it keeps the structure usable for graphs that grow
//! while they are being drained — new jobs and new wait edges may be added
//! at any point.
//!
//! Jobs live in an internal slab arena; the wait-set and used-by edges are
//! arena indices, so completing a job is an O(1) slot free with no dangling
//! references. The queue performs no cycle detection: a cycle shows up as
//! jobs that never become runnable while `len() > 0` and `has_runnable()`
//! is false, and the owning component is expected to detect that
//! starvation and report it rather than hang.
//!
//! The queue is not internally synchronized. The caller owns the mutation
//! boundary; see the executor, which confines all queue access to a single
//! coordinating flow.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

struct Job<T> {
  task: T,
  /// Slots this job is still waiting on. Empty means runnable (or running).
  waits_on: HashSet<usize>,
  /// Slots that wait on this job.
  used_by: Vec<usize>,
}

/// A dependency-ordered job queue over task identities of type `T`.
pub struct DependencyQueue<T> {
  slots: Vec<Option<Job<T>>>,
  free: Vec<usize>,
  index: HashMap<T, usize>,
  /// Slots whose wait-set is empty, in the order they became runnable.
  runnable: VecDeque<usize>,
}

impl<T> Default for DependencyQueue<T>
where
  T: Copy + Eq + Hash + fmt::Debug,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<T> DependencyQueue<T>
where
  T: Copy + Eq + Hash + fmt::Debug,
{
  pub fn new() -> Self {
    Self {
      slots: Vec::new(),
      free: Vec::new(),
      index: HashMap::new(),
      runnable: VecDeque::new(),
    }
  }

  fn slot_of(&self, task: T) -> Option<usize> {
    self.index.get(&task).copied()
  }

  fn job(&self, slot: usize) -> &Job<T> {
    self.slots[slot].as_ref().expect("stale job slot")
  }

  fn job_mut(&mut self, slot: usize) -> &mut Job<T> {
    self.slots[slot].as_mut().expect("stale job slot")
  }

  fn insert_job(&mut self, task: T) -> usize {
    let job = Job {
      task,
      waits_on: HashSet::new(),
      used_by: Vec::new(),
    };
    let slot = match self.free.pop() {
      Some(slot) => {
        self.slots[slot] = Some(job);
        slot
      }
      None => {
        self.slots.push(Some(job));
        self.slots.len() - 1
      }
    };
    self.index.insert(task, slot);
    slot
  }

  /// Add a job to the queue.
  ///
  /// `deps` is a set of previously queued task identities this job must
  /// wait for; with no deps the job is immediately runnable. Prerequisites
  /// must be queued before dependents — or queued dependency-free and wired
  /// up afterwards with [`add_dependency`](Self::add_dependency), which is
  /// how callers handle graphs whose edges are not known front-to-back.
  ///
  /// # Panics
  ///
  /// Panics if `task` is already queued, or if any dependency is not
  /// currently queued. Both are caller bugs, not recoverable conditions.
  pub fn queue_job(&mut self, task: T, deps: impl IntoIterator<Item = T>) {
    assert!(!self.index.contains_key(&task), "task {task:?} is already queued");

    let slot = self.insert_job(task);
    for dep in deps {
      let dep_slot = self
        .slot_of(dep)
        .unwrap_or_else(|| panic!("dependency {dep:?} of {task:?} is not queued"));
      self.job_mut(slot).waits_on.insert(dep_slot);
      self.job_mut(dep_slot).used_by.push(slot);
    }

    if self.job(slot).waits_on.is_empty() {
      self.runnable.push_back(slot);
    }
  }

  /// Add a wait edge after the fact: `from` will not run until `to` has
  /// completed. If `from` was already runnable it is pulled back out of the
  /// runnable set.
  ///
  /// # Panics
  ///
  /// Panics if either task is not currently queued.
  pub fn add_dependency(&mut self, from: T, to: T) {
    let from_slot = self
      .slot_of(from)
      .unwrap_or_else(|| panic!("task {from:?} is not queued"));
    let to_slot = self.slot_of(to).unwrap_or_else(|| panic!("task {to:?} is not queued"));

    if self.job(from_slot).waits_on.is_empty() {
      self.runnable.retain(|&slot| slot != from_slot);
    }
    self.job_mut(from_slot).waits_on.insert(to_slot);
    self.job_mut(to_slot).used_by.push(from_slot);
  }

  /// Remove and return one runnable job, in first-unblocked-first-out
  /// order. The job stays in the queue (it counts towards [`len`](Self::len))
  /// until [`job_completed`](Self::job_completed) is called for it.
  ///
  /// # Panics
  ///
  /// Panics if no job is runnable; check [`has_runnable`](Self::has_runnable)
  /// first.
  pub fn dequeue_job(&mut self) -> T {
    let slot = self.runnable.pop_front().expect("no runnable job to dequeue");
    self.job(slot).task
  }

  /// Notify the queue that a previously dequeued job has completed. Every
  /// job waiting on it is checked, and any whose wait-set becomes empty
  /// moves to the back of the runnable set. The completed job is removed
  /// from the queue.
  ///
  /// # Panics
  ///
  /// Panics if `task` is not in the queue or was never dequeued (it is
  /// still waiting or still runnable).
  pub fn job_completed(&mut self, task: T) {
    let slot = self
      .slot_of(task)
      .unwrap_or_else(|| panic!("completed task {task:?} is not queued"));
    assert!(
      self.job(slot).waits_on.is_empty() && !self.runnable.contains(&slot),
      "completed task {task:?} was never dequeued"
    );

    let job = self.slots[slot].take().expect("stale job slot");
    for user in job.used_by {
      // Duplicate edges leave repeated used_by entries; only the removal
      // that actually empties the wait-set makes the user runnable.
      if let Some(user_job) = self.slots[user].as_mut()
        && user_job.waits_on.remove(&slot)
        && user_job.waits_on.is_empty()
      {
        self.runnable.push_back(user);
      }
    }

    self.index.remove(&task);
    self.free.push(slot);
  }

  /// Whether the given task is currently in the queue (waiting, runnable,
  /// or dequeued-but-not-completed).
  pub fn is_queued(&self, task: T) -> bool {
    self.index.contains_key(&task)
  }

  pub fn is_empty(&self) -> bool {
    self.index.is_empty()
  }

  /// Total number of jobs in the queue, including dequeued jobs that have
  /// not yet been reported complete.
  pub fn len(&self) -> usize {
    self.index.len()
  }

  pub fn has_runnable(&self) -> bool {
    !self.runnable.is_empty()
  }

  pub fn runnable_count(&self) -> usize {
    self.runnable.len()
  }

  /// Iterate over every task still in the queue, in no particular order.
  /// Used by owners to report the stuck set when the queue starves.
  pub fn tasks(&self) -> impl Iterator<Item = T> + '_ {
    self.index.keys().copied()
  }
}
