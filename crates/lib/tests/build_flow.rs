//! End-to-end flows through parse, resolve, cache, queueing and execution.

use std::fs;
use std::path::PathBuf;

use tempfile::tempdir;

use rafter_lib::exec::{BuildExecutor, ExecError, ExecuteConfig};
use rafter_lib::model::{BuildModel, BuildQueue};
use rafter_lib::symbol::Symbol;

fn setup(script: &str) -> (tempfile::TempDir, PathBuf, BuildModel) {
  let dir = tempdir().unwrap();
  let root = dunce::canonicalize(dir.path()).unwrap();
  fs::write(root.join("BUILD"), script).unwrap();

  let mut model = BuildModel::new(root.clone(), root.clone());
  model.ensure_up_to_date().unwrap();
  (dir, root, model)
}

async fn build(model: &mut BuildModel, goal: &str) -> Result<rafter_lib::exec::BuildOutcome, ExecError> {
  let mut queue = BuildQueue::new();
  assert!(model.queue_target(&mut queue, goal), "goal {goal} not found");
  BuildExecutor::new(ExecuteConfig::default()).execute(model, &mut queue).await
}

#[tokio::test]
async fn dependent_target_builds_after_prerequisite() {
  let (_dir, _root, mut model) = setup(
    r#"
      target { name = "a", rule = "phony" }
      target { name = "b", rule = "phony", deps = { "a" } }
    "#,
  );

  let mut queue = BuildQueue::new();
  assert!(model.queue_target(&mut queue, "b"));
  assert_eq!(queue.len(), 2);

  let outcome = BuildExecutor::new(ExecuteConfig::default())
    .execute(&mut model, &mut queue)
    .await
    .unwrap();

  assert!(outcome.is_success());
  assert_eq!(outcome.built, vec![Symbol::intern("a"), Symbol::intern("b")]);
}

#[tokio::test]
async fn dependency_cycle_is_an_error_not_a_hang() {
  let (_dir, _root, mut model) = setup(
    r#"
      target { name = "c", rule = "phony", deps = { "d" } }
      target { name = "d", rule = "phony", deps = { "c" } }
    "#,
  );

  let err = build(&mut model, "c").await.unwrap_err();
  match err {
    ExecError::DependencyCycle { stuck } => {
      assert!(stuck.contains(&"c".to_string()));
      assert!(stuck.contains(&"d".to_string()));
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[tokio::test]
async fn unknown_goal_reports_without_touching_queue() {
  let (_dir, _root, mut model) = setup(r#"target { name = "all", rule = "phony" }"#);

  let mut queue = BuildQueue::new();
  assert!(!model.queue_target(&mut queue, "clean"));
  assert!(queue.is_empty());
}

#[tokio::test]
async fn hard_property_beats_script_default_through_resolve() {
  let dir = tempdir().unwrap();
  let root = dunce::canonicalize(dir.path()).unwrap();
  fs::write(root.join("BUILD"), r#"property("foo", "script-default")"#).unwrap();

  let mut model = BuildModel::new(root.clone(), root.clone());
  // -Dfoo=1 arrives before the scripts are read.
  model.set_property("foo", "1", true);
  model.ensure_up_to_date().unwrap();

  assert_eq!(model.property("foo"), Some(Symbol::intern("1")));
}

#[tokio::test]
async fn full_pipeline_with_copy_and_command_rules() {
  let (_dir, root, mut model) = setup(
    r#"
      rule { name = "concat", command = "cat ${srcs} > ${outs}" }

      target { name = "staged.txt", rule = "copy", srcs = { "input.txt" } }
      target {
        name = "final.txt",
        rule = "concat",
        srcs = { "input.txt" },
        deps = { "staged.txt" },
      }
      target { name = "all", rule = "phony", deps = { "final.txt" } }
    "#,
  );
  fs::write(root.join("input.txt"), "hello\n").unwrap();

  let outcome = build(&mut model, "all").await.unwrap();
  assert!(outcome.is_success());
  assert_eq!(fs::read_to_string(root.join("staged.txt")).unwrap(), "hello\n");
  assert_eq!(fs::read_to_string(root.join("final.txt")).unwrap(), "hello\n");

  // Everything is now current: re-queueing the goal adds nothing.
  let mut queue = BuildQueue::new();
  assert!(model.queue_target(&mut queue, "final.txt"));
  assert!(queue.is_empty());
}

#[tokio::test]
async fn touching_a_source_makes_downstream_stale_again() {
  let (_dir, root, mut model) = setup(
    r#"
      target { name = "out.txt", rule = "copy", srcs = { "in.txt" } }
    "#,
  );
  fs::write(root.join("in.txt"), "v1").unwrap();

  let outcome = build(&mut model, "out.txt").await.unwrap();
  assert!(outcome.is_success());

  // Make the source strictly newer than the output.
  std::thread::sleep(std::time::Duration::from_millis(20));
  fs::write(root.join("in.txt"), "v2 with more bytes").unwrap();

  let outcome = build(&mut model, "out.txt").await.unwrap();
  assert!(outcome.is_success());
  assert_eq!(fs::read_to_string(root.join("out.txt")).unwrap(), "v2 with more bytes");
}

#[tokio::test]
async fn cached_model_round_trips_and_stays_incremental() {
  let (_dir, root, mut model) = setup(
    r#"
      rule { name = "emit", command = "echo x > ${outs}" }
      target { name = "thing.txt", rule = "emit" }
      property("mode", "fast")
    "#,
  );

  let cache = root.join(".build/model");
  model.save_to(&cache).unwrap();
  assert!(!model.is_dirty());

  // Next invocation: load instead of re-parsing.
  let mut reloaded = BuildModel::load(&cache).unwrap();
  assert_eq!(reloaded, model);
  assert!(!reloaded.is_dirty());
  assert_eq!(reloaded.property("mode"), Some(Symbol::intern("fast")));

  // Staleness check against an unchanged tree re-parses nothing.
  let report = reloaded.ensure_up_to_date().unwrap();
  assert_eq!(report.parsed, 0);

  let outcome = build(&mut reloaded, "thing.txt").await.unwrap();
  assert!(outcome.is_success());
  assert!(root.join("thing.txt").exists());
}

#[tokio::test]
async fn goals_across_multiple_scripts_share_one_graph() {
  let dir = tempdir().unwrap();
  let root = dunce::canonicalize(dir.path()).unwrap();
  fs::write(
    root.join("BUILD"),
    r#"target { name = "app", rule = "phony", deps = { "lib/core" } }"#,
  )
  .unwrap();
  fs::create_dir(root.join("lib")).unwrap();
  fs::write(root.join("lib/BUILD"), r#"target { name = "lib/core", rule = "phony" }"#).unwrap();

  let mut model = BuildModel::new(root.clone(), root.clone());
  model.ensure_up_to_date().unwrap();

  let mut queue = BuildQueue::new();
  assert!(model.queue_target(&mut queue, "app"));
  assert!(model.queue_target(&mut queue, "lib/core"));
  // The shared prerequisite is queued once.
  assert_eq!(queue.len(), 2);

  let outcome = BuildExecutor::new(ExecuteConfig::default())
    .execute(&mut model, &mut queue)
    .await
    .unwrap();
  assert!(outcome.is_success());
  assert_eq!(outcome.built.len(), 2);
}

#[test]
fn discovery_walks_up_to_the_source_root() {
  use rafter_lib::model::discover::{Discovered, discover_root};

  let dir = tempdir().unwrap();
  let root = dunce::canonicalize(dir.path()).unwrap();
  fs::write(root.join("BUILD"), "").unwrap();
  fs::create_dir_all(root.join("src/nested")).unwrap();

  let found = discover_root(&root.join("src/nested")).unwrap();
  assert_eq!(found, Discovered::SourceRoot(root));
}

#[test]
fn discovery_prefers_existing_cache() {
  use rafter_lib::model::discover::{Discovered, discover_root};

  let dir = tempdir().unwrap();
  let root = dunce::canonicalize(dir.path()).unwrap();
  fs::write(root.join("BUILD"), "").unwrap();
  fs::create_dir_all(root.join(".build")).unwrap();
  fs::write(root.join(".build/model"), "{}").unwrap();

  match discover_root(&root).unwrap() {
    Discovered::CachedModel { model_file, .. } => {
      assert_eq!(model_file, root.join(".build").join("model"));
    }
    other => panic!("expected cached model, got {other:?}"),
  }
}
