//! Lifecycle tests against real git repositories.
//!
//! A `GitSandbox` maps `https://forge.test/<owner>/<repo>.git` onto local bare
//! repositories, so `reconcile` runs its real git commands end to end. The
//! fork API is replaced by one that bare-clones the upstream repository.

use forkflow::core::target::{AuthMode, TargetDescriptor};
use forkflow::error::ForkflowError;
use forkflow::io::git::{Git, RemoteAdd};
use forkflow::reconcile::{BranchAction, CheckoutAction, ReconcileSettings, reconcile};
use forkflow::test_support::{GitSandbox, SANDBOX_HOST, SandboxForkApi};

fn target() -> TargetDescriptor {
    TargetDescriptor::new(AuthMode::Https, SANDBOX_HOST, "alice", "widgets", "feat", "acme")
        .expect("target")
}

fn settings() -> ReconcileSettings {
    ReconcileSettings::default()
}

/// Full lifecycle:
/// 1. Fresh run from an empty directory: fork requested, cloned, branch created.
/// 2. Upstream moves ahead; rerun inside the checkout: no fork request, fork
///    synced, existing branch reused.
/// 3. Rerun from the parent directory: the existing clone is reused.
#[test]
fn fresh_run_then_reruns_converge() {
    let sandbox = GitSandbox::new().expect("sandbox");
    let upstream = sandbox.seed_remote("acme", "widgets").expect("seed upstream");
    let api = SandboxForkApi::new(&sandbox);
    let runner = sandbox.runner();

    let first = reconcile(&target(), &settings(), runner, &api, &sandbox.work_dir()).expect("first run");
    let checkout = sandbox.work_dir().join("widgets");
    assert_eq!(api.calls(), 1);
    assert!(!first.was_already_forked);
    assert_eq!(first.checkout, CheckoutAction::Cloned);
    assert_eq!(first.workdir, checkout);
    assert!(!first.synced);
    assert_eq!(first.branch_action, BranchAction::Created);

    assert_eq!(sandbox.git(&checkout, &["rev-parse", "--abbrev-ref", "HEAD"]).expect("head"), "feat");
    assert_eq!(
        sandbox.git(&checkout, &["config", "--get", "branch.feat.remote"]).expect("remote"),
        "origin"
    );
    assert_eq!(
        sandbox.git(&checkout, &["config", "--get", "remote.upstream.url"]).expect("upstream"),
        format!("https://{SANDBOX_HOST}/acme/widgets.git")
    );

    sandbox
        .push_commit(&upstream, "CHANGELOG.md", "v2\n", "upstream change")
        .expect("advance upstream");

    let second = reconcile(&target(), &settings(), runner, &api, &checkout).expect("second run");
    assert_eq!(api.calls(), 1, "existing fork must not be requested again");
    assert!(second.was_already_forked);
    assert_eq!(second.checkout, CheckoutAction::ReusedCurrent);
    assert_eq!(
        second.invocation_origin,
        Some(format!("https://{SANDBOX_HOST}/alice/widgets.git"))
    );
    assert_eq!(second.upstream_remote, RemoteAdd::AlreadyExists);
    assert!(second.synced);
    assert_eq!(second.main_branch, "main");
    assert_eq!(second.branch_action, BranchAction::SwitchedLocal);

    let fork = sandbox.remote_path("alice", "widgets");
    assert_eq!(
        sandbox.git(&fork, &["rev-parse", "main"]).expect("fork head"),
        sandbox.git(&upstream, &["rev-parse", "main"]).expect("upstream head"),
        "fork main should match upstream after sync"
    );
    let remotes = sandbox.git(&checkout, &["remote"]).expect("remotes");
    assert_eq!(remotes.lines().filter(|name| *name == "upstream").count(), 1);

    let third = reconcile(&target(), &settings(), runner, &api, &sandbox.work_dir()).expect("third run");
    assert_eq!(api.calls(), 1);
    assert_eq!(third.checkout, CheckoutAction::ReusedExisting);
    assert_eq!(third.workdir, checkout);
    assert_eq!(third.branch_action, BranchAction::SwitchedLocal);
}

/// Upstream and fork edit the same line: the sync merge is aborted, the clone
/// is left clean, and nothing is pushed to the fork.
#[test]
fn conflicting_sync_leaves_clean_checkout_and_untouched_fork() {
    let sandbox = GitSandbox::new().expect("sandbox");
    let upstream = sandbox.seed_remote("acme", "widgets").expect("seed upstream");
    let fork = sandbox
        .fork_remote(&upstream, "alice", "widgets")
        .expect("fork");
    sandbox
        .push_commit(&upstream, "README.md", "upstream wording\n", "upstream edit")
        .expect("upstream edit");
    sandbox
        .push_commit(&fork, "README.md", "fork wording\n", "fork edit")
        .expect("fork edit");
    let fork_head = sandbox.git(&fork, &["rev-parse", "main"]).expect("fork head");

    let api = SandboxForkApi::new(&sandbox);
    let runner = sandbox.runner();
    let err = reconcile(&target(), &settings(), runner, &api, &sandbox.work_dir()).unwrap_err();

    assert!(
        matches!(
            err.downcast_ref::<ForkflowError>(),
            Some(ForkflowError::MergeConflict { .. })
        ),
        "unexpected error: {err:#}"
    );
    assert_eq!(api.calls(), 0);

    let checkout = sandbox.work_dir().join("widgets");
    let git = Git::new(runner, &checkout);
    assert!(!git.merge_in_progress().expect("merge state"));
    assert!(!git.is_dirty().expect("status"));
    assert!(!git.branch_exists("feat").expect("branch"));
    assert_eq!(
        sandbox.git(&fork, &["rev-parse", "main"]).expect("fork head"),
        fork_head
    );
}
