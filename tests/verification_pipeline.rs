mod common;

use std::fs;
use std::path::Path;

use common::{fake_merge, fake_reconstruct, silent_reconstruct, Workspace};
use recon_harness::fixtures::LocalArchive;
use recon_harness::pipeline::{
    merge_outputs, merge_targets, reconstruct_outputs, BufferSink, RunOptions, SilentSink,
    VerificationRun,
};
use recon_harness::transform::ReconstructionRequest;
use recon_harness::{ErrorCategory, HarnessError};

#[test]
fn reference_run_passes_and_cleans_up() {
    let ws = Workspace::new();
    let archive = LocalArchive::new(ws.write_archive());
    let run = VerificationRun::new(ws.layout(), ws.request(), &archive);
    let mut sink = BufferSink::new();

    let summary = run
        .execute(&mut fake_reconstruct, &mut fake_merge, &mut sink)
        .unwrap();

    assert_eq!(summary.reconstruction.matched.len(), 4);
    assert_eq!(summary.merged_files, 2);
    assert_eq!(summary.merge.matched.len(), 2);
    assert!(!summary.removed.is_empty());

    // Working state is gone, fixtures stay for the next run.
    assert!(!ws.working_root().exists());
    assert!(ws.layout().expected_dir().is_dir());
    assert!(sink.contains("[verify-merge] ok"));
    assert!(sink.contains("[teardown] ok"));
}

#[test]
fn second_run_reuses_fixtures() {
    let ws = Workspace::new();
    ws.seed_fixtures();
    let absent = LocalArchive::new(ws.dir.path().join("not-there.tgz"));
    let run = VerificationRun::new(ws.layout(), ws.request(), &absent);

    let summary = run
        .execute(&mut fake_reconstruct, &mut fake_merge, &mut SilentSink)
        .unwrap();

    assert_eq!(summary.acquisition, recon_harness::fixtures::Acquisition::Reused);
}

#[test]
fn reconstruction_mismatch_stops_before_merge() {
    let ws = Workspace::new();
    ws.seed_fixtures();
    let absent = LocalArchive::new(ws.dir.path().join("not-there.tgz"));
    let run = VerificationRun::new(ws.layout(), ws.request(), &absent);

    let mut wrong_producer = |request: &ReconstructionRequest, out: &Path| -> Result<(), HarnessError> {
        let mut request = request.clone();
        request.producer = "SOMEONE-ELSE".to_string();
        fake_reconstruct(&request, out)
    };
    let mut merges = 0;
    let mut counting_merge = |s: &Path, c: &Path, d: &Path| -> Result<(), HarnessError> {
        merges += 1;
        fake_merge(s, c, d)
    };
    let mut sink = BufferSink::new();

    let err = run
        .execute(&mut wrong_producer, &mut counting_merge, &mut sink)
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Verification);
    assert!(err.to_string().contains(".info"), "{err}");
    assert_eq!(merges, 0);
    assert!(sink.contains("[verify-reconstruction] failed"));
    assert!(sink.contains("[teardown] ok"));
    assert!(!ws.working_root().exists());
}

#[test]
fn merge_mismatch_is_reported_against_merged_tree() {
    let ws = Workspace::new();
    ws.seed_fixtures();
    let absent = LocalArchive::new(ws.dir.path().join("not-there.tgz"));
    let run = VerificationRun::new(ws.layout(), ws.request(), &absent);
    let mut no_op_merge = |_: &Path, _: &Path, _: &Path| -> Result<(), HarnessError> { Ok(()) };

    let err = run
        .execute(&mut fake_reconstruct, &mut no_op_merge, &mut SilentSink)
        .unwrap_err();

    match err {
        HarnessError::Verification { stage, path, .. } => {
            assert_eq!(stage, "verify-merge");
            assert!(path.starts_with(ws.layout().merged_output_dir()));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn silent_reconstruction_fails_verification() {
    let ws = Workspace::new();
    ws.seed_fixtures();
    let absent = LocalArchive::new(ws.dir.path().join("not-there.tgz"));
    let run = VerificationRun::new(ws.layout(), ws.request(), &absent);

    let err = run
        .execute(&mut silent_reconstruct, &mut fake_merge, &mut SilentSink)
        .unwrap_err();

    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().contains("produced no files"), "{err}");
}

#[test]
fn transform_failure_ends_run_with_its_error() {
    let ws = Workspace::new();
    ws.seed_fixtures();
    let absent = LocalArchive::new(ws.dir.path().join("not-there.tgz"));
    let run = VerificationRun::new(ws.layout(), ws.request(), &absent);
    let mut crashing = |_: &ReconstructionRequest, _: &Path| -> Result<(), HarnessError> {
        Err(HarnessError::transform("reconstruction", "segfault"))
    };

    let err = run
        .execute(&mut crashing, &mut fake_merge, &mut SilentSink)
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Transformation);
    assert!(!ws.working_root().exists());
}

#[test]
fn full_reset_also_removes_fixtures_and_keep_skips_teardown() {
    let ws = Workspace::new();
    ws.seed_fixtures();
    let absent = LocalArchive::new(ws.dir.path().join("not-there.tgz"));

    let keep = VerificationRun::new(ws.layout(), ws.request(), &absent).with_options(RunOptions {
        keep_outputs: true,
        ..RunOptions::default()
    });
    keep.execute(&mut fake_reconstruct, &mut fake_merge, &mut SilentSink)
        .unwrap();
    assert!(ws.layout().merged_output_dir().join("data").is_dir());

    let reset = VerificationRun::new(ws.layout(), ws.request(), &absent).with_options(RunOptions {
        full_reset: true,
        ..RunOptions::default()
    });
    reset
        .execute(&mut fake_reconstruct, &mut fake_merge, &mut SilentSink)
        .unwrap();
    assert!(!ws.working_root().exists());
    assert!(!ws.fixture_root().exists());
}

#[test]
fn stale_working_root_from_aborted_run_is_cleared() {
    let ws = Workspace::new();
    ws.seed_fixtures();
    let stale = ws.layout().output_dir().join("data/leftover.info");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "from an earlier run").unwrap();
    let absent = LocalArchive::new(ws.dir.path().join("not-there.tgz"));

    VerificationRun::new(ws.layout(), ws.request(), &absent)
        .execute(&mut fake_reconstruct, &mut fake_merge, &mut SilentSink)
        .unwrap();
}

#[test]
fn stage_operations_compose_by_hand() {
    let ws = Workspace::new();
    ws.seed_fixtures();
    let layout = ws.layout();

    let produced = reconstruct_outputs(&layout, &ws.request(), &mut fake_reconstruct).unwrap();
    assert_eq!(produced, 4);

    let targets = merge_targets(&layout, ".info").unwrap();
    assert_eq!(targets.len(), 2);
    assert!(targets.iter().all(|t| t.starts_with("data")));

    assert_eq!(merge_outputs(&layout, ".info", &mut fake_merge).unwrap(), 2);
    let merged = fs::read_to_string(layout.merged_output_dir().join("data/bbob_f010_run2.info")).unwrap();
    assert_eq!(merged.matches("3 120.0").count(), 1);
}
