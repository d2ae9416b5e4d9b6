//! Directory batch mode: per-file failure isolation, temp-file hygiene,
//! reprocess skipping, and per-file abbreviation scoping.

mod common;

use std::fs;

use biotag::batch::{self, BatchOptions};
use biotag::formats::FileFormat;
use biotag::model::store::{load, LoadOptions};
use biotag::postprocess::CorrectionChain;
use biotag::runner::AnnotationRunner;

fn runner(dir: &std::path::Path) -> AnnotationRunner {
    let model = load(&common::write_model(dir), &LoadOptions::default()).unwrap();
    AnnotationRunner::new(model, CorrectionChain::none(), vec![], true)
}

#[test]
fn failing_file_is_isolated_and_leaves_no_output() {
    let base = tempfile::tempdir().unwrap();
    let in_dir = base.path().join("in");
    let out_dir = base.path().join("out");
    fs::create_dir_all(&in_dir).unwrap();
    fs::create_dir_all(&out_dir).unwrap();

    fs::write(
        in_dir.join("f1.txt"),
        "1|t|One\n1|a|Congestive heart failure here.\n",
    )
    .unwrap();
    // Malformed: a non-empty line with a single pipe-field aborts the file
    fs::write(in_dir.join("f2.txt"), "2|t|Two\nbroken-line-without-pipes\n").unwrap();
    fs::write(
        in_dir.join("f3.txt"),
        "3|t|Three\n3|a|Diabetes mellitus confirmed.\n",
    )
    .unwrap();

    let mut runner = runner(base.path());
    batch::run(
        FileFormat::Pubtator,
        &in_dir,
        &out_dir,
        BatchOptions::default(),
        &mut runner,
    )
    .unwrap();

    // Files 1 and 3 produced complete outputs
    let f1 = fs::read_to_string(out_dir.join("f1.txt")).unwrap();
    assert!(f1.contains("1|t|One"));
    assert!(f1.contains("MESH:D006333"));
    let f3 = fs::read_to_string(out_dir.join("f3.txt")).unwrap();
    assert!(f3.contains("MESH:D003920"));

    // File 2 left nothing behind: no output, no temp files
    assert!(!out_dir.join("f2.txt").exists());
    let leftovers: Vec<String> = fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
}

#[test]
fn existing_outputs_are_skipped_unless_reprocessing() {
    let base = tempfile::tempdir().unwrap();
    let in_dir = base.path().join("in");
    let out_dir = base.path().join("out");
    fs::create_dir_all(&in_dir).unwrap();
    fs::create_dir_all(&out_dir).unwrap();

    fs::write(in_dir.join("f1.txt"), "1|t|One\n1|a|Nothing here.\n").unwrap();
    fs::write(out_dir.join("f1.txt"), "pre-existing").unwrap();

    let mut runner = runner(base.path());
    batch::run(
        FileFormat::Pubtator,
        &in_dir,
        &out_dir,
        BatchOptions {
            reprocess: false,
            show_scores: false,
        },
        &mut runner,
    )
    .unwrap();
    assert_eq!(fs::read_to_string(out_dir.join("f1.txt")).unwrap(), "pre-existing");

    batch::run(
        FileFormat::Pubtator,
        &in_dir,
        &out_dir,
        BatchOptions::default(),
        &mut runner,
    )
    .unwrap();
    assert_ne!(fs::read_to_string(out_dir.join("f1.txt")).unwrap(), "pre-existing");
}

#[test]
fn directory_input_requires_directory_output() {
    let base = tempfile::tempdir().unwrap();
    let in_dir = base.path().join("in");
    fs::create_dir_all(&in_dir).unwrap();
    let out_file = base.path().join("not-a-dir.txt");
    fs::write(&out_file, "").unwrap();

    let mut runner = runner(base.path());
    let err = batch::run(
        FileFormat::Pubtator,
        &in_dir,
        &out_file,
        BatchOptions::default(),
        &mut runner,
    )
    .unwrap_err();
    assert!(matches!(err, biotag::Error::InvalidInput(_)));
}

#[test]
fn folder_abbreviations_never_leak_across_files() {
    let base = tempfile::tempdir().unwrap();
    let in_dir = base.path().join("in");
    let out_dir = base.path().join("out");
    let abbr_dir = base.path().join("abbr");
    fs::create_dir_all(&in_dir).unwrap();
    fs::create_dir_all(&out_dir).unwrap();
    fs::create_dir_all(&abbr_dir).unwrap();

    // Both files mention CHF, but only document 1's sidecar defines it.
    fs::write(in_dir.join("f1.txt"), "1|t|One\n1|a|Severe CHF noted.\n").unwrap();
    fs::write(in_dir.join("f2.txt"), "2|t|Two\n2|a|Severe CHF noted.\n").unwrap();
    fs::write(
        abbr_dir.join("f1.txt"),
        "1\tCHF\tcongestive heart failure\n",
    )
    .unwrap();

    let model = load(&common::write_model(base.path()), &LoadOptions::default()).unwrap();
    let sources = vec![
        biotag::abbrev::create_source(&format!("folder|{}", abbr_dir.display())).unwrap(),
    ];
    let mut runner = AnnotationRunner::new(model, CorrectionChain::none(), sources, true);

    batch::run(
        FileFormat::Pubtator,
        &in_dir,
        &out_dir,
        BatchOptions::default(),
        &mut runner,
    )
    .unwrap();

    // Document 1: "CHF" expanded through its abbreviation and normalized.
    let f1 = fs::read_to_string(out_dir.join("f1.txt")).unwrap();
    assert!(f1.contains("MESH:D006333"), "expected normalized CHF: {f1}");
    // Document 2: no abbreviation in scope, so "CHF" is not even recognized.
    let f2 = fs::read_to_string(out_dir.join("f2.txt")).unwrap();
    assert!(!f2.contains("MESH:D006333"), "abbreviation leaked: {f2}");
    assert!(!f2.lines().any(|l| l.contains('\t')), "unexpected annotation: {f2}");
}
