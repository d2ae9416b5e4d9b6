//! Evaluation end to end: gold dataset loading, annotation, crossed
//! scorers, and the standard evaluation batch.

mod common;

use std::fs;

use biotag::abbrev::DocContext;
use biotag::dataset::create_dataset;
use biotag::eval::{
    AnnotationScorer, BoundaryMatch, EvalBatch, EvalConfig, IdentityMatch, Scorer,
};
use biotag::model::store::{load, LoadOptions};
use biotag::pipeline::PipelineStage;

const GOLD: &str = "\
201|t|Congestive heart failure study
201|a|Diabetes mellitus was excluded.
201\t0\t24\tCongestive heart failure\tDisease\tMESH:D006333
201\t31\t48\tDiabetes mellitus\tDisease\tMESH:D003920
";

#[test]
fn perfect_predictions_score_one_under_every_semantics() {
    let dir = tempfile::tempdir().unwrap();
    let model = load(&common::write_model(dir.path()), &LoadOptions::default()).unwrap();

    let gold_path = dir.path().join("gold.txt");
    fs::write(&gold_path, GOLD).unwrap();
    let dataset = create_dataset(&format!("pubtator|{}", gold_path.display())).unwrap();
    let mut units = dataset.load(&model.lexicon).unwrap();
    assert_eq!(units.len(), 1);

    let ctx = DocContext::empty("201");
    model.pipeline.process_all(&mut units, &ctx).unwrap();

    for boundary in [BoundaryMatch::Exact, BoundaryMatch::Overlap] {
        for identity in [IdentityMatch::Class, IdentityMatch::ClassAndId] {
            let mut scorer = AnnotationScorer::new(boundary, identity);
            for unit in &units {
                scorer.add_unit(unit);
            }
            assert!(
                (scorer.f1() - 1.0).abs() < 1e-9,
                "f1 {} under {}/{}: {}",
                scorer.f1(),
                boundary.name(),
                identity.name(),
                scorer.detail()
            );
        }
    }
}

#[test]
fn wrong_identifier_only_hurts_identifier_semantics() {
    let dir = tempfile::tempdir().unwrap();
    let model = load(&common::write_model(dir.path()), &LoadOptions::default()).unwrap();

    let gold_path = dir.path().join("gold.txt");
    // Gold says the CHF mention is D003920; the model will predict D006333.
    fs::write(
        &gold_path,
        "202|t|Congestive heart failure\n202|a|Nothing else.\n\
         202\t0\t24\tCongestive heart failure\tDisease\tMESH:D003920\n",
    )
    .unwrap();
    let dataset = create_dataset(&format!("pubtator|{}", gold_path.display())).unwrap();
    let mut units = dataset.load(&model.lexicon).unwrap();
    model
        .pipeline
        .process_all(&mut units, &DocContext::empty("202"))
        .unwrap();

    let mut by_class = AnnotationScorer::new(BoundaryMatch::Exact, IdentityMatch::Class);
    let mut by_id = AnnotationScorer::new(BoundaryMatch::Exact, IdentityMatch::ClassAndId);
    for unit in &units {
        by_class.add_unit(unit);
        by_id.add_unit(unit);
    }
    assert!((by_class.f1() - 1.0).abs() < 1e-9, "{}", by_class.detail());
    assert!(by_id.f1() < 1.0, "{}", by_id.detail());
}

#[test]
fn standard_batch_writes_the_analysis_file() {
    let dir = tempfile::tempdir().unwrap();
    let model = load(&common::write_model(dir.path()), &LoadOptions::default()).unwrap();

    let gold_path = dir.path().join("gold.txt");
    fs::write(&gold_path, GOLD).unwrap();
    let dataset = create_dataset(&format!("pubtator|{}", gold_path.display())).unwrap();
    let mut units = dataset.load(&model.lexicon).unwrap();
    model
        .pipeline
        .process_all(&mut units, &DocContext::empty("201"))
        .unwrap();

    let analysis = dir.path().join("analysis.html");
    let mut batch = EvalBatch::standard(&EvalConfig {
        bootstrap_iterations: 10,
        bootstrap_seed: 7,
        analysis_file: Some(analysis.clone()),
    });
    batch.run(&mut units).unwrap();

    let html = fs::read_to_string(&analysis).unwrap();
    assert!(html.contains("Congestive heart failure"));
    // Feature state was reclaimed by the final stage
    assert!(units
        .iter()
        .all(|u| u.tokens.iter().all(|t| t.features.is_none())));
}
