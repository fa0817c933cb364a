use rfs_adapters::{BatchSource, JsonBatchSource};

fn fixture_path() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures/integrative-supplements/batch.json")
}

#[tokio::test]
async fn integrative_supplements_fixture_loads() {
    let batch = JsonBatchSource::new(fixture_path()).load().await.expect("load fixture");
    assert_eq!(batch.label, "integrative-supplements");
    assert_eq!(batch.groups.len(), 6);
    assert_eq!(batch.record_count(), 20);
    assert_eq!(batch.search_terms()[0], "low dose naltrexone LDN bladder cancer");

    let undated = batch
        .groups
        .iter()
        .flat_map(|g| g.results.iter())
        .filter(|r| r.published_date.is_none())
        .count();
    assert_eq!(undated, 6);
}
