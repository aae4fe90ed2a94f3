use railhub_core::{Pipeline, SourceId};
use railhub_sync::{PipelineConfig, SourceRegistry};

#[test]
fn workspace_registry_enables_every_uncredentialed_source() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let text = std::fs::read_to_string(root.join("sources.yaml")).unwrap();
    let registry = SourceRegistry::from_yaml(&text).unwrap();

    assert_eq!(registry.sources.len(), SourceId::ALL.len());
    for source in SourceId::ALL {
        assert_eq!(registry.is_enabled(source), source != SourceId::Jsearch, "{source:?}");
    }

    let config = PipelineConfig::default();
    for pipeline in Pipeline::ALL {
        let planned = registry.plan(pipeline, &config).unwrap();
        assert!(!planned.is_empty(), "{pipeline:?} has no sources");
    }
}
