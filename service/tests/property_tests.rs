//! Property-based tests for detection, inference and consolidation
//!
//! Inputs are generated with proptest; each property must hold for every
//! plugin, every field and every combination of strategy scores.

use proptest::prelude::*;
use schemalens_core::scoring::consolidate;
use schemalens_core::{FieldInfo, FormatType, SchemaDetails};
use schemalens_service::budget::ExecutionBudget;
use schemalens_service::{
    PipelineConfig, SourceFile, create_default_registry, create_pipeline,
    create_type_inference_service,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

fn filename() -> impl Strategy<Value = String> {
    let extensions = prop::sample::select(vec![
        "json", "csv", "xml", "yaml", "sql", "avsc", "proto", "graphql", "parquet", "orc", "txt", "",
    ]);
    ("[a-z]{1,8}", extensions).prop_map(|(stem, ext)| {
        if ext.is_empty() { stem } else { format!("{stem}.{ext}") }
    })
}

fn cell() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ]{0,12}",
        any::<i32>().prop_map(|n| n.to_string()),
        (-1000.0f64..1000.0).prop_map(|f| format!("{f:.3}")),
        any::<bool>().prop_map(|b| b.to_string()),
        (1990u32..2030, 1u32..13, 1u32..29).prop_map(|(y, m, d)| format!("{y}-{m:02}-{d:02}")),
        "[a-z]{1,6}@[a-z]{1,6}\\.com",
    ]
}

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z0-9@.:-]{0,16}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map("[a-z]{1,5}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn can_parse_is_total_and_bounded(name in filename(), content in prop::collection::vec(any::<u8>(), 0..256)) {
        for plugin in create_default_registry().iter() {
            let confidence = plugin.can_parse(&name, &content).confidence();
            prop_assert!((0.0..=1.0).contains(&confidence), "{} gave {}", plugin.name(), confidence);
        }
    }

    #[test]
    fn can_parse_handles_structured_prefixes(name in filename(), body in "[{\\[<a-z:, \"\n]{0,64}") {
        for plugin in create_default_registry().iter() {
            let confidence = plugin.can_parse(&name, body.as_bytes()).confidence();
            prop_assert!((0.0..=1.0).contains(&confidence));
        }
    }

    #[test]
    fn enhanced_info_respects_score_invariants(
        raw in prop::sample::select(vec!["string", "integer", "float", "boolean", "date", "array", "object", "map"]),
        name in "[a-z_]{1,12}",
        values in prop::collection::vec(json_value(), 0..8),
    ) {
        let service = create_type_inference_service(&PipelineConfig::default()).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let schema = SchemaDetails::new(FormatType::Json, "t", "t.json");
        let field = FieldInfo::new(name, raw);
        let samples: Vec<&Value> = values.iter().collect();
        let info = service
            .enhance_field(&schema, &field, &samples, &ExecutionBudget::unbounded())
            .map_err(|e| TestCaseError::fail(format!("{e:?}")))?;
        prop_assert!((0.0..=1.0).contains(&info.confidence.score));
        for alt in &info.possible_alternatives {
            prop_assert!(alt.score < info.confidence.score);
        }
        prop_assert!(info.is_consistent());
    }

    #[test]
    fn csv_columns_always_yield_consistent_types(rows in prop::collection::vec(prop::collection::vec(cell(), 3), 1..12)) {
        let mut text = String::from("alpha,beta,gamma\n");
        for row in &rows {
            let escaped: Vec<String> = row.iter().map(|c| c.replace(',', " ")).collect();
            text.push_str(&escaped.join(","));
            text.push('\n');
        }
        let pipeline = create_pipeline(PipelineConfig::default()).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let report = pipeline
            .run(vec![SourceFile::new("random.csv", text)], &CancellationToken::new())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        for schema in &report.schemas {
            for field in &schema.fields {
                if let Some(info) = &field.enhanced {
                    prop_assert!(info.is_consistent(), "{}: {:?}", field.name, info);
                }
            }
        }
    }

    #[test]
    fn consolidation_is_bounded_and_never_dilutes(
        scores in prop::collection::vec(0.0f64..=1.0, 1..6),
        extra in 0.0f64..=1.0,
        weight in 0.0f64..=1.0,
    ) {
        let combined = consolidate(&scores, weight);
        let max = scores.iter().copied().fold(0.0, f64::max);
        prop_assert!((0.0..=1.0).contains(&combined));
        prop_assert!(combined >= max - 1e-12);

        let mut more = scores.clone();
        more.push(extra);
        prop_assert!(consolidate(&more, weight) >= combined - 1e-12);

        let mut reversed = scores.clone();
        reversed.reverse();
        prop_assert!((consolidate(&reversed, weight) - combined).abs() < 1e-12);
    }

    #[test]
    fn threshold_bounds_the_store(threshold in 0.0f64..=1.0) {
        let config = PipelineConfig { confidence_threshold: threshold, ..PipelineConfig::default() };
        let pipeline = create_pipeline(config).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let files = vec![
            SourceFile::new("users.json", r#"[{"id": 1, "email": "a@x.io"}, {"id": 2, "email": "b@x.io"}]"#),
            SourceFile::new("orders.csv", "id,user_id,email\n1,1,a@x.io\n2,2,b@x.io\n"),
        ];
        let report = pipeline.run(files, &CancellationToken::new()).map_err(|e| TestCaseError::fail(e.to_string()))?;
        for rel in &report.relationships.relationships {
            prop_assert!(rel.confidence.score >= threshold);
        }
    }
}
