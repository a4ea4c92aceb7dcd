use criterion::{Criterion, criterion_group, criterion_main};
use enrich_rs::query::{PlanRequest, plan};
use enrich_rs::schema::{Validator, compile_schema};
use serde_json::json;
use std::collections::BTreeMap;

fn bench_schema_validation(c: &mut Criterion) {
    let schema: BTreeMap<String, enrich_rs::schema::RawField> = serde_yaml::from_str(
        "sentiment:\n  enum: [positive, negative, neutral]\ntopics:\n  enum_list: [a, b, c, d, e]\n  min_items: 1\n  max_items: 3\nscore:\n  type: float\n  minimum: 0\n  maximum: 1",
    )
    .unwrap();
    let compiled = compile_schema(&schema).unwrap();
    let validator = Validator::new(compiled);
    let payload = json!({"sentiment": "positive", "topics": ["a", "b", "a"], "score": 0.8});

    c.bench_function("validate_structured_response", |b| {
        b.iter(|| validator.validate(&payload).unwrap());
    });
}

fn bench_query_planning(c: &mut Criterion) {
    c.bench_function("plan_default_mode", |b| {
        b.iter(|| {
            plan(&PlanRequest {
                base_sql: "SELECT * FROM documents ORDER BY created_at",
                table: "documents",
                output_column: Some("sentiment"),
                overwrite: false,
                limit: Some(500),
                row_selector: None,
            })
            .unwrap()
        });
    });
}

criterion_group!(validate, bench_schema_validation, bench_query_planning);
criterion_main!(validate);
