use serde_json::json;

use scenic_core::Ctx;

mod support;

use support::{mock_test, spec};

fn write_point_schema(dir: &tempfile::TempDir) {
    let schema = json!({
        "type": "object",
        "properties": { "x": { "type": "number" } },
        "required": ["x"]
    });
    std::fs::write(dir.path().join("point.json"), schema.to_string()).expect("schema file");
}

#[tokio::test]
async fn pub_schema_complaints_are_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_point_schema(&dir);

    let spec = spec(json!({
        "phases": {
            "phase1": {
                "steps": [
                    { "pub": { "chan": "mock", "schema": "point.json", "payload": { "x": "oops" } } }
                ]
            }
        }
    }));
    let mut t = mock_test();
    let err = t.run(&Ctx::with_dir(dir.path()), &spec).await.unwrap_err();
    assert!(!err.is_broken());
    assert!(err.to_string().contains("validation errors"));
}

#[tokio::test]
async fn pub_schema_passes_valid_payload() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_point_schema(&dir);

    let spec = spec(json!({
        "phases": {
            "phase1": {
                "steps": [
                    { "pub":  { "chan": "mock", "schema": "point.json", "payload": { "x": 1 } } },
                    { "recv": { "chan": "mock", "pattern": { "x": "?v" }, "timeout": "2s" } }
                ]
            }
        }
    }));
    let mut t = mock_test();
    t.run(&Ctx::with_dir(dir.path()), &spec)
        .await
        .expect("test succeeds");
    assert_eq!(t.bindings.get("?v"), Some(&json!(1)));
}

#[tokio::test]
async fn recv_schema_complaints_are_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_point_schema(&dir);

    let spec = spec(json!({
        "phases": {
            "phase1": {
                "steps": [
                    { "ingest": { "chan": "mock", "payload": { "x": "oops" } } },
                    { "recv": { "chan": "mock", "schema": "point.json", "pattern": {}, "timeout": "2s" } }
                ]
            }
        }
    }));
    let mut t = mock_test();
    let err = t.run(&Ctx::with_dir(dir.path()), &spec).await.unwrap_err();
    assert!(!err.is_broken());
    assert!(err.to_string().contains("validation errors"));
}

#[tokio::test]
async fn missing_schema_is_broken() {
    let spec = spec(json!({
        "phases": {
            "phase1": {
                "steps": [
                    { "pub": { "chan": "mock", "schema": "nope.json", "payload": { "x": 1 } } }
                ]
            }
        }
    }));
    let mut t = mock_test();
    let err = t.run(&Ctx::new(), &spec).await.unwrap_err();
    assert!(err.is_broken());
}
