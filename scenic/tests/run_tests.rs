use serde_json::json;

use scenic::loader;
use scenic_core::{Ctx, Test};

fn write_spec(dir: &tempfile::TempDir, doc: &serde_json::Value) -> std::path::PathBuf {
    let path = dir.path().join("spec.json");
    std::fs::write(&path, doc.to_string()).expect("write spec");
    path
}

#[tokio::test]
async fn loaded_spec_runs_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_spec(
        &dir,
        &json!({
            "name": "echo",
            "channels": { "self": { "kind": "mock" } },
            "bindings": { "?greeting": "hola" },
            "phases": {
                "phase1": {
                    "steps": [
                        { "pub":  { "chan": "self", "payload": { "say": "{?greeting}" } } },
                        { "recv": { "chan": "self", "pattern": { "say": "?heard" }, "timeout": "2s" } }
                    ]
                }
            }
        }),
    );

    let doc = loader::load(&path).expect("load");
    let mut test = Test::new(doc.name.clone());
    for (name, decl) in &doc.channels {
        test.declare_chan(name.clone(), decl.clone());
    }
    for (name, value) in &doc.bindings {
        test.bindings.set_key_value(name.clone(), value.clone());
    }

    test.run(&Ctx::with_dir(dir.path()), &doc.spec)
        .await
        .expect("test succeeds");
    assert_eq!(test.bindings.get("?heard"), Some(&json!("hola")));
}

#[tokio::test]
async fn final_phases_run_from_loaded_documents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_spec(
        &dir,
        &json!({
            "channels": { "self": { "kind": "mock" } },
            "finalPhases": ["cleanup"],
            "phases": {
                "phase1": {
                    "steps": [
                        { "recv": { "chan": "self", "pattern": {}, "timeout": "50ms" } }
                    ]
                },
                "cleanup": {
                    "steps": [ { "run": "test.Bindings[\"?cleaned\"] = true" } ]
                }
            }
        }),
    );

    let doc = loader::load(&path).expect("load");
    let mut test = Test::new(doc.name.clone());
    for (name, decl) in &doc.channels {
        test.declare_chan(name.clone(), decl.clone());
    }

    let err = test
        .run(&Ctx::with_dir(dir.path()), &doc.spec)
        .await
        .unwrap_err();
    assert!(!err.is_broken());
    assert_eq!(test.bindings.get("?cleaned"), Some(&json!(true)));
}
