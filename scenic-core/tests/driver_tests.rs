use serde_json::json;

use scenic_core::{Ctx, Error};

mod support;

use support::{mock_test, spec};

#[tokio::test]
async fn branch_flow_visits_both_phases() {
    let spec = spec(json!({
        "phases": {
            "p1": {
                "steps": [
                    { "run": "test.Bindings[\"?p1\"] = true" },
                    { "branch": "return 'p2'" }
                ]
            },
            "p2": {
                "steps": [
                    { "run": "test.Bindings[\"?p2\"] = true" }
                ]
            }
        },
        "initialPhase": "p1"
    }));
    let mut t = mock_test();
    t.run(&Ctx::new(), &spec).await.expect("test succeeds");
    assert_eq!(t.bindings.get("?p1"), Some(&json!(true)));
    assert_eq!(t.bindings.get("?p2"), Some(&json!(true)));
}

#[tokio::test]
async fn fails_downgrade_adopts_goto() {
    let spec = spec(json!({
        "phases": {
            "phase1": {
                "steps": [
                    { "kill": { "chan": "mock" } },
                    { "fails": true, "goto": "p3",
                      "pub": { "chan": "mock", "payload": "x" } }
                ]
            },
            "p3": {
                "steps": [ { "run": "test.Bindings[\"?landed\"] = true" } ]
            }
        }
    }));
    let mut t = mock_test();
    t.run(&Ctx::new(), &spec).await.expect("failure swallowed");
    assert_eq!(t.bindings.get("?landed"), Some(&json!(true)));
}

#[tokio::test]
async fn goto_not_last_is_broken() {
    let spec = spec(json!({
        "phases": {
            "phase1": {
                "steps": [
                    { "goto": "p2" },
                    { "run": "return 0" }
                ]
            },
            "p2": { "steps": [] }
        }
    }));
    let mut t = mock_test();
    let err = t.run(&Ctx::new(), &spec).await.unwrap_err();
    assert!(err.is_broken());
    assert!(err.to_string().contains("not last"));
}

#[tokio::test]
async fn branch_non_string_is_broken() {
    let spec = spec(json!({
        "phases": {
            "phase1": { "steps": [ { "branch": "return 42" } ] }
        }
    }));
    let mut t = mock_test();
    let err = t.run(&Ctx::new(), &spec).await.unwrap_err();
    assert!(err.is_broken());
}

#[tokio::test]
async fn missing_phase_is_broken() {
    let spec = spec(json!({
        "initialPhase": "warp",
        "phases": { "phase1": { "steps": [] } }
    }));
    let mut t = mock_test();
    let err = t.run(&Ctx::new(), &spec).await.unwrap_err();
    assert!(err.is_broken());
    assert!(err.to_string().contains("warp"));
}

#[tokio::test]
async fn final_phases_run_after_failure() {
    let spec = spec(json!({
        "finalPhases": ["cleanup"],
        "phases": {
            "phase1": {
                "steps": [
                    { "recv": { "chan": "mock", "pattern": {}, "timeout": "50ms" } }
                ]
            },
            "cleanup": {
                "steps": [ { "run": "test.Bindings[\"?cleaned\"] = true" } ]
            }
        }
    }));
    let mut t = mock_test();
    let err = t.run(&Ctx::new(), &spec).await.unwrap_err();
    assert!(matches!(err, Error::Failure(_)));
    assert_eq!(t.bindings.get("?cleaned"), Some(&json!(true)));
}

#[tokio::test]
async fn skip_step_is_a_no_op() {
    let spec = spec(json!({
        "phases": {
            "phase1": {
                "steps": [
                    { "skip": true, "run": "error('never runs')" },
                    { "run": "test.Bindings[\"?ran\"] = true" }
                ]
            }
        }
    }));
    let mut t = mock_test();
    t.run(&Ctx::new(), &spec).await.expect("test succeeds");
    assert_eq!(t.bindings.get("?ran"), Some(&json!(true)));
}

#[tokio::test]
async fn step_errors_carry_their_index() {
    let spec = spec(json!({
        "phases": {
            "phase1": {
                "steps": [
                    { "run": "return 0" },
                    { "recv": { "chan": "mock", "pattern": {}, "timeout": "50ms" } }
                ]
            }
        }
    }));
    let mut t = mock_test();
    let err = t.run(&Ctx::new(), &spec).await.unwrap_err();
    assert!(err.to_string().contains("step 1:"));
}
