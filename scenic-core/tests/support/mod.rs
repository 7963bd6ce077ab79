use serde_json::json;

use scenic_core::{ChanDecl, Spec, Test};

/// Parses a spec document literal.
pub fn spec(v: serde_json::Value) -> Spec {
    serde_json::from_value(v).expect("spec document")
}

/// A test with a `mock` channel declared under the name `mock`.
pub fn mock_test() -> Test {
    let mut t = Test::new("engine-test");
    t.declare_chan(
        "mock",
        ChanDecl {
            kind: "mock".to_string(),
            config: json!(null),
        },
    );
    t
}
