//! Run-result reporting and exit codes.

use std::process::ExitCode;

use serde::Serialize;

use scenic_core::{Bindings, Error};

#[derive(Serialize)]
struct Report<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    bindings: &'a Bindings,
}

pub(super) fn error_exit(message: &str, json: bool) -> ExitCode {
    if json {
        let payload = serde_json::json!({ "status": "error", "message": message });
        let output = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| message.to_string());
        eprintln!("{output}");
    } else {
        eprintln!("{message}");
    }
    ExitCode::from(2)
}

/// 0 for success, 1 for a test failure, 2 for broken.
fn exit_code_for(result: &Result<(), Error>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) if e.is_broken() => 2,
        Err(_) => 1,
    }
}

/// Prints the outcome of a run and maps it to the process exit code.
pub(super) fn report(
    name: &str,
    result: &Result<(), Error>,
    bindings: &Bindings,
    json: bool,
) -> ExitCode {
    let (status, error) = match result {
        Ok(()) => ("success", None),
        Err(e) if e.is_broken() => ("broken", Some(e.to_string())),
        Err(e) => ("failure", Some(e.to_string())),
    };

    if json {
        let payload = Report {
            status,
            error,
            bindings,
        };
        let output = serde_json::to_string_pretty(&payload)
            .unwrap_or_else(|_| "<failed to serialize report>".to_string());
        println!("{output}");
    } else {
        println!("Test: {name}");
        println!("Outcome: {status}");
        if let Some(error) = &error {
            println!("Error: {error}");
        }
        if !bindings.is_empty() {
            let payload = serde_json::to_string_pretty(bindings)
                .unwrap_or_else(|_| "<failed to serialize bindings>".to_string());
            println!("Bindings:\n{payload}");
        }
    }

    ExitCode::from(exit_code_for(result))
}
