//! CLI wiring for the scenic test engine.

pub mod chans;
mod cli;
pub mod loader;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use scenic_core::{Ctx, Test};

pub use cli::{Cli, Command};

/// Entry point for the CLI.
pub async fn run(cli: Cli) -> ExitCode {
    chans::register_all();
    match cli.command {
        Command::Run {
            spec,
            dir,
            params,
            timeout,
        } => run_spec(spec, dir, params, timeout, cli.json).await,
    }
}

async fn run_spec(
    path: PathBuf,
    dir: Option<PathBuf>,
    params: Vec<String>,
    timeout: Option<String>,
    json: bool,
) -> ExitCode {
    let doc = match loader::load(&path) {
        Ok(doc) => doc,
        Err(e) => return output::error_exit(&e.to_string(), json),
    };

    let dir = dir
        .or_else(|| path.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));
    let ctx = Ctx::with_dir(dir);

    if let Some(timeout) = &timeout {
        let deadline = match scenic_core::parse_duration(timeout) {
            Ok(d) => d,
            Err(e) => return output::error_exit(&e.to_string(), json),
        };
        let watchdog = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            tracing::warn!(target: "scenic", "run deadline reached; canceling");
            watchdog.cancel();
        });
    }

    let mut test = Test::new(doc.name.clone());
    for (name, decl) in &doc.channels {
        test.declare_chan(name.clone(), decl.clone());
    }
    for (name, value) in &doc.bindings {
        test.bindings.set_key_value(name.clone(), value.clone());
    }
    for param in &params {
        if let Err(e) = test.bindings.set(param) {
            return output::error_exit(&e.to_string(), json);
        }
    }

    let result = test.run(&ctx, &doc.spec).await;
    output::report(&doc.name, &result, &test.bindings, json)
}
