//! jpserve-demo - exercises a running JPServe instance.
//!
//! Usage:
//!
//! ```text
//! jpserve-demo                # run the built-in sample scripts
//! jpserve-demo script.py      # ... then run a script file
//! jpserve-demo -              # ... then run a script read from stdin
//! ```
//!
//! The server address comes from `JPSERVE_HOST` / `JPSERVE_PORT`
//! (default `localhost:8888`).

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jpserve_client::{ClientConfig, ScriptExecutor, ScriptResult, ServeContext};

/// Sample scripts covering scalar and composite `_result_` values.
const SAMPLE_SCRIPTS: &[&str] = &[
    "_result_ = 'Hello World!'",
    "a = 2\nb = 3\n_result_ = a * b",
    "a = 2\nb = 3\n_result_ = (a, b)",
    "a = 2\nb = 3\n_result_ = {'a': a, 'b': b}",
    "a = 2\nb = 3\n_result_ = [a, {'a': a, 'b': b}, b]",
];

fn print_result(rs: &ScriptResult) {
    if rs.is_success() {
        println!("Result: {}", rs.payload().unwrap_or("None"));
    } else {
        println!(
            "Execute python script failed: {}",
            rs.message().unwrap_or("unknown error")
        );
    }
}

/// Composite payloads are JSON; decoding them is up to the caller.
fn describe_payload(rs: &ScriptResult) {
    let Some(payload) = rs.payload() else {
        return;
    };
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(serde_json::Value::Array(items)) => {
            println!("-- result after deserialized");
            for (i, item) in items.iter().enumerate() {
                println!("{}: {}", i, item);
            }
        }
        Ok(serde_json::Value::Object(map)) => {
            println!("-- result after deserialized");
            for (key, value) in &map {
                println!("{}: {}", key, value);
            }
        }
        _ => {}
    }
}

async fn run_samples(executor: &ScriptExecutor) {
    println!("# Test exec Python script");
    for script in SAMPLE_SCRIPTS {
        print_result(&executor.exec(script).await);
    }
}

async fn run_source(executor: &ScriptExecutor, source: &str) {
    let rs = if source == "-" {
        println!("\n# Test exec script in stream");
        executor.exec_reader(tokio::io::stdin()).await
    } else {
        println!("\n# Test exec Python file");
        executor.exec_file(source).await
    };
    print_result(&rs);
    describe_payload(&rs);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "jpserve=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = ClientConfig::from_env().context("Invalid JPServe configuration")?;
    tracing::info!("Connecting to JPServe at {}", config.endpoint());

    // The only failure that is fatal: no connection, nothing to run
    let context = Arc::new(
        ServeContext::connect_with_config(&config)
            .await
            .with_context(|| format!("Failed to connect to JPServe at {}", config.endpoint()))?,
    );
    let executor = context.executor();

    run_samples(&executor).await;

    if let Some(source) = std::env::args().nth(1) {
        run_source(&executor, &source).await;
    }

    context.close().await;
    Ok(())
}
