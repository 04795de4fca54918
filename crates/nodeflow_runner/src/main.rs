// SPDX-License-Identifier: MIT OR Apache-2.0
//! `nodeflow` - headless graph runner
//!
//! Loads a persisted graph with the built-in node factory, compiles it, executes it the
//! requested number of times and logs the value of every data getter.

mod settings;

use nodeflow_graph::{FactorySet, Graph, GraphError};
use settings::{RunSettings, SettingsError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Error ending a run
#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

fn init_logging(directives: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))
        .unwrap_or_else(|_| EnvFilter::new(settings::DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn run(settings: &RunSettings) -> Result<Graph, RunError> {
    let mut graph = Graph::load(&settings.graph, FactorySet::with_builtins()?)?;
    graph.compile()?;

    for setter in graph.data_setters() {
        tracing::debug!(
            "Input {}.{} ({}) keeps its default value",
            setter.node,
            setter.port,
            setter.data_type
        );
    }

    for iteration in 1..=settings.iterations {
        graph.execute()?;
        tracing::debug!("Pass {}/{} done", iteration, settings.iterations);
    }

    for getter in graph.data_getters() {
        match graph.output_value(&getter.node, &getter.port) {
            Ok(value) => tracing::info!("{}.{} = {:?}", getter.node, getter.port, value),
            Err(_) => tracing::info!("{}.{} = <no data>", getter.node, getter.port),
        }
    }
    Ok(graph)
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let settings = RunSettings::from_args(&args);

    let directives = match &settings {
        Ok(settings) => settings.log_filter(),
        Err(_) => settings::DEFAULT_LOG_FILTER,
    };
    init_logging(directives);

    tracing::info!("Starting nodeflow v{}", env!("CARGO_PKG_VERSION"));

    let result = settings.map_err(RunError::from).and_then(|settings| {
        tracing::info!(
            "Running {:?} for {} pass(es)",
            settings.graph,
            settings.iterations
        );
        run(&settings)
    });
    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
