use crate::GlobalArgs;
use crate::report::{self, OutputFormat};
use crate::workspace::Workspace;
use colored::Colorize;
use stackflow_core::{EnsureOptions, Reconciler};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// `apply`, or `plan` when `dry_run` is set
pub async fn handle(
    global: &GlobalArgs,
    roots: &[String],
    output: OutputFormat,
    dry_run: bool,
    cancel: CancellationToken,
) -> anyhow::Result<ExitCode> {
    let workspace = Workspace::load(global)?;
    let graph = workspace.graph()?;
    let roots = workspace.resolve_roots(&graph, roots);
    let roots: Vec<&str> = roots.iter().map(String::as_str).collect();

    // Fail on cycles and unknown roots before authenticating
    graph.plan(&roots)?;

    if output == OutputFormat::Text {
        workspace.print_header();
        let title = if dry_run { "Planning..." } else { "Applying..." };
        println!("{}", title.blue());
        println!();
    }

    let gateway = workspace.connect().await?;
    let options = EnsureOptions {
        wait: workspace.blueprint.wait_config(),
        drift: workspace.blueprint.drift,
        dry_run,
    };
    let span = tracing::info_span!(
        "apply",
        blueprint = %workspace.path.display(),
        dry_run,
    );
    let reconciler = Reconciler::new(gateway)
        .with_options(options)
        .with_span(span)
        .with_cancellation(cancel);

    let report = reconciler.apply(&graph, &roots).await?;
    print!("{}", report::render_apply(&report, output)?);
    if output == OutputFormat::Json {
        println!();
    }
    Ok(ExitCode::SUCCESS)
}
