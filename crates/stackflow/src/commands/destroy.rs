use crate::GlobalArgs;
use crate::exit;
use crate::report::{self, OutputFormat};
use crate::workspace::Workspace;
use colored::Colorize;
use stackflow_core::{EnsureOptions, Reconciler};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Without `yes` nothing is deleted; the resources that would go are listed
pub async fn handle(
    global: &GlobalArgs,
    roots: &[String],
    yes: bool,
    output: OutputFormat,
    cancel: CancellationToken,
) -> anyhow::Result<ExitCode> {
    let workspace = Workspace::load(global)?;
    let graph = workspace.graph()?;
    let roots = workspace.resolve_roots(&graph, roots);
    let roots: Vec<&str> = roots.iter().map(String::as_str).collect();

    graph.plan(&roots)?;

    if output == OutputFormat::Text {
        workspace.print_header();
        if yes {
            println!("{}", "Destroying...".red().bold());
        } else {
            println!("{}", "Resources that would be deleted:".yellow());
        }
        println!();
    }

    let gateway = workspace.connect().await?;
    let options = EnsureOptions {
        wait: workspace.blueprint.wait_config(),
        drift: workspace.blueprint.drift,
        dry_run: !yes,
    };
    let span = tracing::info_span!(
        "destroy",
        blueprint = %workspace.path.display(),
        dry_run = !yes,
    );
    let reconciler = Reconciler::new(gateway)
        .with_options(options)
        .with_span(span)
        .with_cancellation(cancel);

    let report = reconciler.destroy(&graph, &roots).await?;
    match output {
        OutputFormat::Text => print!("{}", report::render_teardown(&report, !yes)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report::teardown_json(&report))?),
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(exit::TEARDOWN_FAILED))
    }
}
