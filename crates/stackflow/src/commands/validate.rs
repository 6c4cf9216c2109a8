use crate::GlobalArgs;
use crate::workspace::Workspace;
use colored::Colorize;
use stackflow_config::ProviderTarget;
use std::process::ExitCode;

/// Loads the blueprint and every template, then checks the dependency graph
///
/// Never contacts a provider.
pub fn handle(global: &GlobalArgs) -> anyhow::Result<ExitCode> {
    println!("{}", "Validating blueprint...".blue());

    let workspace = Workspace::load(global)?;
    workspace.print_header();

    let graph = workspace.graph()?;
    let order = graph.plan(&[])?;

    match workspace.blueprint.provider_target(&workspace.settings)? {
        ProviderTarget::OpenStack { cloud, .. } => {
            println!("Provider:  {} (cloud {})", "openstack".cyan(), cloud.cyan());
        }
        ProviderTarget::Aws { region, .. } => {
            let region = region.unwrap_or_else(|| "from environment".to_string());
            println!("Provider:  {} (region {})", "aws".cyan(), region.cyan());
        }
    }

    println!();
    println!("{}", format!("Resources ({}), in apply order:", order.len()).bold());
    for spec in &order {
        let mut notes = Vec::new();
        if spec.is_external() {
            notes.push("external".to_string());
        }
        if let Some(template) = spec.template() {
            notes.push(template.path().display().to_string());
        }
        if !spec.dependencies().is_empty() {
            notes.push(format!("after {}", spec.dependencies().join(", ")));
        }
        println!(
            "  • {} ({}){}",
            spec.name().cyan(),
            spec.kind(),
            if notes.is_empty() {
                String::new()
            } else {
                format!(" {}", notes.join("; ").dimmed())
            }
        );
    }

    println!();
    println!("{}", "✓ Blueprint is valid".green().bold());
    Ok(ExitCode::SUCCESS)
}
