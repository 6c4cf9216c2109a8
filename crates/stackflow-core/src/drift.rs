//! Drift detection between desired and deployed templates

use crate::gateway::DeployedTemplate;
use crate::spec::{Parameters, Template};
use serde::{Deserialize, Serialize};
use similar::TextDiff;

/// CloudFormation masks `NoEcho` parameters as `****`, Heat masks hidden
/// ones as `******`
fn is_masked(value: &str) -> bool {
    value.len() >= 4 && value.bytes().all(|b| b == b'*')
}

/// What to do once drift has been detected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftPolicy {
    /// Update or replace according to the resource's update strategy
    #[default]
    Apply,
    /// Log the diff and leave the resource alone
    Warn,
    /// Abort the run
    Fail,
}

/// Difference between a spec and its deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub template_changed: bool,

    /// Parameters whose deployed value differs from the desired one
    pub changed_parameters: Vec<String>,

    /// Human-readable unified diff
    pub diff: String,
}

/// Compares a desired template and parameters against a deployment
///
/// Templates are compared structurally when both sides parse as YAML (which
/// covers JSON), byte for byte otherwise. Only parameters the resource spec sets are
/// compared.
pub fn detect(
    desired: &Template,
    desired_parameters: &Parameters,
    deployed: &DeployedTemplate,
) -> Option<Drift> {
    let desired_doc = parse_document(desired.body());
    let deployed_doc = parse_document(&deployed.body);

    let template_changed = match (&desired_doc, &deployed_doc) {
        (Some(desired), Some(deployed)) => desired != deployed,
        _ => desired.body() != deployed.body.as_slice(),
    };

    let changed_parameters: Vec<String> = desired_parameters
        .iter()
        .filter(|(key, value)| match deployed.parameters.get(*key) {
            Some(current) if is_masked(current) => false,
            Some(current) => current != *value,
            None => true,
        })
        .map(|(key, _)| key.clone())
        .collect();

    if !template_changed && changed_parameters.is_empty() {
        return None;
    }

    let mut diff = String::new();
    if template_changed {
        let (before, after) = match (desired_doc, deployed_doc) {
            (Some(desired), Some(deployed)) => (render(&deployed), render(&desired)),
            _ => (
                String::from_utf8_lossy(&deployed.body).into_owned(),
                String::from_utf8_lossy(desired.body()).into_owned(),
            ),
        };
        diff.push_str(
            &TextDiff::from_lines(&before, &after)
                .unified_diff()
                .context_radius(3)
                .header("deployed", &desired.path().display().to_string())
                .to_string(),
        );
    }
    for key in &changed_parameters {
        let current = deployed
            .parameters
            .get(key)
            .map(String::as_str)
            .unwrap_or("<unset>");
        diff.push_str(&format!(
            "parameter {}: {} -> {}\n",
            key, current, desired_parameters[key]
        ));
    }

    Some(Drift {
        template_changed,
        changed_parameters,
        diff,
    })
}

fn parse_document(body: &[u8]) -> Option<serde_yaml::Value> {
    serde_yaml::from_slice(body).ok()
}

fn render(doc: &serde_yaml::Value) -> String {
    serde_yaml::to_string(doc).unwrap_or_default()
}
