//! Subcommand implementations

use anyhow::{bail, Context, Result};
use docpolicy_core::{Document, PolicyId, SequenceId};
use docpolicy_engine::{
    ClassificationBatch, ClassificationPipeline, FileConfigurationSource, SnapshotStore,
};
use docpolicy_policy::{validate_policy, JsonSchemaValidator, Policy};
use docpolicy_telemetry::MetricsCollector;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::CliConfig;

fn build_pipeline(config: &CliConfig) -> ClassificationPipeline {
    let metrics = MetricsCollector::new();
    let store = SnapshotStore::new(Arc::new(FileConfigurationSource::new(&config.rules_path)))
        .with_settings(config.store_settings())
        .with_metrics(metrics.clone());

    ClassificationPipeline::builder(Arc::new(store))
        .settings(config.pipeline_settings())
        .metrics(metrics)
        .build()
}

/// Parse documents from a JSON array or a YAML list
pub fn parse_documents(content: &str, yaml: bool) -> Result<Vec<Document>> {
    if yaml {
        serde_yaml::from_str(content).context("Failed to parse documents as YAML")
    } else {
        serde_json::from_str(content).context("Failed to parse documents as JSON")
    }
}

fn read_documents(input: Option<&Path>) -> Result<Vec<Document>> {
    match input {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            parse_documents(&content, yaml)
        }
        None => {
            let mut content = String::new();
            std::io::stdin().read_to_string(&mut content)?;
            parse_documents(&content, false)
        }
    }
}

fn write_batch(batch: &ClassificationBatch, output: Option<&Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(batch)?;
    match output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", rendered),
    }
    Ok(())
}

pub async fn classify(
    config: &CliConfig,
    sequence: SequenceId,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let documents = read_documents(input)?;
    let pipeline = build_pipeline(config);

    let batch = pipeline.classify(sequence, documents).await?;
    if batch.degraded {
        warn!(fingerprint = %batch.fingerprint, "Classified with a degraded snapshot");
    }
    write_batch(&batch, output)?;

    let metrics = pipeline.metrics().snapshot();
    info!(
        documents = metrics.documents,
        matches = metrics.collection_matches,
        policies_applied = metrics.policies_applied,
        diagnostics = metrics.diagnostics,
        avg_latency_us = metrics.avg_latency_us(),
        "Classification complete"
    );
    Ok(())
}

pub async fn fingerprint(config: &CliConfig) -> Result<()> {
    let pipeline = build_pipeline(config);
    let snapshot = pipeline.get_snapshot().await?;
    let summary = snapshot.summary();

    println!("{}", snapshot.fingerprint());
    println!(
        "sequences={} collections={} conditions={} field_labels={} lexicons={} policies={} policy_types={}",
        summary.sequences,
        summary.collections,
        summary.conditions,
        summary.field_labels,
        summary.lexicons,
        summary.policies,
        summary.policy_types
    );
    Ok(())
}

/// Problems found in policy details, one line per policy
pub fn policy_problems(snapshot: &docpolicy_engine::EnvironmentSnapshot) -> Vec<String> {
    let validator = JsonSchemaValidator::new();
    snapshot
        .policies()
        .filter_map(|policy| {
            let policy_type = snapshot.policy_type(policy.type_id)?;
            validate_policy(&validator, policy, policy_type)
                .err()
                .map(|e| e.to_string())
        })
        .collect()
}

pub async fn validate(config: &CliConfig) -> Result<()> {
    let pipeline = build_pipeline(config);
    let snapshot = pipeline
        .get_snapshot()
        .await
        .with_context(|| format!("Invalid rule file {}", config.rules_path.display()))?;

    let problems = policy_problems(&snapshot);
    for problem in &problems {
        eprintln!("{}", problem);
    }
    if !problems.is_empty() {
        bail!("{} policies failed validation", problems.len());
    }

    println!(
        "{} is valid (fingerprint {})",
        config.rules_path.display(),
        snapshot.fingerprint()
    );
    Ok(())
}

pub async fn resolve(config: &CliConfig, policy_ids: &[PolicyId]) -> Result<()> {
    let pipeline = build_pipeline(config);
    let snapshot = pipeline.get_snapshot().await?;

    let mut policies: Vec<Policy> = Vec::with_capacity(policy_ids.len());
    for id in policy_ids {
        match snapshot.policy(*id) {
            Some(policy) => policies.push(policy.clone()),
            None => bail!("policy {} not found", id),
        }
    }

    for policy in pipeline.resolve_policies(policies)? {
        println!("{}\t{}\tpriority={}", policy.id, policy.name, policy.priority);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpolicy_engine::{EnvironmentSnapshot, RuleConfiguration};

    #[test]
    fn test_parse_documents_json_and_yaml() {
        let json = r#"[{"reference": "a", "fields": {"content": "hello", "tags": ["x", "y"]}}]"#;
        let docs = parse_documents(json, false).unwrap();
        assert_eq!(docs[0].field_values("content"), ["hello"]);
        assert_eq!(docs[0].field_values("tags"), ["x", "y"]);

        let yaml = "- reference: b\n  fields:\n    content: bye\n";
        let docs = parse_documents(yaml, true).unwrap();
        assert_eq!(docs[0].reference, "b");

        assert!(parse_documents("{", false).is_err());
    }

    #[test]
    fn test_policy_problems() {
        let config = RuleConfiguration::from_yaml(
            r#"
policies:
  - id: 1
    type_id: 1
    details:
      fieldActions:
        - name: status
          action: SET_FIELD_VALUE
          value: ok
  - id: 2
    type_id: 1
    details:
      fieldActions:
        - name: status
          action: DROP
          value: ok
policy_types:
  - id: 1
    short_name: MetadataPolicy
    handler: metadata_policy
    definition:
      type: object
      properties:
        fieldActions:
          type: array
          items:
            properties:
              action:
                enum: [SET_FIELD_VALUE, ADD_FIELD_VALUE]
"#,
        )
        .unwrap();
        let snapshot = EnvironmentSnapshot::build(config, uuid::Uuid::new_v4(), None).unwrap();

        let problems = policy_problems(&snapshot);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("policy 2 failed schema validation"));
    }
}
