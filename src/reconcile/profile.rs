//! # Provider Profiles
//!
//! A profile describes how one provider CLI is driven: the command, the
//! argument templates for create and status calls, the dry-run flag, and
//! how a dry-run's output is read as a qualification result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{ReconcileError, ReconcileResult};
use super::provider::ProviderOutput;
use crate::graph::AttributeSet;
use crate::ids::{LogicalId, SystemId};
use crate::model::PropPath;

/// One argument of a provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ArgTemplate {
    Literal(String),
    /// Resolved value of a property of the component on the call's system
    Attribute(PropPath),
    ComponentId,
    SystemId,
}

impl ArgTemplate {
    pub fn literal(value: impl Into<String>) -> Self {
        ArgTemplate::Literal(value.into())
    }

    pub fn attribute(path: impl Into<PropPath>) -> Self {
        ArgTemplate::Attribute(path.into())
    }
}

/// How a dry-run result is judged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "marker", rename_all = "camelCase")]
pub enum QualificationRule {
    StderrContains(String),
    StdoutContains(String),
    ExitZero,
}

impl QualificationRule {
    pub fn is_qualified(&self, output: &ProviderOutput) -> bool {
        match self {
            QualificationRule::StderrContains(marker) => output.stderr.contains(marker.as_str()),
            QualificationRule::StdoutContains(marker) => output.stdout.contains(marker.as_str()),
            QualificationRule::ExitZero => output.success(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub name: String,

    pub command: String,

    pub create_args: Vec<ArgTemplate>,

    pub status_args: Vec<ArgTemplate>,

    /// Appended to the create arguments for qualification
    #[serde(default)]
    pub dry_run_flag: Option<String>,

    pub qualification: QualificationRule,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ProviderProfile {
    /// EC2 instances through the AWS CLI. A successful dry run fails with
    /// `DryRunOperation`, so qualification reads stderr.
    pub fn aws_ec2() -> Self {
        use ArgTemplate as A;
        Self {
            name: "aws-ec2".into(),
            command: "aws".into(),
            create_args: vec![
                A::literal("ec2"),
                A::literal("run-instances"),
                A::literal("--region"),
                A::attribute("/domain/region"),
                A::literal("--image-id"),
                A::attribute("/domain/image_id"),
                A::literal("--instance-type"),
                A::attribute("/domain/instance_type"),
                A::literal("--output"),
                A::literal("json"),
            ],
            status_args: vec![
                A::literal("ec2"),
                A::literal("describe-instances"),
                A::literal("--region"),
                A::attribute("/domain/region"),
                A::literal("--instance-ids"),
                A::attribute("/resource/instance_id"),
                A::literal("--output"),
                A::literal("json"),
            ],
            dry_run_flag: Some("--dry-run".into()),
            qualification: QualificationRule::StderrContains(
                "An error occurred (DryRunOperation)".into(),
            ),
            env: BTreeMap::new(),
        }
    }

    /// Kubernetes objects through kubectl with server-side dry run.
    pub fn kubectl() -> Self {
        use ArgTemplate as A;
        Self {
            name: "kubectl".into(),
            command: "kubectl".into(),
            create_args: vec![
                A::literal("apply"),
                A::literal("--namespace"),
                A::attribute("/domain/namespace"),
                A::literal("-f"),
                A::attribute("/domain/manifest_path"),
                A::literal("-o"),
                A::literal("json"),
            ],
            status_args: vec![
                A::literal("get"),
                A::literal("--namespace"),
                A::attribute("/domain/namespace"),
                A::literal("-f"),
                A::attribute("/domain/manifest_path"),
                A::literal("-o"),
                A::literal("json"),
            ],
            dry_run_flag: Some("--dry-run=server".into()),
            qualification: QualificationRule::ExitZero,
            env: BTreeMap::new(),
        }
    }

    /// Renders templates for one component on one system.
    ///
    /// String values are passed as is; any other JSON value is passed in
    /// its compact encoding.
    pub fn render(
        &self,
        templates: &[ArgTemplate],
        component_id: LogicalId,
        system_id: SystemId,
        values: &AttributeSet,
    ) -> ReconcileResult<Vec<String>> {
        templates
            .iter()
            .map(|template| match template {
                ArgTemplate::Literal(value) => Ok(value.clone()),
                ArgTemplate::ComponentId => Ok(component_id.to_string()),
                ArgTemplate::SystemId => Ok(system_id.to_string()),
                ArgTemplate::Attribute(path) => {
                    match values.resolved(component_id, path.as_str(), system_id) {
                        Some(Value::String(value)) => Ok(value.clone()),
                        Some(Value::Null) | None => Err(ReconcileError::MissingAttribute {
                            component_id,
                            system_id,
                            path: path.clone(),
                        }),
                        Some(other) => Ok(other.to_string()),
                    }
                }
            })
            .collect()
    }

    /// Create arguments with the dry-run flag appended.
    pub fn render_qualification(
        &self,
        component_id: LogicalId,
        system_id: SystemId,
        values: &AttributeSet,
    ) -> ReconcileResult<Vec<String>> {
        let mut args = self.render(&self.create_args, component_id, system_id, values)?;
        args.extend(self.dry_run_flag.clone());
        Ok(args)
    }
}
