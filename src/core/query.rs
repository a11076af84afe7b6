//! Command construction and remote record shapes.
//!
//! [`CommandBuilder`] produces the exact command lines handed to the gateway:
//! SOQL queries (data and tooling API), `org display` and `project retrieve start`.
//! The record types mirror the minimal subset of the CLI's JSON that the caches
//! consume.

use crate::core::component::{ComponentIdentity, ComponentKind};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::Path;

/// Builds CLI command lines for a configured binary and optional target org
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    binary: String,
    target_org: Option<String>,
}

impl CommandBuilder {
    pub fn new(binary: impl Into<String>, target_org: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            target_org,
        }
    }

    fn with_target_org(&self, mut command: String) -> String {
        if let Some(org) = &self.target_org {
            command.push_str(" --target-org ");
            command.push_str(&quote_arg(org));
        }
        command.push_str(" --json");
        command
    }

    pub fn org_display(&self) -> String {
        self.with_target_org(format!("{} org display", self.binary))
    }

    pub fn query(&self, soql: &str, tooling: bool) -> String {
        let mut command = format!("{} data query --query {}", self.binary, quote_arg(soql));
        if tooling {
            command.push_str(" --use-tooling-api");
        }
        self.with_target_org(command)
    }

    /// Last-modified query for every name of one kind
    pub fn metadata_status_query(&self, kind: ComponentKind, names: &[String]) -> String {
        let quoted: Vec<String> = names.iter().map(|n| soql_literal(n)).collect();
        let soql = format!(
            "SELECT {field}, LastModifiedBy.Name, LastModifiedDate, CreatedBy.Name, CreatedDate \
             FROM {object} WHERE {field} IN ({names})",
            field = kind.name_field(),
            object = kind.query_object(),
            names = quoted.join(","),
        );
        self.query(&soql, kind.uses_tooling_api())
    }

    pub fn component_id_query(&self, identity: &ComponentIdentity) -> String {
        let soql = format!(
            "SELECT Id FROM {object} WHERE {field} = {name} LIMIT 1",
            object = identity.kind.query_object(),
            field = identity.kind.name_field(),
            name = soql_literal(&identity.name),
        );
        self.query(&soql, true)
    }

    pub fn coverage_query(&self, component_id: &str) -> String {
        let soql = format!(
            "SELECT ApexClassOrTriggerId, NumLinesCovered, NumLinesUncovered, Coverage \
             FROM ApexCodeCoverageAggregate WHERE ApexClassOrTriggerId = {}",
            soql_literal(component_id)
        );
        self.query(&soql, true)
    }

    /// Retrieve source for several components into `output_dir`
    pub fn retrieve(&self, identities: &[ComponentIdentity], output_dir: &Path) -> String {
        let mut command = format!("{} project retrieve start", self.binary);
        for identity in identities {
            command.push_str(" --metadata ");
            command.push_str(&quote_arg(&format!(
                "{}:{}",
                identity.kind.metadata_type(),
                identity.name
            )));
        }
        command.push_str(" --output-dir ");
        command.push_str(&quote_arg(&output_dir.to_string_lossy()));
        self.with_target_org(command)
    }
}

/// Quote a SOQL string literal
pub fn soql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Quote a shell argument with double quotes
pub fn quote_arg(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
        .replace('`', "\\`");
    format!("\"{escaped}\"")
}

/// Parse the org's datetime format (`2024-01-15T10:30:00.000+0000`) or RFC 3339
pub fn parse_org_datetime(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct QueryResult<T> {
    #[serde(default)]
    pub records: Vec<T>,
    #[serde(rename = "totalSize", default)]
    pub total_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    #[serde(rename = "Name")]
    pub name: Option<String>,
}

/// One row of a last-modified query
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataRecord {
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "DeveloperName")]
    pub developer_name: Option<String>,
    #[serde(rename = "LastModifiedBy")]
    pub last_modified_by: Option<UserRef>,
    #[serde(rename = "LastModifiedDate")]
    pub last_modified_date: Option<String>,
    #[serde(rename = "CreatedBy")]
    pub created_by: Option<UserRef>,
    #[serde(rename = "CreatedDate")]
    pub created_date: Option<String>,
}

impl MetadataRecord {
    pub fn api_name(&self) -> Option<&str> {
        self.developer_name.as_deref().or(self.name.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdRecord {
    #[serde(rename = "Id")]
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoverageLines {
    #[serde(rename = "coveredLines", default)]
    pub covered_lines: Vec<u32>,
    #[serde(rename = "uncoveredLines", default)]
    pub uncovered_lines: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoverageRecord {
    #[serde(rename = "NumLinesCovered")]
    pub num_lines_covered: Option<u32>,
    #[serde(rename = "NumLinesUncovered")]
    pub num_lines_uncovered: Option<u32>,
    #[serde(rename = "Coverage")]
    pub coverage: Option<CoverageLines>,
}

/// Result body of `project retrieve start --json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrieveResult {
    #[serde(default)]
    pub files: Vec<RetrievedFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievedFile {
    #[serde(rename = "fullName")]
    pub full_name: String,
    #[serde(rename = "filePath")]
    pub file_path: Option<String>,
    #[serde(rename = "type", default)]
    pub component_type: Option<String>,
}

/// Result body of `org display --json`
#[derive(Debug, Clone, Deserialize)]
pub struct OrgDisplay {
    pub username: Option<String>,
    pub alias: Option<String>,
    #[serde(rename = "connectedStatus")]
    pub connected_status: Option<String>,
}
