//! Scripted org for integration tests
//!
//! [`FakeOrg`] implements the command gateway by reading the command text the
//! tracker builds: it answers `org display`, last-modified and coverage queries
//! from an in-memory component list, and writes retrieved source into the
//! requested output directory the way `project retrieve start` does. Every
//! command is recorded so tests can count remote calls.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use sf_sync_tracker::core::{
    component::ComponentKind,
    error::{Result, SyncError},
    gateway::CommandGateway,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RemoteComponent {
    pub kind: ComponentKind,
    pub name: String,
    pub last_modified_by: String,
    pub last_modified_at: DateTime<Utc>,
    /// File name (relative to the component folder) and content
    pub files: Vec<(String, String)>,
    pub coverage: Option<(Vec<u32>, Vec<u32>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandClass {
    OrgDisplay,
    Query,
    Retrieve,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Timeout,
    Process,
    Garbage,
}

pub fn command_class(command: &str) -> CommandClass {
    if command.contains(" org display") {
        CommandClass::OrgDisplay
    } else if command.contains(" data query") {
        CommandClass::Query
    } else if command.contains(" project retrieve start") {
        CommandClass::Retrieve
    } else {
        CommandClass::Other
    }
}

pub struct FakeOrg {
    username: String,
    components: Mutex<Vec<RemoteComponent>>,
    commands: Mutex<Vec<String>>,
    timeline: Mutex<Vec<String>>,
    delays: Mutex<Vec<(String, Duration)>>,
    failures: Mutex<HashMap<CommandClass, Failure>>,
    connection_error: Mutex<Option<(String, String)>>,
}

impl FakeOrg {
    pub fn new() -> Self {
        Self {
            username: "dev@example.com".to_string(),
            components: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            timeline: Mutex::new(Vec::new()),
            delays: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            connection_error: Mutex::new(None),
        }
    }

    pub fn add(&self, component: RemoteComponent) {
        self.components.lock().push(component);
    }

    pub fn add_class(&self, name: &str, body: &str, modified_at: DateTime<Utc>) {
        self.add(RemoteComponent {
            kind: ComponentKind::ApexClass,
            name: name.to_string(),
            last_modified_by: "Ada Lovelace".to_string(),
            last_modified_at: modified_at,
            files: vec![(format!("{name}.cls"), body.to_string())],
            coverage: None,
        });
    }

    pub fn add_trigger(&self, name: &str, body: &str, modified_at: DateTime<Utc>) {
        self.add(RemoteComponent {
            kind: ComponentKind::ApexTrigger,
            name: name.to_string(),
            last_modified_by: "Grace Hopper".to_string(),
            last_modified_at: modified_at,
            files: vec![(format!("{name}.trigger"), body.to_string())],
            coverage: None,
        });
    }

    pub fn add_lwc(&self, name: &str, files: &[(&str, &str)], modified_at: DateTime<Utc>) {
        self.add(RemoteComponent {
            kind: ComponentKind::LwcBundle,
            name: name.to_string(),
            last_modified_by: "Ada Lovelace".to_string(),
            last_modified_at: modified_at,
            files: files
                .iter()
                .map(|(f, c)| (f.to_string(), c.to_string()))
                .collect(),
            coverage: None,
        });
    }

    pub fn set_coverage(&self, name: &str, covered: Vec<u32>, uncovered: Vec<u32>) {
        for component in self.components.lock().iter_mut() {
            if component.name == name {
                component.coverage = Some((covered.clone(), uncovered.clone()));
            }
        }
    }

    /// Sleep before answering any command containing `pattern`
    pub fn delay(&self, pattern: &str, delay: Duration) {
        self.delays.lock().push((pattern.to_string(), delay));
    }

    pub fn fail(&self, class: CommandClass, failure: Failure) {
        self.failures.lock().insert(class, failure);
    }

    pub fn recover(&self, class: CommandClass) {
        self.failures.lock().remove(&class);
    }

    pub fn disconnect(&self, name: &str, message: &str) {
        *self.connection_error.lock() = Some((name.to_string(), message.to_string()));
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn count(&self, class: CommandClass) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| command_class(c) == class)
            .count()
    }

    /// `start <command>` / `end <command>` in execution order
    pub fn timeline(&self) -> Vec<String> {
        self.timeline.lock().clone()
    }

    pub fn reset_log(&self) {
        self.commands.lock().clear();
        self.timeline.lock().clear();
    }

    fn answer(&self, command: &str) -> Result<String> {
        match command_class(command) {
            CommandClass::OrgDisplay => Ok(self.answer_org_display()),
            CommandClass::Query => Ok(self.answer_query(command)),
            CommandClass::Retrieve => self.answer_retrieve(command),
            CommandClass::Other => Err(SyncError::process_failure(format!(
                "unexpected command: {command}"
            ))),
        }
    }

    fn answer_org_display(&self) -> String {
        match self.connection_error.lock().clone() {
            Some((name, message)) => {
                json!({"status": 1, "name": name, "message": message}).to_string()
            }
            None => json!({
                "status": 0,
                "result": {"username": self.username, "connectedStatus": "Connected"}
            })
            .to_string(),
        }
    }

    fn answer_query(&self, command: &str) -> String {
        let soql = quoted_values(command, "--query").into_iter().next().unwrap_or_default();
        let object = soql
            .split("FROM ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or_default()
            .to_string();
        let components = self.components.lock();

        let records: Vec<Value> = if object == "ApexCodeCoverageAggregate" {
            let id = between(&soql, "= '", "'").unwrap_or_default();
            components
                .iter()
                .enumerate()
                .filter(|(index, _)| fake_id(*index) == id)
                .filter_map(|(_, c)| c.coverage.clone())
                .map(|(covered, uncovered)| {
                    json!({
                        "NumLinesCovered": covered.len(),
                        "NumLinesUncovered": uncovered.len(),
                        "Coverage": {"coveredLines": covered, "uncoveredLines": uncovered}
                    })
                })
                .collect()
        } else if soql.starts_with("SELECT Id ") {
            let name = between(&soql, "= '", "'").unwrap_or_default();
            components
                .iter()
                .enumerate()
                .filter(|(_, c)| c.kind.query_object() == object && c.name.eq_ignore_ascii_case(&name))
                .map(|(index, _)| json!({"Id": fake_id(index)}))
                .collect()
        } else {
            let names: Vec<String> = between(&soql, "IN (", ")")
                .unwrap_or_default()
                .split(',')
                .map(|n| n.trim().trim_matches('\'').to_lowercase())
                .collect();
            components
                .iter()
                .filter(|c| c.kind.query_object() == object)
                .filter(|c| names.contains(&c.name.to_lowercase()))
                .map(|c| {
                    let mut record = serde_json::Map::new();
                    record.insert(c.kind.name_field().to_string(), json!(c.name));
                    record.insert("LastModifiedBy".into(), json!({"Name": c.last_modified_by}));
                    record.insert("LastModifiedDate".into(), json!(org_datetime(c.last_modified_at)));
                    record.insert("CreatedBy".into(), json!({"Name": c.last_modified_by}));
                    record.insert("CreatedDate".into(), json!(org_datetime(c.last_modified_at)));
                    Value::Object(record)
                })
                .collect()
        };

        json!({"status": 0, "result": {"records": records, "totalSize": records.len()}}).to_string()
    }

    fn answer_retrieve(&self, command: &str) -> Result<String> {
        let output_dir = quoted_values(command, "--output-dir")
            .into_iter()
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| SyncError::process_failure("missing --output-dir"))?;
        let components = self.components.lock();

        let mut files = Vec::new();
        let mut missing = Vec::new();
        for spec in quoted_values(command, "--metadata") {
            let Some((metadata_type, name)) = spec.split_once(':') else {
                continue;
            };
            let found = components.iter().find(|c| {
                c.kind.metadata_type() == metadata_type && c.name.eq_ignore_ascii_case(name)
            });
            match found {
                Some(component) => files.extend(write_component(&output_dir, component)?),
                None => missing.push((metadata_type.to_string(), name.to_string())),
            }
        }

        // Like the real CLI, one missing member fails the whole retrieval.
        if !missing.is_empty() {
            if let Some((metadata_type, name)) = missing.first() {
                return Ok(json!({
                    "status": 1,
                    "name": "RetrieveFailed",
                    "message": format!("Entity of type '{metadata_type}' named '{name}' cannot be found")
                })
                .to_string());
            }
        }

        Ok(format!(
            "Warning: sf update available\n{}",
            json!({"status": 0, "result": {"files": files}})
        ))
    }
}

impl Default for FakeOrg {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandGateway for FakeOrg {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<String> {
        self.commands.lock().push(command.to_string());
        self.timeline.lock().push(format!("start {command}"));

        let delay = self
            .delays
            .lock()
            .iter()
            .filter(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, d)| *d)
            .max();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().get(&command_class(command)).copied();
        let result = match failure {
            Some(Failure::Timeout) => Err(SyncError::timeout(command, timeout)),
            Some(Failure::Process) => Err(SyncError::process_failure("simulated CLI crash")),
            Some(Failure::Garbage) => Ok("<html>502 Bad Gateway</html>".to_string()),
            None => self.answer(command),
        };

        self.timeline.lock().push(format!("end {command}"));
        result
    }
}

fn fake_id(index: usize) -> String {
    format!("01pFAKE{index:08}")
}

fn org_datetime(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3f+0000").to_string()
}

fn between(text: &str, open: &str, close: &str) -> Option<String> {
    let start = text.find(open)? + open.len();
    let end = text[start..].find(close)? + start;
    Some(text[start..end].to_string())
}

/// Every `flag "value"` occurrence in a command line
fn quoted_values(command: &str, flag: &str) -> Vec<String> {
    let needle = format!("{flag} \"");
    let mut values = Vec::new();
    let mut rest = command;
    while let Some(position) = rest.find(&needle) {
        let after = &rest[position + needle.len()..];
        let Some(end) = after.find('"') else {
            break;
        };
        values.push(after[..end].to_string());
        rest = &after[end..];
    }
    values
}

fn component_folder(output_dir: &Path, component: &RemoteComponent) -> PathBuf {
    let base = output_dir.join("main/default");
    match component.kind {
        ComponentKind::ApexClass => base.join("classes"),
        ComponentKind::ApexTrigger => base.join("triggers"),
        ComponentKind::VfPage => base.join("pages"),
        ComponentKind::VfComponent => base.join("components"),
        ComponentKind::Flow => base.join("flows"),
        ComponentKind::LwcBundle => base.join("lwc").join(&component.name),
        ComponentKind::AuraBundle => base.join("aura").join(&component.name),
    }
}

fn write_component(output_dir: &Path, component: &RemoteComponent) -> Result<Vec<Value>> {
    let folder = component_folder(output_dir, component);
    fs::create_dir_all(&folder)?;

    let mut written = Vec::new();
    let mut entries: Vec<(String, String)> = component.files.clone();
    let descriptor = match component.kind {
        ComponentKind::LwcBundle => format!("{}.js-meta.xml", component.name),
        ComponentKind::Flow => String::new(),
        _ => format!("{}-meta.xml", component.files[0].0),
    };
    if !descriptor.is_empty() {
        entries.push((descriptor, "<meta/>".to_string()));
    }

    for (file, content) in entries {
        let path = folder.join(&file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        written.push(json!({
            "fullName": component.name,
            "type": component.kind.metadata_type(),
            "filePath": path.to_string_lossy(),
        }));
    }
    Ok(written)
}
