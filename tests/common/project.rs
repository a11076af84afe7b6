//! Temporary Salesforce project directories
//!
//! A [`TestProject`] is an `sfdx-project.json` root with a `force-app` package.
//! The `TempDir` must stay alive for the duration of the test.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SOURCE_DIR: &str = "force-app/main/default";

pub struct TestProject {
    pub temp_dir: TempDir,
    pub path: PathBuf,
}

impl TestProject {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `content` to `relative`, creating parent directories
    pub fn write(&self, relative: &str, content: &str) -> std::io::Result<PathBuf> {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(PathBuf::from(relative))
    }

    /// Apex class plus its descriptor; returns the class path relative to the root
    pub fn add_class(&self, name: &str, body: &str) -> std::io::Result<PathBuf> {
        self.write(
            &format!("{SOURCE_DIR}/classes/{name}.cls-meta.xml"),
            "<ApexClass><apiVersion>60.0</apiVersion></ApexClass>",
        )?;
        self.write(&format!("{SOURCE_DIR}/classes/{name}.cls"), body)
    }

    pub fn add_trigger(&self, name: &str, body: &str) -> std::io::Result<PathBuf> {
        self.write(
            &format!("{SOURCE_DIR}/triggers/{name}.trigger-meta.xml"),
            "<ApexTrigger><apiVersion>60.0</apiVersion></ApexTrigger>",
        )?;
        self.write(&format!("{SOURCE_DIR}/triggers/{name}.trigger"), body)
    }

    /// LWC bundle; returns the paths of the written files
    pub fn add_lwc(&self, name: &str, files: &[(&str, &str)]) -> std::io::Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (file, content) in files {
            written.push(self.write(&format!("{SOURCE_DIR}/lwc/{name}/{file}"), content)?);
        }
        self.write(
            &format!("{SOURCE_DIR}/lwc/{name}/{name}.js-meta.xml"),
            "<LightningComponentBundle/>",
        )?;
        Ok(written)
    }

    pub fn absolute(&self, relative: &Path) -> PathBuf {
        self.path.join(relative)
    }
}

pub fn setup_test_project() -> std::io::Result<TestProject> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().to_path_buf();
    fs::write(
        path.join("sfdx-project.json"),
        r#"{"packageDirectories":[{"path":"force-app","default":true}],"sourceApiVersion":"60.0"}"#,
    )?;
    fs::create_dir_all(path.join(SOURCE_DIR))?;
    Ok(TestProject { temp_dir, path })
}
