//! Shared fixtures for the integration tests: a scratch directory holding documents
//! and a run context rooted in it.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use livedoc::prelude::*;
use livedoc::report::{CollectingReporter, Reporter};
use tempfile::TempDir;

pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create scratch directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create document directory");
        }
        std::fs::write(&path, text).expect("write document");
        path
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(relative)).expect("read document")
    }

    pub fn remove(&self, relative: &str) {
        std::fs::remove_file(self.dir.path().join(relative)).expect("remove document");
    }

    pub fn config(&self) -> HarnessConfig {
        HarnessConfig::default()
            .with_root(self.path())
            .with_working_dir(self.path())
            .with_colors(false)
    }

    pub fn context(&self) -> Arc<RunContext> {
        self.context_with(self.config(), Box::new(SilentReporter))
    }

    pub fn collecting_context(&self, config: HarnessConfig) -> (Arc<RunContext>, CollectingReporter) {
        let collector = CollectingReporter::new();
        (self.context_with(config, Box::new(collector.clone())), collector)
    }

    pub fn context_with(&self, config: HarnessConfig, reporter: Box<dyn Reporter>) -> Arc<RunContext> {
        Arc::new(RunContext::with_reporter(config, reporter).expect("valid run context"))
    }
}

/// Registry with a single verification function on declaring type `Docs`.
pub fn registry_with(method: &str, specs: Vec<TestSpec>, verification: Verification) -> Registry {
    let mut registry = Registry::new();
    registry
        .register("Docs", method, specs, verification)
        .expect("valid registration");
    registry
}

pub fn statuses(report: &RunReport) -> Vec<Status> {
    report.outcomes.iter().map(|o| o.status).collect()
}
