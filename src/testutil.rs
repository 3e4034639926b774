//! Fakes for exercising the pipeline without real build tools or network.

use anyhow::Result;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::process::{Cmd, CommandResult, Runner};
use crate::toolchain::Fetcher;

/// Write a zip archive containing `entries` (path, contents).
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    for (name, contents) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

/// Runner that records every command instead of spawning it.
///
/// Commands whose rendered line contains a configured needle exit with the
/// configured code; on success they may create files, standing in for the
/// outputs a real tool would write.
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<Cmd>>,
    failures: Vec<(String, i32)>,
    outputs: Vec<(String, PathBuf)>,
    programs: HashMap<String, PathBuf>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `needle` exit with `code`.
    pub fn fail_on(mut self, needle: &str, code: i32) -> Self {
        self.failures.push((needle.to_string(), code));
        self
    }

    /// Successful commands containing `needle` create `path`.
    pub fn creates(mut self, needle: &str, path: impl Into<PathBuf>) -> Self {
        self.outputs.push((needle.to_string(), path.into()));
        self
    }

    /// `locate(name)` returns `path`.
    pub fn with_program(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.programs.insert(name.to_string(), path.into());
        self
    }

    pub fn commands(&self) -> Vec<Cmd> {
        self.commands.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.commands().iter().map(Cmd::display).collect()
    }

    /// Number of recorded commands containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(needle)).count()
    }
}

impl Runner for RecordingRunner {
    fn run(&self, cmd: &Cmd) -> Result<CommandResult> {
        self.commands.lock().unwrap().push(cmd.clone());
        let line = cmd.display();

        let code = self
            .failures
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, code)| *code)
            .unwrap_or(0);

        if code == 0 {
            for (needle, path) in &self.outputs {
                if line.contains(needle.as_str()) {
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(path, line.as_bytes())?;
                }
            }
        }

        Ok(CommandResult {
            code: Some(code),
            stdout: cmd.is_capturing().then(String::new),
            stderr: cmd.is_capturing().then(String::new),
        })
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.programs.get(program).cloned()
    }
}

/// Fetcher that serves one fixed zip archive and counts requests.
pub struct CountingFetcher {
    entries: Vec<(String, String)>,
    calls: AtomicUsize,
}

impl CountingFetcher {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(name, contents)| (name.to_string(), contents.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for CountingFetcher {
    fn fetch(&self, _url: &str, dest: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let entries: Vec<(&str, &str)> = self
            .entries
            .iter()
            .map(|(n, c)| (n.as_str(), c.as_str()))
            .collect();
        write_zip(dest, &entries);
        Ok(())
    }
}
