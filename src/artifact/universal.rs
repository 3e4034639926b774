//! Fusing single-architecture macOS libraries into one universal binary.

use anyhow::{bail, Result};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use super::filesystem::remove_path;
use crate::build::{library_file_name, LibraryStager};
use crate::config::{BuildMode, Platform};
use crate::error::ReleaseError;
use crate::process::{Cmd, Runner};

/// Architecture label of an assembled library.
pub const UNIVERSAL_ARCH: &str = "universal";

pub struct UniversalBinaryAssembler<'a> {
    runner: &'a dyn Runner,
    tool: String,
    module: String,
    output_dir: PathBuf,
}

impl<'a> UniversalBinaryAssembler<'a> {
    pub fn new(
        runner: &'a dyn Runner,
        tool: impl Into<String>,
        module: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            tool: tool.into(),
            module: module.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Where the universal library for `mode` is written.
    pub fn output_path(&self, mode: BuildMode) -> PathBuf {
        self.output_dir.join(library_file_name(
            &self.module,
            Platform::Macos,
            mode,
            UNIVERSAL_ARCH,
            ".dylib",
        ))
    }

    /// Merge the staged `archs` libraries of `mode` into one binary.
    ///
    /// The inputs are deleted only after the merge tool succeeds. On failure
    /// they stay in place and no output file is left behind.
    pub fn assemble(
        &self,
        platform: Platform,
        mode: BuildMode,
        archs: &[String],
        stager: &LibraryStager,
    ) -> Result<PathBuf> {
        if platform != Platform::Macos || archs.len() < 2 {
            return Err(ReleaseError::Configuration(format!(
                "a universal binary needs macos and at least two architectures, got {platform} with {}",
                archs.len()
            ))
            .into());
        }

        let inputs: Vec<PathBuf> = archs
            .iter()
            .map(|arch| stager.staged_path(mode, arch))
            .collect();
        for input in &inputs {
            if !input.is_file() {
                bail!("staged library '{}' does not exist", input.display());
            }
        }

        let output = self.output_path(mode);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        println!("Assembling universal {}...", mode.template_name());
        let mut cmd = Cmd::new(&self.tool).arg("-create");
        for input in &inputs {
            cmd = cmd.arg_path(input);
        }
        let cmd = cmd.arg("-output").arg_path(&output);

        let result = self.runner.run(&cmd)?;
        if !result.success() {
            remove_path(&output)?;
            warn!(inputs = ?inputs, "merge failed, keeping single-architecture inputs");
            return Err(ReleaseError::Merge {
                command: cmd.display(),
                code: result.exit_description(),
            }
            .into());
        }
        if !output.is_file() {
            bail!(
                "`{}` succeeded but wrote no '{}'",
                cmd.display(),
                output.display()
            );
        }

        for input in &inputs {
            remove_path(input)?;
        }
        info!(output = %output.display(), "universal binary assembled");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildTarget;
    use crate::testutil::RecordingRunner;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        stager: LibraryStager,
        archs: Vec<String>,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let stager = LibraryStager::new(
            "m8gd",
            Platform::Macos,
            ".dylib",
            temp.path().join("project/bin"),
            temp.path().join("build"),
        );
        let archs = vec!["x86_64".to_string(), "arm64".to_string()];
        fs::create_dir_all(temp.path().join("build")).unwrap();
        for arch in &archs {
            fs::write(stager.staged_path(BuildMode::Release, arch), arch).unwrap();
        }
        Fixture {
            temp,
            stager,
            archs,
        }
    }

    fn inputs(f: &Fixture) -> Vec<PathBuf> {
        f.archs
            .iter()
            .map(|a| f.stager.staged_path(BuildMode::Release, a))
            .collect()
    }

    #[test]
    fn success_keeps_only_the_universal_binary() {
        let f = fixture();
        let out_dir = f.temp.path().join("project/bin");
        let expected = out_dir.join("libm8gd.macos.template_release.universal.dylib");
        let runner = RecordingRunner::new().creates("lipo -create", &expected);
        let assembler = UniversalBinaryAssembler::new(&runner, "lipo", "m8gd", &out_dir);

        let output = assembler
            .assemble(Platform::Macos, BuildMode::Release, &f.archs, &f.stager)
            .unwrap();

        assert_eq!(output, expected);
        assert!(output.is_file());
        for input in inputs(&f) {
            assert!(!input.exists());
        }
        let line = &runner.lines()[0];
        assert!(line.starts_with("lipo -create "));
        assert!(line.contains("libm8gd.macos.template_release.x86_64.dylib"));
        assert!(line.contains("libm8gd.macos.template_release.arm64.dylib"));
        assert!(line.ends_with(&format!("-output {}", expected.display())));
    }

    #[test]
    fn failure_keeps_inputs_and_leaves_no_output() {
        let f = fixture();
        let out_dir = f.temp.path().join("project/bin");
        let assembler_out = out_dir.join("libm8gd.macos.template_release.universal.dylib");
        fs::create_dir_all(&out_dir).unwrap();
        fs::write(&assembler_out, "partial").unwrap();

        let runner = RecordingRunner::new().fail_on("lipo", 1);
        let assembler = UniversalBinaryAssembler::new(&runner, "lipo", "m8gd", &out_dir);
        let err = assembler
            .assemble(Platform::Macos, BuildMode::Release, &f.archs, &f.stager)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ReleaseError>(),
            Some(ReleaseError::Merge { .. })
        ));
        assert!(!assembler_out.exists());
        for (input, arch) in inputs(&f).iter().zip(&f.archs) {
            assert_eq!(fs::read_to_string(input).unwrap(), *arch);
        }
    }

    #[test]
    fn single_architecture_is_rejected() {
        let f = fixture();
        let runner = RecordingRunner::new();
        let assembler = UniversalBinaryAssembler::new(&runner, "lipo", "m8gd", f.temp.path());
        let err = assembler
            .assemble(
                Platform::Macos,
                BuildMode::Release,
                &f.archs[..1],
                &f.stager,
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReleaseError>(),
            Some(ReleaseError::Configuration(_))
        ));
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn staged_then_assembled() {
        let temp = TempDir::new().unwrap();
        let bin = temp.path().join("project/bin");
        fs::create_dir_all(&bin).unwrap();
        let stager = LibraryStager::new("m8gd", Platform::Macos, ".dylib", &bin, temp.path().join("build"));

        for arch in ["x86_64", "arm64"] {
            let before = stager.snapshot().unwrap();
            fs::write(bin.join(format!("libm8gd.{arch}.dylib")), arch).unwrap();
            let target = BuildTarget::new(BuildMode::Debug, Some(Platform::Macos), Some(arch));
            stager.stage(&target, &before).unwrap();
        }

        let expected = bin.join("libm8gd.macos.template_debug.universal.dylib");
        let runner = RecordingRunner::new().creates("-create", &expected);
        let archs = vec!["x86_64".to_string(), "arm64".to_string()];
        let output = UniversalBinaryAssembler::new(&runner, "lipo", "m8gd", &bin)
            .assemble(Platform::Macos, BuildMode::Debug, &archs, &stager)
            .unwrap();
        assert_eq!(output, expected);
        assert!(!stager.staged_path(BuildMode::Debug, "arm64").exists());
    }
}
