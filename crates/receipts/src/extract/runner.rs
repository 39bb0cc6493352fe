//! Subprocess execution for the external OCR and PDF tools.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::ExtractError;
use crate::sanitize::excerpt_bytes;

const STDERR_EXCERPT_CHARS: usize = 500;

/// Captured output of a successful tool run.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Runs an external program to completion.
///
/// A non-zero exit is reported as [`ExtractError::ExternalTool`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ExtractError>;
}

/// Production runner backed by `tokio::process`.
///
/// Children are killed when the awaiting future is dropped, so a job that
/// hits its timeout does not leave a stray `tesseract` behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

#[async_trait]
impl CommandRunner for TokioRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ExtractError> {
        let started = Instant::now();
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExtractError::ToolSpawn {
                tool: program.to_string(),
                source: e,
            })?;

        debug!(
            tool = program,
            status = %output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "external tool finished"
        );

        if !output.status.success() {
            return Err(ExtractError::ExternalTool {
                tool: program.to_string(),
                status: output.status.to_string(),
                stderr: excerpt_bytes(&output.stderr, STDERR_EXCERPT_CHARS),
            });
        }

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner for unit tests.

    use std::path::Path;
    use std::sync::Mutex;

    use super::*;

    type Handler = Box<dyn Fn(&[String]) -> Result<CommandOutput, ExtractError> + Send + Sync>;

    /// Dispatches on program name and records every invocation.
    #[derive(Default)]
    pub struct ScriptedRunner {
        handlers: Vec<(String, Handler)>,
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on<F>(mut self, program: &str, handler: F) -> Self
        where
            F: Fn(&[String]) -> Result<CommandOutput, ExtractError> + Send + Sync + 'static,
        {
            self.handlers.push((program.to_string(), Box::new(handler)));
            self
        }

        pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p == program)
                .map(|(_, a)| a.clone())
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
        ) -> Result<CommandOutput, ExtractError> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            match self.handlers.iter().find(|(p, _)| p == program) {
                Some((_, handler)) => handler(args),
                None => Err(ExtractError::ToolSpawn {
                    tool: program.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not scripted"),
                }),
            }
        }
    }

    pub fn stdout(text: &str) -> Result<CommandOutput, ExtractError> {
        Ok(CommandOutput {
            stdout: text.as_bytes().to_vec(),
            stderr: Vec::new(),
        })
    }

    pub fn failure(tool: &str, stderr: &str) -> Result<CommandOutput, ExtractError> {
        Err(ExtractError::ExternalTool {
            tool: tool.to_string(),
            status: "exit status: 1".to_string(),
            stderr: stderr.to_string(),
        })
    }

    pub fn touch(path: &Path, bytes: &[u8]) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, bytes).unwrap();
    }
}
