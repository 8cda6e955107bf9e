//! Wraps the two external binaries the workflow delegates to: `age-keygen`
//! for key material and `sops` for the actual encrypt/decrypt. Everything
//! runs as a blocking subprocess with captured output; no timeouts, no
//! retries.

use std::process::Command;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("sops failed: {0}")]
    Tool(String),
}

/// Captured result of one finished subprocess.
#[derive(Debug)]
pub struct ProcessOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Seam between command construction and actual process execution, so the
/// invocation logic is testable without the real binaries installed.
pub trait ProcessRunner {
    fn run(&self, program: &str, args: &[&str], env: &[(&str, &str)]) -> Result<ProcessOutput>;
}

/// Runs subprocesses for real via `std::process::Command`.
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], env: &[(&str, &str)]) -> Result<ProcessOutput> {
        let output = Command::new(program)
            .args(args)
            .envs(env.iter().copied())
            .output()
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;
        Ok(ProcessOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

impl Direction {
    fn flag(self) -> &'static str {
        match self {
            Direction::Encrypt => "-e",
            Direction::Decrypt => "-d",
        }
    }
}

/// Environment variable sops reads the identity-file location from. Set on
/// the subprocess only, never on the calling process.
pub const SOPS_AGE_KEY_ENV: &str = "SOPS_AGE_KEY_FILE";

/// Writes a fresh private key to `output_path`, then derives and returns
/// the matching public key. Either `age-keygen` failure surfaces its
/// stderr as the error detail.
pub fn generate_key_pair(runner: &dyn ProcessRunner, output_path: &str) -> Result<String> {
    let generated = runner.run("age-keygen", &["-o", output_path], &[])?;
    if !generated.success {
        return Err(ExecError::KeyGeneration(generated.stderr.trim().to_string()));
    }

    let derived = runner.run("age-keygen", &["-y", output_path], &[])?;
    if !derived.success {
        return Err(ExecError::KeyGeneration(derived.stderr.trim().to_string()));
    }
    Ok(derived.stdout.trim().to_string())
}

/// Runs sops over `file` in the given direction, treating the content as
/// dotenv on both sides. Stdout is the transformed content on success.
pub fn sops_transform(
    runner: &dyn ProcessRunner,
    direction: Direction,
    file: &str,
    config_path: &str,
    identity_file: &str,
) -> Result<String> {
    let output = runner.run(
        "sops",
        &[
            "--config",
            config_path,
            "--input-type",
            "dotenv",
            "--output-type",
            "dotenv",
            direction.flag(),
            file,
        ],
        &[(SOPS_AGE_KEY_ENV, identity_file)],
    )?;
    if !output.success {
        return Err(ExecError::Tool(output.stderr.trim().to_string()));
    }
    Ok(output.stdout)
}
