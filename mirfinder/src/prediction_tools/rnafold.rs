use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use regex::Regex;
use tracing::{debug, error};

use crate::error::{MirnaError, Result};

/// Minimum free energy fold of one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    /// Dot-bracket string, one symbol per nucleotide.
    pub structure: String,
    /// Minimum free energy in kcal/mol.
    pub mfe: f64,
}

/// Predicts the MFE secondary structure of a nucleotide sequence.
pub trait StructurePredictor: Send + Sync {
    fn fold(&self, seq: &str) -> Result<Fold>;
}

/// Vienna `RNAfold`, run as a child process per sequence.
#[derive(Debug, Clone)]
pub struct RnaFold {
    executable: PathBuf,
    line_re: Regex,
}

impl RnaFold {
    /// Locate `RNAfold` on the PATH.
    pub fn from_path() -> Result<Self> {
        let executable = which::which("RNAfold").map_err(|e| {
            MirnaError::Config(format!(
                "RNAfold not found on PATH ({e}); install the ViennaRNA package"
            ))
        })?;
        Ok(Self::with_executable(executable))
    }

    pub fn with_executable(executable: PathBuf) -> Self {
        Self {
            executable,
            line_re: structure_line_regex(),
        }
    }
}

fn structure_line_regex() -> Regex {
    Regex::new(r"^([().\[\]{}<>]+)\s*\(\s*(-?\d+(?:\.\d+)?)\s*\)\s*$").expect("valid RNAfold regex")
}

/// Parse RNAfold's stdout: the echoed sequence followed by `STRUCTURE ( -12.30)`.
pub fn parse_rnafold_output(stdout: &str, line_re: &Regex) -> Result<Fold> {
    for line in stdout.lines() {
        if let Some(caps) = line_re.captures(line.trim()) {
            let mfe = caps[2]
                .parse::<f64>()
                .map_err(|e| MirnaError::Fold(format!("bad energy '{}': {e}", &caps[2])))?;
            return Ok(Fold {
                structure: caps[1].to_string(),
                mfe,
            });
        }
    }
    Err(MirnaError::Fold(format!("unexpected RNAfold output:\n{stdout}")))
}

impl StructurePredictor for RnaFold {
    fn fold(&self, seq: &str) -> Result<Fold> {
        let mut child = Command::new(&self.executable)
            .arg("--noPS")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MirnaError::Fold(format!("could not spawn RNAfold: {e}")))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| MirnaError::Fold("failed to open RNAfold stdin".into()))?;
            writeln!(stdin, "{seq}")?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("RNAfold failed: {stderr}");
            return Err(MirnaError::Fold(format!("RNAfold exited with {}", output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let fold = parse_rnafold_output(&stdout, &self.line_re)?;
        debug!("{} {} ({:.2})", seq, fold.structure, fold.mfe);
        Ok(fold)
    }
}
