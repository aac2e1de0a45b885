use std::{
    path::Path,
    process::{Command, Output},
};

use tracing::debug;

use super::{PackageVerifier, SignatureStatus};
use crate::error::IntegrityError;

/// Verifier that runs `rpm -K` against the package file.
#[derive(Debug, Clone)]
pub struct RpmCommandVerifier {
    program: String,
}

impl Default for RpmCommandVerifier {
    fn default() -> Self {
        Self::new("rpm")
    }
}

impl RpmCommandVerifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, path: &Path, args: &[&str]) -> std::io::Result<Output> {
        debug!("running {} {} {}", self.program, args.join(" "), path.display());
        Command::new(&self.program)
            .args(args)
            .arg(path)
            .env("LC_ALL", "C")
            .output()
    }
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text.trim().to_string()
}

/// Maps `rpm -K` output for `path` onto a [`SignatureStatus`].
///
/// Each line is matched without its leading `path:` so that package names
/// such as `python-rsa` don't read as signature markers.
pub(crate) fn classify_signature_output(
    path: &Path,
    success: bool,
    text: &str,
) -> SignatureStatus {
    let path = path.to_string_lossy();
    let text = text
        .lines()
        .map(|line| {
            let line = line.trim_start();
            line.strip_prefix(&*path)
                .and_then(|rest| rest.strip_prefix(':'))
                .unwrap_or(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
        .to_ascii_lowercase();
    if text.contains("missing key") || text.contains("no key") {
        return SignatureStatus::KeyUnavailable;
    }
    if text.contains("not trusted") {
        return SignatureStatus::KeyUntrusted;
    }
    if !success {
        return SignatureStatus::HeaderDamaged;
    }
    let signed = ["signatures ok", "pgp", "gpg", "rsa", "dsa"]
        .iter()
        .any(|marker| text.contains(marker));
    if signed {
        SignatureStatus::Valid
    } else {
        SignatureStatus::Unsigned
    }
}

impl PackageVerifier for RpmCommandVerifier {
    fn check_integrity(&self, path: &Path) -> Result<(), IntegrityError> {
        let output = self
            .run(path, &["-K", "--nosignature"])
            .map_err(|err| {
                IntegrityError::Command {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                }
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(IntegrityError::Command {
                path: path.to_path_buf(),
                message: combined_output(&output),
            })
        }
    }

    fn check_signature(&self, path: &Path) -> SignatureStatus {
        match self.run(path, &["-K"]) {
            Ok(output) => {
                let text = combined_output(&output);
                classify_signature_output(path, output.status.success(), &text)
            }
            Err(err) => {
                debug!("{} unavailable: {}", self.program, err);
                SignatureStatus::HeaderDamaged
            }
        }
    }
}
