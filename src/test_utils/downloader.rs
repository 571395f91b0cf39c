//! Scriptable stand-in for the downloader binary (unix only).
//!
//! Installs a `/bin/sh` script under the downloader's binary name. Each
//! invocation bumps a counter file, prints a version line and progress, and
//! then fails, writes nothing, writes garbage, or copies a prepared package to
//! the path passed after `-download-path`.

use crate::constants::{DOWNLOAD_PATH_FLAG, DOWNLOADER_BINARY};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct FakeDownloader {
    tool_dir: PathBuf,
    package: PathBuf,
    version: Option<String>,
    fail_first: u32,
    corrupt_first: u32,
    skip_output_first: u32,
}

impl FakeDownloader {
    /// A downloader in `tool_dir` that delivers `package`.
    pub fn new(tool_dir: impl Into<PathBuf>, package: impl Into<PathBuf>) -> Self {
        Self {
            tool_dir: tool_dir.into(),
            package: package.into(),
            version: None,
            fail_first: 0,
            corrupt_first: 0,
            skip_output_first: 0,
        }
    }

    /// Print `(version <v>)` on every invocation.
    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// Exit non-zero on the first `n` invocations.
    pub fn fail_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    /// Produce a file that is not a zip archive on the first `n` invocations.
    pub fn corrupt_first(mut self, n: u32) -> Self {
        self.corrupt_first = n;
        self
    }

    /// Exit successfully without writing the package on the first `n`
    /// invocations.
    pub fn skip_output_first(mut self, n: u32) -> Self {
        self.skip_output_first = n;
        self
    }

    fn counter_path(&self) -> PathBuf {
        self.tool_dir.join("invocations")
    }

    /// Write the script and return its path.
    pub fn install(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.tool_dir)?;
        let binary = self.tool_dir.join(DOWNLOADER_BINARY);

        let version_line = match &self.version {
            Some(v) => format!("echo \"Fetching latest server build (version {v})\""),
            None => "echo \"Fetching latest server build\"".to_string(),
        };

        let script = format!(
            r#"#!/bin/sh
count_file='{counter}'
n=$(cat "$count_file" 2>/dev/null || echo 0)
n=$((n + 1))
echo "$n" > "$count_file"
dest=""
while [ $# -gt 0 ]; do
  if [ "$1" = "{flag}" ]; then
    dest="$2"
    shift
  fi
  shift
done
{version_line}
if [ "$n" -le {fail_first} ]; then
  echo "error: connection reset" >&2
  exit 1
fi
printf 'Downloading... 50%%\r'
printf 'Downloading... 100%%\n'
if [ "$n" -le {skip_output_first} ]; then
  exit 0
fi
if [ "$n" -le {corrupt_first} ]; then
  echo "not a zip" > "$dest"
  exit 0
fi
cp '{package}' "$dest"
echo "Download complete" >&2
"#,
            counter = self.counter_path().display(),
            flag = DOWNLOAD_PATH_FLAG,
            version_line = version_line,
            fail_first = self.fail_first,
            corrupt_first = self.corrupt_first,
            skip_output_first = self.skip_output_first,
            package = self.package.display(),
        );

        fs::write(&binary, script)
            .with_context(|| format!("Failed to write fake downloader {}", binary.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&binary, fs::Permissions::from_mode(0o755))?;
        }

        Ok(binary)
    }

    /// How many times the script ran.
    pub fn invocations(&self) -> u32 {
        read_counter(&self.counter_path())
    }
}

fn read_counter(path: &Path) -> u32 {
    fs::read_to_string(path).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(0)
}
