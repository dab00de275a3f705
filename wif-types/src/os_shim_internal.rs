/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Environment and file system access for the subject token suppliers
//!
//! Suppliers read token files, executable output files, AWS credentials, and the
//! executable gate through [`Fs`] and [`Env`], so tests can fake all of them without touching
//! the process.

use std::collections::HashMap;
use std::env::VarError;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Read-only view of the file system
///
/// # Example
/// Token files are read from disk:
/// ```rust
/// let fs = wif_types::os_shim_internal::Fs::real();
/// ```
///
/// In tests, a handful of paths are served from memory and every other path is missing:
/// ```rust
/// use wif_types::os_shim_internal::Fs;
/// let fs = Fs::from_slice(&[("/var/run/secrets/token", "eyJhbGciOi...")]);
/// assert_eq!(fs.read_to_end("/var/run/secrets/token").unwrap(), b"eyJhbGciOi...");
/// assert!(fs.read_to_end("/var/run/secrets/other").is_err());
/// ```
#[derive(Clone)]
pub struct Fs(Arc<FsSource>);

enum FsSource {
    Real,
    Fake(HashMap<OsString, Vec<u8>>),
}

impl Default for Fs {
    fn default() -> Self {
        Fs::real()
    }
}

impl fmt::Debug for Fs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // token files are secrets, so only their count is printed
        match self.0.as_ref() {
            FsSource::Real => f.write_str("Fs::Real"),
            FsSource::Fake(files) => write!(f, "Fs::Fake({} files)", files.len()),
        }
    }
}

impl Fs {
    pub fn real() -> Self {
        Fs(Arc::new(FsSource::Real))
    }

    /// In-memory files keyed by path
    pub fn from_slice(files: &[(&str, &str)]) -> Self {
        let files = files
            .iter()
            .map(|(path, contents)| ((*path).into(), contents.as_bytes().to_vec()))
            .collect();
        Fs(Arc::new(FsSource::Fake(files)))
    }

    /// Reads the whole file. A fake path that was never registered is `NotFound`.
    pub fn read_to_end(&self, path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
        let path = path.as_ref();
        match self.0.as_ref() {
            FsSource::Real => std::fs::read(path),
            FsSource::Fake(files) => files
                .get(path.as_os_str())
                .cloned()
                .ok_or_else(|| io::ErrorKind::NotFound.into()),
        }
    }
}

/// Process environment, real or faked
///
/// The real environment is global to the process, which a multi-threaded test runner cannot
/// isolate. A fake environment is a fixed map shared by every clone.
#[derive(Clone)]
pub struct Env(Arc<EnvSource>);

enum EnvSource {
    Real,
    Fake(HashMap<String, String>),
}

impl Default for Env {
    fn default() -> Self {
        Env::real()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // values may be secrets, so only the variable names are printed
        match self.0.as_ref() {
            EnvSource::Real => f.write_str("Env::Real"),
            EnvSource::Fake(vars) => f.debug_set().entries(vars.keys()).finish(),
        }
    }
}

impl Env {
    /// Delegates to [`std::env::var`]
    pub fn real() -> Self {
        Env(Arc::new(EnvSource::Real))
    }

    /// A fixed environment
    ///
    /// # Example
    /// ```rust
    /// use wif_types::os_shim_internal::Env;
    /// let env = Env::from_slice(&[
    ///     ("GOOGLE_EXTERNAL_ACCOUNT_ALLOW_EXECUTABLES", "1"),
    ///     ("AWS_REGION", "us-east-2"),
    /// ]);
    /// assert_eq!(env.get("AWS_REGION").unwrap(), "us-east-2");
    /// ```
    pub fn from_slice(vars: &[(&str, &str)]) -> Self {
        Env(Arc::new(EnvSource::Fake(
            vars.iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        )))
    }

    pub fn get(&self, name: &str) -> Result<String, VarError> {
        match self.0.as_ref() {
            EnvSource::Real => std::env::var(name),
            EnvSource::Fake(vars) => vars.get(name).cloned().ok_or(VarError::NotPresent),
        }
    }

    /// The variable, unless it is unset or empty
    pub fn get_non_empty(&self, name: &str) -> Option<String> {
        self.get(name).ok().filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod test {
    use crate::os_shim_internal::{Env, Fs};
    use std::env::VarError;

    #[test]
    fn empty_credentials_count_as_unset() {
        let env = Env::from_slice(&[("AWS_ACCESS_KEY_ID", "AKID"), ("AWS_SESSION_TOKEN", "")]);
        assert_eq!(env.get_non_empty("AWS_ACCESS_KEY_ID").as_deref(), Some("AKID"));
        assert_eq!(env.get("AWS_SESSION_TOKEN").unwrap(), "");
        assert_eq!(env.get_non_empty("AWS_SESSION_TOKEN"), None);
        assert_eq!(
            env.get("AWS_SECRET_ACCESS_KEY").expect_err("not set"),
            VarError::NotPresent
        );
    }

    #[test]
    fn unregistered_token_file_is_not_found() {
        let fs = Fs::from_slice(&[("/var/run/secrets/token", "abc")]);
        assert_eq!(fs.read_to_end("/var/run/secrets/token").unwrap(), b"abc");
        assert_eq!(
            fs.read_to_end("/var/run/secrets/missing")
                .expect_err("file was never registered")
                .kind(),
            std::io::ErrorKind::NotFound
        );
    }

    #[test]
    fn debug_output_hides_values() {
        let env = Env::from_slice(&[("AWS_SECRET_ACCESS_KEY", "shh")]);
        let formatted = format!("{:?}", env);
        assert!(formatted.contains("AWS_SECRET_ACCESS_KEY"));
        assert!(!formatted.contains("shh"));

        let fs = Fs::from_slice(&[("/token", "secret-token")]);
        assert_eq!(format!("{:?}", fs), "Fs::Fake(1 files)");
    }
}
