/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Subject tokens from an external executable
//!
//! The executable is only run when `GOOGLE_EXTERNAL_ACCOUNT_ALLOW_EXECUTABLES=1`. It prints an
//! [`ExecutableResponse`] as JSON on stdout. When an output file is configured, a fresh
//! successful response already stored there is used instead of running the executable again.

pub mod process;
mod response;

pub use response::{ExecutableResponse, EXECUTABLE_SUPPORTED_MAX_VERSION};

use self::process::{ProcessCommand, SharedProcessSpawner, SpawnProcess};
use self::response::ParseResponseError;
use crate::error::TokenError;
use crate::provider_config::ProviderConfig;
use crate::subject_token::SubjectTokenContext;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use wif_types::os_shim_internal::{Env, Fs};
use wif_types::time::{SharedTimeSource, TimeSource};
use wif_types::SubjectToken;

/// Environment variable that must be `1` for executables to run
pub const ALLOW_EXECUTABLES_ENV: &str = "GOOGLE_EXTERNAL_ACCOUNT_ALLOW_EXECUTABLES";

const ENV_AUDIENCE: &str = "GOOGLE_EXTERNAL_ACCOUNT_AUDIENCE";
const ENV_TOKEN_TYPE: &str = "GOOGLE_EXTERNAL_ACCOUNT_TOKEN_TYPE";
const ENV_INTERACTIVE: &str = "GOOGLE_EXTERNAL_ACCOUNT_INTERACTIVE";
const ENV_IMPERSONATED_EMAIL: &str = "GOOGLE_EXTERNAL_ACCOUNT_IMPERSONATED_EMAIL";
const ENV_OUTPUT_FILE: &str = "GOOGLE_EXTERNAL_ACCOUNT_OUTPUT_FILE";

/// Default time the executable is given to finish
pub const DEFAULT_EXECUTABLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Error codes of [`ExecutableError`]
///
/// A failed response from the executable carries the executable's own code instead.
pub mod codes {
    pub const PLUGGABLE_AUTH_DISABLED: &str = "PLUGGABLE_AUTH_DISABLED";
    pub const INVALID_OUTPUT_FILE: &str = "INVALID_OUTPUT_FILE";
    pub const INVALID_EXECUTABLE_RESPONSE: &str = "INVALID_EXECUTABLE_RESPONSE";
    pub const UNSUPPORTED_TOKEN_TYPE: &str = "UNSUPPORTED_TOKEN_TYPE";
    pub const UNSUPPORTED_VERSION: &str = "UNSUPPORTED_VERSION";
    pub const TIMEOUT_EXCEEDED: &str = "TIMEOUT_EXCEEDED";
    pub const EXIT_CODE: &str = "EXIT_CODE";
    pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";
    pub const INTERRUPTED: &str = "INTERRUPTED";
}

/// Failure of the executable subject token source. None of these are retryable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutableError {
    code: String,
    message: String,
}

impl ExecutableError {
    pub(crate) fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub(crate) fn pluggable_auth_disabled() -> Self {
        Self::new(
            codes::PLUGGABLE_AUTH_DISABLED,
            "Pluggable Auth executables need to be explicitly allowed to run by setting the \
             GOOGLE_EXTERNAL_ACCOUNT_ALLOW_EXECUTABLES environment variable to 1.",
        )
    }

    /// One of [`codes`], or the code reported by the executable
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ExecutableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error code {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ExecutableError {}

/// Returns the given `command` string with arguments redacted if there were any
pub(crate) fn debug_fmt_command_string(command: &str) -> Cow<'_, str> {
    match command.trim().find(char::is_whitespace) {
        Some(index) => Cow::Owned(format!(
            "{} ** arguments redacted **",
            &command.trim()[0..index]
        )),
        None => Cow::Borrowed(command),
    }
}

/// How to run the executable
#[derive(Clone, PartialEq, Eq)]
pub struct ExecutableOptions {
    command: String,
    timeout: Duration,
    output_file: Option<PathBuf>,
    environment: HashMap<String, String>,
}

impl fmt::Debug for ExecutableOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableOptions")
            .field("command", &debug_fmt_command_string(&self.command))
            .field("timeout", &self.timeout)
            .field("output_file", &self.output_file)
            .field("environment", &self.environment.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExecutableOptions {
    /// `command` is split on spaces into the program and its arguments
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: DEFAULT_EXECUTABLE_TIMEOUT,
            output_file: None,
            environment: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// File the executable caches its response in
    pub fn with_output_file(mut self, output_file: impl Into<PathBuf>) -> Self {
        self.output_file = Some(output_file.into());
        self
    }

    /// Extra environment variable for the executable
    pub fn with_environment_variable(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }
}

/// Produces subject tokens by running an executable
#[derive(Clone, Debug)]
pub struct ExecutableSupplier {
    options: ExecutableOptions,
    env: Env,
    fs: Fs,
    time_source: SharedTimeSource,
    spawner: SharedProcessSpawner,
}

impl ExecutableSupplier {
    pub fn new(options: ExecutableOptions, conf: &ProviderConfig) -> Result<Self, TokenError> {
        if options.command.trim().is_empty() {
            return Err(TokenError::invalid_configuration(
                "the executable command must not be empty",
            ));
        }
        Ok(Self {
            options,
            env: conf.env(),
            fs: conf.fs(),
            time_source: conf.time_source(),
            spawner: conf.process_spawner(),
        })
    }

    pub fn options(&self) -> &ExecutableOptions {
        &self.options
    }

    pub(crate) async fn subject_token(
        &self,
        context: &SubjectTokenContext,
    ) -> Result<SubjectToken, TokenError> {
        if self.env.get(ALLOW_EXECUTABLES_ENV).as_deref() != Ok("1") {
            return Err(ExecutableError::pluggable_auth_disabled().into());
        }

        if let Some(output_file) = self.options.output_file() {
            if let Some(cached) = self.cached_response(output_file)? {
                let now = self.time_source.now();
                // an unsupported version fails even when the response is also expired
                if cached.version() > EXECUTABLE_SUPPORTED_MAX_VERSION {
                    return Ok(cached.into_subject_token(now)?);
                }
                if cached.is_reusable(now) {
                    tracing::debug!(output_file = ?output_file, "using executable response from the output file");
                    return Ok(cached.into_subject_token(now)?);
                }
            }
        }

        let response = self.run(context).await?;
        if self.options.output_file.is_some()
            && response.is_success()
            && response.expiration_time().is_none()
        {
            return Err(ExecutableError::new(
                codes::INVALID_EXECUTABLE_RESPONSE,
                "The executable response must contain the `expiration_time` field for successful \
                 responses when an output_file has been specified in the configuration.",
            )
            .into());
        }
        Ok(response.into_subject_token(self.time_source.now())?)
    }

    /// Reads a previously written response. A missing or empty file means there is none.
    fn cached_response(&self, path: &Path) -> Result<Option<ExecutableResponse>, ExecutableError> {
        let invalid = |detail: String| {
            ExecutableError::new(
                codes::INVALID_OUTPUT_FILE,
                format!(
                    "The output file {} contains an invalid or malformed response: {}",
                    path.display(),
                    detail
                ),
            )
        };
        let contents = match self.fs.read_to_end(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(invalid(err.to_string())),
        };
        if contents.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        match ExecutableResponse::from_slice(&contents) {
            Ok(response) => Ok(Some(response)),
            Err(ParseResponseError::Json(err)) => Err(invalid(err.to_string())),
            Err(ParseResponseError::Invalid(err)) => Err(invalid(err.to_string())),
        }
    }

    fn process_command(&self, context: &SubjectTokenContext) -> Result<ProcessCommand, TokenError> {
        let mut argv = self
            .options
            .command
            .split(' ')
            .filter(|part| !part.is_empty())
            .map(str::to_string);
        let program = argv.next().ok_or_else(|| {
            TokenError::invalid_configuration("the executable command must not be empty")
        })?;

        let mut env = self.options.environment.clone();
        env.insert(ENV_AUDIENCE.into(), context.audience().into());
        env.insert(
            ENV_TOKEN_TYPE.into(),
            context.subject_token_type().as_urn().into(),
        );
        env.insert(ENV_INTERACTIVE.into(), "0".into());
        if let Some(email) = context.impersonated_email() {
            env.insert(ENV_IMPERSONATED_EMAIL.into(), email.into());
        }
        if let Some(output_file) = &self.options.output_file {
            env.insert(
                ENV_OUTPUT_FILE.into(),
                output_file.to_string_lossy().into_owned(),
            );
        }
        Ok(ProcessCommand::new(program, argv.collect(), env))
    }

    async fn run(&self, context: &SubjectTokenContext) -> Result<ExecutableResponse, TokenError> {
        let command = self.process_command(context)?;
        // arguments may contain secrets and are only logged at trace level
        tracing::trace!(command = %self.options.command, "running executable (unredacted)");
        tracing::debug!(
            command = %debug_fmt_command_string(&self.options.command),
            timeout = ?self.options.timeout,
            "running executable"
        );
        let mut child = self.spawner.spawn(&command).map_err(|err| {
            TokenError::provider_error(format!(
                "failed to start executable `{}`: {}",
                command.program(),
                err
            ))
        })?;

        // stdout and stderr are drained while the process runs so that it never blocks on a
        // full pipe
        let output = Arc::new(Mutex::new(Vec::new()));
        let mut readers: Vec<JoinHandle<io::Result<()>>> = child
            .take_output()
            .into_iter()
            .map(|mut stream| {
                let output = output.clone();
                tokio::spawn(async move {
                    let mut buf = [0_u8; 4096];
                    loop {
                        let n = stream.read(&mut buf).await?;
                        if n == 0 {
                            return Ok(());
                        }
                        if let Ok(mut output) = output.lock() {
                            output.extend_from_slice(&buf[..n]);
                        }
                    }
                })
            })
            .collect();

        // waiting and draining share one budget; a grandchild holding the pipe open must not
        // outlive it
        let deadline = tokio::time::Instant::now() + self.options.timeout;
        let exit = match tokio::time::timeout_at(deadline, child.wait()).await {
            Err(_elapsed) => Err(ExecutableError::new(
                codes::TIMEOUT_EXCEEDED,
                "The executable failed to finish within the timeout specified.",
            )),
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "failed waiting on executable");
                Err(ExecutableError::new(
                    codes::INTERRUPTED,
                    "The execution was interrupted.",
                ))
            }
            Ok(Ok(Some(0))) => Ok(()),
            Ok(Ok(Some(code))) => Err(ExecutableError::new(
                codes::EXIT_CODE,
                format!("The executable failed with exit code {}.", code),
            )),
            Ok(Ok(None)) => Err(ExecutableError::new(
                codes::EXIT_CODE,
                "The executable was terminated by a signal.",
            )),
        };
        // the process is terminated on every path, including after a normal exit
        if let Err(err) = child.kill().await {
            tracing::trace!(error = %err, "executable already exited");
        }

        if let Err(err) = exit {
            abort_all(&readers);
            tracing::debug!(error = %err, "executable failed");
            return Err(err.into());
        }
        let drained = tokio::time::timeout_at(deadline, drain(&mut readers)).await;
        match drained {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                abort_all(&readers);
                return Err(err);
            }
            Err(_elapsed) => {
                abort_all(&readers);
                tracing::debug!("executable output was not closed before the timeout");
                return Err(ExecutableError::new(
                    codes::TIMEOUT_EXCEEDED,
                    "The executable failed to finish within the timeout specified.",
                )
                .into());
            }
        }

        let output = match output.lock() {
            Ok(output) => output.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        tracing::debug!("executable finished");
        ExecutableResponse::from_slice(&output).map_err(|err| match err {
            ParseResponseError::Json(err) => {
                tracing::debug!(error = %err, "executable output is not a valid response");
                ExecutableError::new(
                    codes::INVALID_RESPONSE,
                    "The executable returned an invalid response.",
                )
                .into()
            }
            ParseResponseError::Invalid(err) => err.into(),
        })
    }
}

/// Waits for every output reader to reach end of stream
async fn drain(readers: &mut [JoinHandle<io::Result<()>>]) -> Result<(), TokenError> {
    for reader in readers.iter_mut() {
        match reader.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "failed to read the executable output");
                return Err(TokenError::provider_error(io::Error::new(
                    err.kind(),
                    format!("failed to read the executable output: {}", err),
                )));
            }
            Err(err) => return Err(TokenError::provider_error(err)),
        }
    }
    Ok(())
}

fn abort_all(readers: &[JoinHandle<io::Result<()>>]) {
    for reader in readers {
        reader.abort();
    }
}
