/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Process spawning seam for the executable subject token source

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncRead;
use wif_types::future::BoxFuture;

/// A command line and the extra environment to run it with
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl fmt::Debug for ProcessCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // arguments and environment can carry secrets
        f.debug_struct("ProcessCommand")
            .field("program", &self.program)
            .field("args", &format_args!("** {} arguments redacted **", self.args.len()))
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProcessCommand {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            env,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Variables added to the environment inherited from the current process
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }
}

/// Output stream of a child process
pub type ChildOutput = Box<dyn AsyncRead + Send + Unpin>;

/// A running child process
pub trait ChildProcess: Send {
    /// Takes the output streams of the process. Subsequent calls return nothing.
    fn take_output(&mut self) -> Vec<ChildOutput>;

    /// Waits for the process to exit. `None` means it was terminated by a signal.
    fn wait(&mut self) -> BoxFuture<'_, io::Result<Option<i32>>>;

    /// Forcibly terminates the process
    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

/// Starts child processes
///
/// The executable subject token source never creates processes directly. Tests substitute a fake
/// implementation to script process output and exit codes.
pub trait SpawnProcess: Send + Sync + fmt::Debug {
    fn spawn(&self, command: &ProcessCommand) -> io::Result<Box<dyn ChildProcess>>;
}

/// [`SpawnProcess`] implementation backed by `tokio::process`
///
/// stdout and stderr are both piped and returned from [`ChildProcess::take_output`]; stdin is
/// closed. Dropping the child kills it.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioProcessSpawner;

impl SpawnProcess for TokioProcessSpawner {
    fn spawn(&self, command: &ProcessCommand) -> io::Result<Box<dyn ChildProcess>> {
        let child = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        Ok(Box::new(TokioChild(child)))
    }
}

struct TokioChild(tokio::process::Child);

impl ChildProcess for TokioChild {
    fn take_output(&mut self) -> Vec<ChildOutput> {
        let mut output: Vec<ChildOutput> = Vec::with_capacity(2);
        if let Some(stdout) = self.0.stdout.take() {
            output.push(Box::new(stdout));
        }
        if let Some(stderr) = self.0.stderr.take() {
            output.push(Box::new(stderr));
        }
        output
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<Option<i32>>> {
        Box::pin(async move { self.0.wait().await.map(|status| status.code()) })
    }

    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(self.0.kill())
    }
}

/// A shared, cheaply clonable [`SpawnProcess`]
#[derive(Clone, Debug)]
pub struct SharedProcessSpawner(Arc<dyn SpawnProcess>);

impl SharedProcessSpawner {
    pub fn new(spawner: impl SpawnProcess + 'static) -> Self {
        Self(Arc::new(spawner))
    }
}

impl SpawnProcess for SharedProcessSpawner {
    fn spawn(&self, command: &ProcessCommand) -> io::Result<Box<dyn ChildProcess>> {
        self.0.spawn(command)
    }
}
