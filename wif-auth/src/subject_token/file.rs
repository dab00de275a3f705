/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::error::TokenError;
use crate::provider_config::ProviderConfig;
use crate::subject_token::{SubjectTokenContext, SubjectTokenFormat};
use std::path::{Path, PathBuf};
use wif_types::os_shim_internal::Fs;
use wif_types::SubjectToken;

/// Reads the subject token from a file on every exchange
#[derive(Clone, Debug)]
pub struct FileSupplier {
    path: PathBuf,
    format: SubjectTokenFormat,
    fs: Fs,
}

impl FileSupplier {
    pub fn new(path: impl Into<PathBuf>, format: SubjectTokenFormat, conf: &ProviderConfig) -> Self {
        Self {
            path: path.into(),
            format,
            fs: conf.fs(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn subject_token(
        &self,
        context: &SubjectTokenContext,
    ) -> Result<SubjectToken, TokenError> {
        let source = format!("file {}", self.path.display());
        let contents = self.fs.read_to_end(&self.path).map_err(|err| {
            TokenError::provider_error(format!("could not read the subject token {}: {}", source, err))
        })?;
        let token = self.format.extract(&contents, &source)?;
        tracing::debug!(path = %self.path.display(), "loaded subject token from file");
        Ok(SubjectToken::new(token, context.subject_token_type().clone()))
    }
}
