/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::error::TokenError;

/// How a file or URL body carries the subject token
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SubjectTokenFormat {
    /// The whole body is the token
    #[default]
    Text,
    /// The body is a JSON object and the token is the string in `subject_token_field_name`
    Json { subject_token_field_name: String },
}

impl SubjectTokenFormat {
    /// Extracts the subject token from `body`. `source` names where the body came from.
    pub(crate) fn extract(&self, body: &[u8], source: &str) -> Result<String, TokenError> {
        let token = match self {
            SubjectTokenFormat::Text => std::str::from_utf8(body)
                .map_err(|err| {
                    TokenError::provider_error(format!(
                        "the subject token from {} is not valid UTF-8: {}",
                        source, err
                    ))
                })?
                .to_string(),
            SubjectTokenFormat::Json {
                subject_token_field_name,
            } => {
                let json: serde_json::Value = serde_json::from_slice(body).map_err(|err| {
                    TokenError::provider_error(format!(
                        "the subject token from {} is not valid JSON: {}",
                        source, err
                    ))
                })?;
                json.get(subject_token_field_name)
                    .and_then(|value| value.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        TokenError::provider_error(format!(
                            "the subject token from {} has no string field `{}`",
                            source, subject_token_field_name
                        ))
                    })?
            }
        };
        if token.is_empty() {
            return Err(TokenError::provider_error(format!(
                "the subject token from {} is empty",
                source
            )));
        }
        Ok(token)
    }
}
