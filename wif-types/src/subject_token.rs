/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

//! Third-party identity proofs that are exchanged for access tokens

use std::fmt;

/// Token type URN of an OAuth 2.0 access token
pub const TOKEN_TYPE_ACCESS_TOKEN: &str = "urn:ietf:params:oauth:token-type:access_token";
/// Token type URN of a JWT
pub const TOKEN_TYPE_JWT: &str = "urn:ietf:params:oauth:token-type:jwt";
/// Token type URN of an OIDC ID token
pub const TOKEN_TYPE_ID_TOKEN: &str = "urn:ietf:params:oauth:token-type:id_token";
/// Token type URN of a SAML 2.0 assertion
pub const TOKEN_TYPE_SAML2: &str = "urn:ietf:params:oauth:token-type:saml2";
/// Token type URN of a serialized, SigV4 signed AWS `GetCallerIdentity` request
pub const TOKEN_TYPE_AWS4_REQUEST: &str = "urn:ietf:params:aws:token-type:aws4_request";

/// The type of a [`SubjectToken`], identified on the wire by a URN.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum SubjectTokenType {
    Jwt,
    IdToken,
    Saml2,
    Aws4Request,
    AccessToken,
    Other(String),
}

impl SubjectTokenType {
    pub fn from_urn(urn: &str) -> Self {
        match urn {
            TOKEN_TYPE_JWT => SubjectTokenType::Jwt,
            TOKEN_TYPE_ID_TOKEN => SubjectTokenType::IdToken,
            TOKEN_TYPE_SAML2 => SubjectTokenType::Saml2,
            TOKEN_TYPE_AWS4_REQUEST => SubjectTokenType::Aws4Request,
            TOKEN_TYPE_ACCESS_TOKEN => SubjectTokenType::AccessToken,
            other => SubjectTokenType::Other(other.to_string()),
        }
    }

    pub fn as_urn(&self) -> &str {
        match self {
            SubjectTokenType::Jwt => TOKEN_TYPE_JWT,
            SubjectTokenType::IdToken => TOKEN_TYPE_ID_TOKEN,
            SubjectTokenType::Saml2 => TOKEN_TYPE_SAML2,
            SubjectTokenType::Aws4Request => TOKEN_TYPE_AWS4_REQUEST,
            SubjectTokenType::AccessToken => TOKEN_TYPE_ACCESS_TOKEN,
            SubjectTokenType::Other(urn) => urn,
        }
    }
}

impl fmt::Display for SubjectTokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_urn())
    }
}

/// A subject token and its type.
///
/// Subject tokens are produced fresh for every exchange and dropped once the exchange completes.
#[derive(Clone, Eq, PartialEq)]
pub struct SubjectToken {
    value: String,
    token_type: SubjectTokenType,
}

impl fmt::Debug for SubjectToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectToken")
            .field("value", &"** redacted **")
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl SubjectToken {
    pub fn new(value: impl Into<String>, token_type: SubjectTokenType) -> Self {
        Self {
            value: value.into(),
            token_type,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn token_type(&self) -> &SubjectTokenType {
        &self.token_type
    }

    pub fn into_value(self) -> String {
        self.value
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn urns_round_trip() {
        for ty in [
            SubjectTokenType::Jwt,
            SubjectTokenType::IdToken,
            SubjectTokenType::Saml2,
            SubjectTokenType::Aws4Request,
            SubjectTokenType::AccessToken,
        ] {
            assert_eq!(SubjectTokenType::from_urn(ty.as_urn()), ty);
        }
        assert_eq!(
            SubjectTokenType::from_urn("urn:example:custom"),
            SubjectTokenType::Other("urn:example:custom".into())
        );
    }

    #[test]
    fn debug_redacts_token() {
        let token = SubjectToken::new("header.payload.sig", SubjectTokenType::Jwt);
        assert!(!format!("{:?}", token).contains("payload"));
    }
}
