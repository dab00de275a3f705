/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use std::fmt;
use wif_types::subject_token::TOKEN_TYPE_ACCESS_TOKEN;

/// `grant_type` of every token exchange
pub const GRANT_TYPE_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// `requested_token_type` used to request an access boundary intermediary token
pub const TOKEN_TYPE_ACCESS_BOUNDARY_INTERMEDIARY_TOKEN: &str =
    "urn:ietf:params:oauth:token-type:access_boundary_intermediary_token";

/// The party acting on behalf of the subject in a delegation chain
#[derive(Clone, PartialEq, Eq)]
pub struct ActingParty {
    actor_token: String,
    actor_token_type: String,
}

impl fmt::Debug for ActingParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActingParty")
            .field("actor_token", &"** redacted **")
            .field("actor_token_type", &self.actor_token_type)
            .finish()
    }
}

impl ActingParty {
    pub fn new(actor_token: impl Into<String>, actor_token_type: impl Into<String>) -> Self {
        Self {
            actor_token: actor_token.into(),
            actor_token_type: actor_token_type.into(),
        }
    }

    pub fn actor_token(&self) -> &str {
        &self.actor_token
    }

    pub fn actor_token_type(&self) -> &str {
        &self.actor_token_type
    }
}

/// An RFC 8693 token exchange request
///
/// ```rust
/// use wif_sts::StsTokenExchangeRequest;
/// let request = StsTokenExchangeRequest::new("eyJhbGciOi...", "urn:ietf:params:oauth:token-type:jwt")
///     .with_audience("//iam.googleapis.com/locations/global/workforcePools/pool/providers/oidc")
///     .with_scopes(vec!["https://www.googleapis.com/auth/cloud-platform".to_string()]);
/// assert!(request.to_form_body().contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Atoken-exchange"));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct StsTokenExchangeRequest {
    subject_token: String,
    subject_token_type: String,
    scopes: Vec<String>,
    requested_token_type: Option<String>,
    resource: Option<String>,
    audience: Option<String>,
    acting_party: Option<ActingParty>,
    internal_options: Option<String>,
}

impl fmt::Debug for StsTokenExchangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StsTokenExchangeRequest")
            .field("subject_token", &"** redacted **")
            .field("subject_token_type", &self.subject_token_type)
            .field("scopes", &self.scopes)
            .field("requested_token_type", &self.requested_token_type())
            .field("resource", &self.resource)
            .field("audience", &self.audience)
            .field("acting_party", &self.acting_party)
            .field("internal_options", &self.internal_options)
            .finish()
    }
}

impl StsTokenExchangeRequest {
    pub fn new(subject_token: impl Into<String>, subject_token_type: impl Into<String>) -> Self {
        Self {
            subject_token: subject_token.into(),
            subject_token_type: subject_token_type.into(),
            scopes: Vec::new(),
            requested_token_type: None,
            resource: None,
            audience: None,
            acting_party: None,
            internal_options: None,
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Overrides the default `urn:ietf:params:oauth:token-type:access_token`
    pub fn with_requested_token_type(mut self, requested_token_type: impl Into<String>) -> Self {
        self.requested_token_type = Some(requested_token_type.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_acting_party(mut self, acting_party: ActingParty) -> Self {
        self.acting_party = Some(acting_party);
        self
    }

    /// Opaque `options` parameter. Carries the credential access boundary for downscoping and the
    /// workforce pool user project.
    pub fn with_internal_options(mut self, options: impl Into<String>) -> Self {
        self.internal_options = Some(options.into());
        self
    }

    pub fn subject_token(&self) -> &str {
        &self.subject_token
    }

    pub fn subject_token_type(&self) -> &str {
        &self.subject_token_type
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn requested_token_type(&self) -> &str {
        self.requested_token_type
            .as_deref()
            .unwrap_or(TOKEN_TYPE_ACCESS_TOKEN)
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    pub fn acting_party(&self) -> Option<&ActingParty> {
        self.acting_party.as_ref()
    }

    pub fn internal_options(&self) -> Option<&str> {
        self.internal_options.as_deref()
    }

    /// `application/x-www-form-urlencoded` body of the exchange
    pub fn to_form_body(&self) -> String {
        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("grant_type", GRANT_TYPE_TOKEN_EXCHANGE)
            .append_pair("subject_token_type", &self.subject_token_type)
            .append_pair("subject_token", &self.subject_token);
        if !self.scopes.is_empty() {
            form.append_pair("scope", &self.scopes.join(" "));
        }
        form.append_pair("requested_token_type", self.requested_token_type());
        if let Some(resource) = &self.resource {
            form.append_pair("resource", resource);
        }
        if let Some(audience) = &self.audience {
            form.append_pair("audience", audience);
        }
        if let Some(acting_party) = &self.acting_party {
            form.append_pair("actor_token", &acting_party.actor_token)
                .append_pair("actor_token_type", &acting_party.actor_token_type);
        }
        if let Some(options) = &self.internal_options {
            form.append_pair("options", options);
        }
        form.finish()
    }
}

#[cfg(test)]
mod test {
    use super::{ActingParty, StsTokenExchangeRequest, TOKEN_TYPE_ACCESS_BOUNDARY_INTERMEDIARY_TOKEN};
    use std::collections::HashMap;

    fn decode(body: &str) -> HashMap<String, String> {
        form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect()
    }

    #[test]
    fn scopes_round_trip_through_the_form_body() {
        let request = StsTokenExchangeRequest::new("subject", "urn:ietf:params:oauth:token-type:jwt")
            .with_scopes(vec!["a".into(), "b".into()]);
        let params = decode(&request.to_form_body());
        assert_eq!(params["scope"], "a b");
        assert_eq!(
            params["grant_type"],
            "urn:ietf:params:oauth:grant-type:token-exchange"
        );
        assert_eq!(
            params["requested_token_type"],
            "urn:ietf:params:oauth:token-type:access_token"
        );
        assert_eq!(params["subject_token"], "subject");
    }

    #[test]
    fn optional_fields_are_omitted() {
        let request = StsTokenExchangeRequest::new("subject", "urn:ietf:params:oauth:token-type:jwt");
        let params = decode(&request.to_form_body());
        for absent in ["scope", "resource", "audience", "actor_token", "options"] {
            assert!(!params.contains_key(absent), "{} should be absent", absent);
        }
    }

    #[test]
    fn all_fields_are_encoded() {
        let request = StsTokenExchangeRequest::new("subject", "urn:ietf:params:oauth:token-type:access_token")
            .with_requested_token_type(TOKEN_TYPE_ACCESS_BOUNDARY_INTERMEDIARY_TOKEN)
            .with_resource("//storage.googleapis.com")
            .with_audience("//iam.googleapis.com/pool")
            .with_acting_party(ActingParty::new("actor", "urn:ietf:params:oauth:token-type:jwt"))
            .with_internal_options(r#"{"userProject":"123"}"#);
        let params = decode(&request.to_form_body());
        assert_eq!(
            params["requested_token_type"],
            TOKEN_TYPE_ACCESS_BOUNDARY_INTERMEDIARY_TOKEN
        );
        assert_eq!(params["resource"], "//storage.googleapis.com");
        assert_eq!(params["audience"], "//iam.googleapis.com/pool");
        assert_eq!(params["actor_token"], "actor");
        assert_eq!(params["actor_token_type"], "urn:ietf:params:oauth:token-type:jwt");
        assert_eq!(params["options"], r#"{"userProject":"123"}"#);
    }

    #[test]
    fn debug_redacts_tokens() {
        let request = StsTokenExchangeRequest::new("secret-subject", "urn:ietf:params:oauth:token-type:jwt")
            .with_acting_party(ActingParty::new("secret-actor", "urn:ietf:params:oauth:token-type:jwt"));
        let formatted = format!("{:?}", request);
        assert!(!formatted.contains("secret-subject"));
        assert!(!formatted.contains("secret-actor"));
    }
}
