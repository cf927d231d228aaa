//! Deciding whether a finished identification can open a chat

use flora_api::Identification;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Where on an identification a chat secret may be found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    /// `secret` on the identification itself
    TopLevel,
    /// `respuestaApi.access_token`
    ApiAccessToken,
    /// `respuestaApi.secret`
    ApiSecret,
}

impl SecretSource {
    fn read<'a>(&self, identification: &'a Identification) -> Option<&'a str> {
        match self {
            Self::TopLevel => identification.secret.as_deref(),
            Self::ApiAccessToken => identification
                .api_response
                .as_ref()
                .and_then(|r| r.access_token.as_deref()),
            Self::ApiSecret => identification
                .api_response
                .as_ref()
                .and_then(|r| r.secret.as_deref()),
        }
    }
}

impl fmt::Display for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TopLevel => "secret",
            Self::ApiAccessToken => "access_token",
            Self::ApiSecret => "api_secret",
        })
    }
}

impl FromStr for SecretSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "secret" | "top_level" => Ok(Self::TopLevel),
            "access_token" | "token" => Ok(Self::ApiAccessToken),
            "api_secret" => Ok(Self::ApiSecret),
            other => Err(format!("unknown secret source: {}", other)),
        }
    }
}

/// Ordered list of places to look for the chat secret; first non-blank wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretLookup {
    order: Vec<SecretSource>,
}

impl SecretLookup {
    pub fn new(order: Vec<SecretSource>) -> Self {
        Self { order }
    }

    pub fn order(&self) -> &[SecretSource] {
        &self.order
    }

    pub fn find<'a>(&self, identification: &'a Identification) -> Option<&'a str> {
        self.order
            .iter()
            .filter_map(|source| source.read(identification))
            .find(|secret| !secret.trim().is_empty())
    }
}

impl Default for SecretLookup {
    fn default() -> Self {
        Self::new(vec![
            SecretSource::TopLevel,
            SecretSource::ApiAccessToken,
            SecretSource::ApiSecret,
        ])
    }
}

/// Parses a comma-separated list such as `"access_token,secret"`
impl FromStr for SecretLookup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let order = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<SecretSource>, _>>()?;
        if order.is_empty() {
            return Err("secret lookup order must name at least one source".to_string());
        }
        Ok(Self::new(order))
    }
}

/// Identification id and secret needed to start a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTarget {
    pub identification_id: String,
    pub secret: String,
}

impl ChatTarget {
    /// Both parts must be non-blank; a missing id with a present secret is
    /// not a target, and neither is the reverse.
    pub fn new(identification_id: &str, secret: &str) -> Option<Self> {
        let identification_id = identification_id.trim();
        let secret = secret.trim();
        if identification_id.is_empty() || secret.is_empty() {
            return None;
        }
        Some(Self {
            identification_id: identification_id.to_string(),
            secret: secret.to_string(),
        })
    }

    pub fn resolve(identification: &Identification, lookup: &SecretLookup) -> Option<Self> {
        let secret = lookup.find(identification)?;
        Self::new(&identification.id.to_string(), secret)
    }
}

/// Hands each identification to the chat at most once
#[derive(Debug, Default)]
pub struct Handoff {
    lookup: SecretLookup,
    started: HashSet<u64>,
}

impl Handoff {
    pub fn new(lookup: SecretLookup) -> Self {
        Self {
            lookup,
            started: HashSet::new(),
        }
    }

    /// Returns a target the first time a chat-capable identification is
    /// seen. Identifications without a secret are not remembered, so a later
    /// observation carrying the secret still opens the chat.
    pub fn observe(&mut self, identification: &Identification) -> Option<ChatTarget> {
        if self.started.contains(&identification.id) {
            debug!(id = identification.id, "Chat already started for identification");
            return None;
        }
        let target = ChatTarget::resolve(identification, &self.lookup)?;
        self.started.insert(identification.id);
        info!(id = identification.id, "Identification ready for chat");
        Some(target)
    }
}
