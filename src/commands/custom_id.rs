//! Component ids carried by auth panel buttons: `auth:<method>:<role_id>`.

use crate::platform::parse_snowflake;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const PREFIX: &str = "auth";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Grant the role on click
    Simple,
    /// Answer a question first
    Quiz,
    /// Authorize through the provider; the callback grants the role
    OAuth,
}

impl AuthMethod {
    pub fn tag(self) -> &'static str {
        match self {
            AuthMethod::Simple => "1",
            AuthMethod::Quiz => "2",
            AuthMethod::OAuth => "3",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "1" => Some(AuthMethod::Simple),
            "2" => Some(AuthMethod::Quiz),
            "3" => Some(AuthMethod::OAuth),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComponentIdError {
    /// Not one of ours; other components share the interaction stream
    #[error("component id does not belong to the auth panel")]
    Foreign,
    #[error("malformed auth component id: {0:?}")]
    Malformed(String),
    #[error("unknown auth method {0:?}")]
    UnknownMethod(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentId {
    SimpleAuth { role_id: u64 },
    QuizAuth { role_id: u64 },
    OAuthLink { role_id: u64 },
}

impl ComponentId {
    pub fn new(method: AuthMethod, role_id: u64) -> Self {
        match method {
            AuthMethod::Simple => ComponentId::SimpleAuth { role_id },
            AuthMethod::Quiz => ComponentId::QuizAuth { role_id },
            AuthMethod::OAuth => ComponentId::OAuthLink { role_id },
        }
    }

    pub fn method(&self) -> AuthMethod {
        match self {
            ComponentId::SimpleAuth { .. } => AuthMethod::Simple,
            ComponentId::QuizAuth { .. } => AuthMethod::Quiz,
            ComponentId::OAuthLink { .. } => AuthMethod::OAuth,
        }
    }

    pub fn role_id(&self) -> u64 {
        match *self {
            ComponentId::SimpleAuth { role_id }
            | ComponentId::QuizAuth { role_id }
            | ComponentId::OAuthLink { role_id } => role_id,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", PREFIX, self.method().tag(), self.role_id())
    }
}

impl FromStr for ComponentId {
    type Err = ComponentIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = raw.split(':');
        if parts.next() != Some(PREFIX) {
            return Err(ComponentIdError::Foreign);
        }

        let malformed = || ComponentIdError::Malformed(raw.to_string());
        let (method, role, rest) = (parts.next(), parts.next(), parts.next());
        let (Some(method), Some(role), None) = (method, role, rest) else {
            return Err(malformed());
        };

        let method = AuthMethod::from_tag(method)
            .ok_or_else(|| ComponentIdError::UnknownMethod(method.to_string()))?;
        let role_id = parse_snowflake(role).ok_or_else(malformed)?;

        Ok(ComponentId::new(method, role_id))
    }
}
