//! Named call stages applied to every outbound flight request.
//!
//! Stages form an explicit, ordered chain composed at client construction
//! time. Each stage sees the outgoing metadata before the request is sent and
//! the incoming metadata after the response headers arrive.

use std::sync::RwLock;

use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tracing::debug;

use crate::config::USER_AGENT_HEADER;
use crate::error::{ClientError, Result};

/// One stage of the outbound call chain.
pub(crate) trait CallStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Invoked before the request is sent.
    fn before_send(&self, metadata: &mut MetadataMap);

    /// Invoked with the response headers; default is a no-op.
    fn after_receive(&self, _metadata: &MetadataMap) {}
}

/// Attaches the client user-agent header to every call.
pub(crate) struct UserAgentStage {
    value: AsciiMetadataValue,
}

impl UserAgentStage {
    pub fn new(user_agent: &str) -> Result<Self> {
        let value = AsciiMetadataValue::try_from(user_agent).map_err(|_| {
            ClientError::invalid_argument(format!("user agent '{user_agent}' is not a valid header value"))
        })?;
        Ok(Self { value })
    }
}

impl CallStage for UserAgentStage {
    fn name(&self) -> &'static str {
        "user-agent"
    }

    fn before_send(&self, metadata: &mut MetadataMap) {
        metadata.insert(USER_AGENT_HEADER, self.value.clone());
    }
}

/// Attaches the cached bearer credential and keeps it current.
///
/// The credential is seeded once by the handshake. Should the server rotate
/// the token by returning a new `authorization` header, the stage adopts it
/// for subsequent calls on the same client.
pub(crate) struct BearerTokenStage {
    credential: RwLock<AsciiMetadataValue>,
}

impl BearerTokenStage {
    pub fn new(token: &str) -> Result<Self> {
        Ok(Self {
            credential: RwLock::new(Self::credential_value(token)?),
        })
    }

    fn credential_value(token: &str) -> Result<AsciiMetadataValue> {
        AsciiMetadataValue::try_from(format!("Bearer {token}")).map_err(|_| {
            ClientError::AuthenticationFailed(
                "handshake returned a token that is not a valid header value".to_string(),
            )
        })
    }
}

impl CallStage for BearerTokenStage {
    fn name(&self) -> &'static str {
        "bearer-auth"
    }

    fn before_send(&self, metadata: &mut MetadataMap) {
        if let Ok(credential) = self.credential.read() {
            metadata.insert("authorization", credential.clone());
        }
    }

    fn after_receive(&self, metadata: &MetadataMap) {
        let Some(value) = metadata.get("authorization") else {
            return;
        };
        if let Ok(mut credential) = self.credential.write() {
            if *credential != *value {
                debug!(stage = self.name(), "server rotated the bearer credential");
                *credential = value.clone();
            }
        }
    }
}
