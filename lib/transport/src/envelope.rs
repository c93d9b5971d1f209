//! S2S envelope construction, signing, and minimal structural validation
//! (§4.3, §3 "S2S Envelope"). Handlers never see `key_id`/`sig`; those two
//! fields are attached and verified by the transport layer only.

use crate::error::{Error, Result};
use flux::crypto;
use flux::time::timestamp_secs;
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub v: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub ts: i64,
    pub src: String,
    pub dst: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ack_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<EnvelopeErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sig: Option<String>,
}

impl Envelope {
    /// Builds a fresh request/push envelope: new UUID v4 `id`, current UTC
    /// seconds `ts`.
    pub fn new(kind: impl Into<String>, src: impl Into<String>, dst: impl Into<String>, payload: Value) -> Envelope {
        Envelope {
            v: 1,
            kind: kind.into(),
            id: Uuid::new_v4().to_string(),
            ts: timestamp_secs() as i64,
            src: src.into(),
            dst: dst.into(),
            payload,
            ack_of: None,
            error: None,
            key_id: None,
            sig: None,
        }
    }

    /// Builds an `ack` envelope replying to `self`.
    pub fn ack(&self, src: impl Into<String>, payload: Value) -> Envelope {
        let mut ack = Envelope::new(format!("{}.ack", self.kind), src, self.src.clone(), payload);
        ack.ack_of = Some(self.id.clone());
        ack
    }

    /// Builds an `error` envelope replying to `self`.
    pub fn error_reply(&self, src: impl Into<String>, code: i64, message: impl Into<String>, details: Value) -> Envelope {
        let mut err = Envelope::new(format!("{}.error", self.kind), src, self.src.clone(), Value::Null);
        err.ack_of = Some(self.id.clone());
        err.error = Some(EnvelopeErrorBody {
            code,
            message: message.into(),
            details,
        });
        err
    }

    /// Minimal structural validation: `v == 1`, non-empty `type`/`id`,
    /// positive `ts`, non-empty `src`/`dst`, object `payload`.
    pub fn validate(&self) -> Result<()> {
        if self.v != 1 {
            return Err(Error::InvalidEnvelope("v must be 1"));
        }
        if self.kind.is_empty() {
            return Err(Error::InvalidEnvelope("type must be non-empty"));
        }
        if self.id.is_empty() {
            return Err(Error::InvalidEnvelope("id must be non-empty"));
        }
        if self.ts <= 0 {
            return Err(Error::InvalidEnvelope("ts must be positive"));
        }
        if self.src.is_empty() || self.dst.is_empty() {
            return Err(Error::InvalidEnvelope("src/dst must be non-empty"));
        }
        if !self.payload.is_object() {
            return Err(Error::InvalidEnvelope("payload must be an object"));
        }
        Ok(())
    }

    /// Signs the envelope over its JSON serialization with `key_id`/`sig`
    /// stripped, then attaches both fields.
    pub fn sign(&mut self, key_id: &str, key: &[u8]) -> Result<()> {
        self.key_id = None;
        self.sig = None;
        let unsigned = serde_json::to_vec(self)?;
        self.sig = Some(crypto::sign_hex(key, &unsigned));
        self.key_id = Some(key_id.to_owned());
        Ok(())
    }

    /// Verifies the attached signature under `key`, over the envelope's
    /// serialization with `key_id`/`sig` stripped.
    pub fn verify(&self, key: &[u8]) -> bool {
        let sig = match &self.sig {
            Some(sig) => sig,
            None => return false,
        };

        let mut unsigned = self.clone();
        unsigned.key_id = None;
        unsigned.sig = None;

        match serde_json::to_vec(&unsigned) {
            Ok(bytes) => crypto::verify_hex(key, &bytes, sig),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sign_then_verify_round_trips() {
        let mut env = Envelope::new("health", "engine", "session", json!({}));
        env.sign("k1", b"secret-key-bytes").unwrap();
        assert!(env.verify(b"secret-key-bytes"));
    }

    #[test]
    fn verify_fails_after_tamper() {
        let mut env = Envelope::new("health", "engine", "session", json!({}));
        env.sign("k1", b"secret-key-bytes").unwrap();
        env.payload = json!({"tampered": true});
        assert!(!env.verify(b"secret-key-bytes"));
    }

    #[test]
    fn validate_rejects_wrong_version() {
        let mut env = Envelope::new("health", "engine", "session", json!({}));
        env.v = 2;
        assert!(env.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_object_payload() {
        let env = Envelope::new("health", "engine", "session", json!([1, 2]));
        assert!(env.validate().is_err());
    }

    #[test]
    fn ack_echoes_ack_of() {
        let env = Envelope::new("health", "engine", "session", json!({}));
        let ack = env.ack("session", json!({"ok": true}));
        assert_eq!(ack.ack_of.as_deref(), Some(env.id.as_str()));
        assert_eq!(ack.dst, "engine");
    }
}
