//! Envelope codec: session bootstrap, encrypt, decrypt.
//!
//! Envelope receive pipeline, in rejection order:
//!
//!   fallback check → parse (version) → session lookup → replay/stale
//!   → key derivation → integrity hash → AEAD open → persist → deliver
//!
//! Nothing is persisted, and no skipped keys are cached, until the AEAD
//! authentication has passed. Plaintext, keys, and IVs never reach the log.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use vk_crypto::{aead, agreement, chain, safety::constant_time_eq};
use vk_proto::{envelope::Envelope, fallback, PublicBundle, SecurityLevel, ENVELOPE_VERSION};
use vk_store::models::SessionRow;
use vk_store::sessions::NewSession;

use crate::{
    error::{E2eeError, ErrorKind},
    ratchet::{self, ReplayWindow},
    service::E2eeCore,
};

/// Decrypt output: plaintext plus delivery metadata. For legacy fallback
/// strings the "plaintext" is the embedded cleartext and `needs_decryption`
/// flags that nothing cryptographic protected it.
#[derive(Debug, Clone)]
pub struct OpenedMessage {
    pub plaintext: Vec<u8>,
    pub security_level: SecurityLevel,
    pub needs_decryption: bool,
    pub sender_id: Option<String>,
    pub message_number: Option<u32>,
    pub legacy_timestamp_ms: Option<String>,
    pub legacy_tag: Option<String>,
}

/// Deterministic session id for a participant pair: SHA-256 over the
/// lexicographically ordered ids, first 16 bytes, hex.
pub fn session_id_for(a: &str, b: &str) -> String {
    let (lo, hi) = SessionRow::order_pair(a, b);
    let mut hasher = Sha256::new();
    hasher.update(lo.as_bytes());
    hasher.update(b":");
    hasher.update(hi.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

impl E2eeCore {
    /// Return the pair's session, creating it through key agreement on first
    /// use. Serialized per pair; both directions resolve to the same session.
    pub async fn get_or_create_session(
        self: &Arc<Self>,
        initiator_id: &str,
        peer_id: &str,
    ) -> Result<SessionRow, E2eeError> {
        let sid = session_id_for(initiator_id, peer_id);
        let lock = self.locks.session_lock(&sid);
        let _guard = lock.lock().await;
        self.get_or_create_session_locked(&sid, initiator_id, peer_id)
            .await
    }

    /// Body of session bootstrap. Caller MUST hold the session lock for
    /// `sid`.
    async fn get_or_create_session_locked(
        self: &Arc<Self>,
        sid: &str,
        initiator_id: &str,
        peer_id: &str,
    ) -> Result<SessionRow, E2eeError> {
        if let Some(row) = self
            .timed(self.store.get_session_by_pair(initiator_id, peer_id))
            .await?
        {
            return Ok(row);
        }

        let initiator_row = self.timed(self.store.require_key_set(initiator_id)).await?;
        let identity = self.load_identity(&initiator_row).await?;
        let bundle = self.get_bundle(peer_id).await?;
        let peer = decode_bundle(&bundle)?;

        let secret = agreement::derive_root_secret(&identity, &peer)?;

        let (user_lo, user_hi) = SessionRow::order_pair(initiator_id, peer_id);
        let new = NewSession {
            id: sid.to_string(),
            user_lo,
            user_hi,
            root_key_enc: self.store.seal_value(&secret.root_key)?,
            send_chain_key_enc: self.store.seal_value(&secret.chain_key)?,
            // Single shared row per pair: both chains start from the same
            // initial key and advance independently.
            recv_chain_key_enc: self.store.seal_value(&secret.chain_key)?,
            replay_window: ReplayWindow::new()
                .to_json()
                .map_err(|e| E2eeError::with_cause(ErrorKind::StorageError, e))?,
        };
        self.timed(self.store.insert_session(&new)).await?;

        tracing::info!(
            target: "vk_e2ee",
            event = "session_created",
            session_id = %sid,
            with_one_time_key = bundle.has_one_time_key(),
        );

        self.timed(self.store.get_session(sid))
            .await?
            .ok_or_else(|| E2eeError::new(ErrorKind::StorageError))
    }

    /// Encrypt a message from `sender_id` to `recipient_id`, producing a
    /// versioned envelope and advancing the sending chain atomically with it.
    pub async fn encrypt_message(
        self: &Arc<Self>,
        sender_id: &str,
        recipient_id: &str,
        plaintext: &[u8],
        metadata: Option<String>,
    ) -> Result<Envelope, E2eeError> {
        let sid = session_id_for(sender_id, recipient_id);
        let lock = self.locks.session_lock(&sid);
        let _guard = lock.lock().await;

        let row = self
            .get_or_create_session_locked(&sid, sender_id, recipient_id)
            .await?;

        let n = row.send_count as u32;
        let mut ck = self
            .store
            .open_key32(&row.send_chain_key_enc)
            .map_err(|e| E2eeError::with_cause(ErrorKind::KeyIntegrityError, e))?;

        let keys = chain::message_keys(&ck, n)?;
        let iv = aead::generate_iv();
        let aad = build_aad(&sid, n, metadata.as_deref());
        let (ciphertext, tag) = aead::seal(&keys.enc_key, &iv, plaintext, &aad)?;
        let integrity_hash = integrity_hash(&ciphertext, &iv, &tag, &keys.auth_key);

        let mut next_ck = chain::advance(&ck)?;
        ck.zeroize();
        let sealed_next = self.store.seal_value(&next_ck)?;
        next_ck.zeroize();

        self.timed(
            self.store
                .advance_send_chain(&sid, i64::from(n), &sealed_next, i64::from(n) + 1),
        )
        .await?;

        tracing::debug!(
            target: "vk_e2ee",
            event = "message_encrypted",
            session_id = %sid,
            message_number = n,
        );

        Ok(Envelope {
            version: ENVELOPE_VERSION.to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            session_id: sid,
            message_number: n,
            iv: STANDARD.encode(iv),
            ciphertext: STANDARD.encode(&ciphertext),
            auth_tag: STANDARD.encode(tag),
            integrity_hash,
            security_level: SecurityLevel::MilitaryGrade,
            metadata,
        })
    }

    /// Decrypt an incoming message. Accepts either a versioned envelope
    /// (JSON) or a legacy fallback string; the latter is tagged, never
    /// treated as secure.
    pub async fn decrypt_message(&self, input: &str) -> Result<OpenedMessage, E2eeError> {
        if let Ok(legacy) = fallback::parse(input) {
            tracing::debug!(target: "vk_e2ee", event = "fallback_recognised");
            return Ok(OpenedMessage {
                plaintext: legacy.plaintext.into_bytes(),
                security_level: SecurityLevel::Fallback,
                needs_decryption: true,
                sender_id: None,
                message_number: None,
                legacy_timestamp_ms: Some(legacy.timestamp_ms),
                legacy_tag: Some(legacy.tag),
            });
        }

        let env = Envelope::from_json(input)?;
        let sid = env.session_id.clone();

        if self.timed(self.store.get_session(&sid)).await?.is_none() {
            return Err(E2eeError::new(ErrorKind::UnknownSessionError));
        }

        let lock = self.locks.session_lock(&sid);
        let _guard = lock.lock().await;

        // Re-read under the lock: another receive may have advanced state.
        let row = self
            .timed(self.store.get_session(&sid))
            .await?
            .ok_or_else(|| E2eeError::new(ErrorKind::UnknownSessionError))?;

        let mut window = ReplayWindow::from_json(&row.replay_window)
            .map_err(|e| E2eeError::with_cause(ErrorKind::StorageError, e))?;

        let n = env.message_number;
        if window.contains(n) {
            return Err(E2eeError::new(ErrorKind::ReplayError));
        }
        if window.is_expired(n) {
            return Err(E2eeError::new(ErrorKind::StaleMessageError));
        }

        let recv_count = row.recv_count as u32;
        let (keys, advance) = if n < recv_count {
            // Chain already moved past this number; only a cached skipped
            // key can open it now.
            let keys = self
                .skipped
                .take(&sid, n)
                .ok_or_else(|| E2eeError::new(ErrorKind::KeyDerivationError))?;
            (keys, None)
        } else {
            let ck = self
                .store
                .open_key32(&row.recv_chain_key_enc)
                .map_err(|e| E2eeError::with_cause(ErrorKind::KeyIntegrityError, e))?;
            let advance = ratchet::derive_for_number(&ck, recv_count, n, self.config.skip_window)?;
            (advance.keys.clone(), Some(advance))
        };

        let iv = env.iv_bytes()?;
        let tag = env.auth_tag_bytes()?;
        let ciphertext = env.ciphertext_bytes()?;

        let expected = integrity_hash(&ciphertext, &iv, &tag, &keys.auth_key);
        if !constant_time_eq(expected.as_bytes(), env.integrity_hash.as_bytes()) {
            return Err(E2eeError::new(ErrorKind::IntegrityError));
        }

        let aad = build_aad(&sid, n, env.metadata.as_deref());
        let plaintext = aead::open(&keys.enc_key, &iv, &ciphertext, &tag, &aad)?;

        // Authenticated: now commit the receive.
        window.mark_delivered(n);
        let window_json = window
            .to_json()
            .map_err(|e| E2eeError::with_cause(ErrorKind::StorageError, e))?;

        if let Some(advance) = advance {
            for (m, skipped_keys) in advance.skipped {
                self.skipped.insert(&sid, m, skipped_keys);
            }
            let sealed_next = self.store.seal_value(&advance.new_chain_key)?;
            self.timed(self.store.advance_recv_chain(
                &sid,
                &sealed_next,
                i64::from(advance.new_count),
                &window_json,
            ))
            .await?;
        } else {
            self.timed(self.store.update_replay_window(&sid, &window_json))
                .await?;
        }

        tracing::debug!(
            target: "vk_e2ee",
            event = "message_decrypted",
            session_id = %sid,
            message_number = n,
        );

        Ok(OpenedMessage {
            plaintext,
            security_level: SecurityLevel::MilitaryGrade,
            needs_decryption: false,
            sender_id: Some(env.sender_id),
            message_number: Some(n),
            legacy_timestamp_ms: None,
            legacy_tag: None,
        })
    }
}

/// AEAD associated data: session id bytes, message number (big-endian),
/// optional caller metadata. Binds the envelope routing fields to the tag.
fn build_aad(session_id: &str, n: u32, metadata: Option<&str>) -> Vec<u8> {
    let mut aad = Vec::with_capacity(session_id.len() + 4);
    aad.extend_from_slice(session_id.as_bytes());
    aad.extend_from_slice(&n.to_be_bytes());
    if let Some(meta) = metadata {
        aad.extend_from_slice(meta.as_bytes());
    }
    aad
}

/// SHA-256(ciphertext || IV || tag || auth key), lowercase hex. A coarse
/// bind-check on top of (not instead of) the GCM tag.
fn integrity_hash(ciphertext: &[u8], iv: &[u8], tag: &[u8], auth_key: &[u8; 32]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ciphertext);
    hasher.update(iv);
    hasher.update(tag);
    hasher.update(auth_key);
    hex::encode(hasher.finalize())
}

fn decode_bundle(bundle: &PublicBundle) -> Result<agreement::PeerBundle, E2eeError> {
    let identity_public = decode_key32(&bundle.identity_public)?;
    let signed_prekey_public = decode_key32(&bundle.signed_pre_key_public)?;
    let signed_prekey_signature = STANDARD
        .decode(&bundle.signed_pre_key_signature)
        .map_err(|e| E2eeError::with_cause(ErrorKind::InvalidKeyError, e))?;
    let one_time_public = bundle
        .one_time_pre_key_public
        .as_deref()
        .map(decode_key32)
        .transpose()?;
    Ok(agreement::PeerBundle {
        identity_public,
        signed_prekey_public,
        signed_prekey_signature,
        one_time_public,
    })
}

fn decode_key32(b64: &str) -> Result<[u8; 32], E2eeError> {
    let bytes = STANDARD
        .decode(b64)
        .map_err(|e| E2eeError::with_cause(ErrorKind::InvalidKeyError, e))?;
    bytes
        .try_into()
        .map_err(|_| E2eeError::new(ErrorKind::InvalidKeyError))
}
