//! Message-layer security scenarios: envelope authenticity, replay
//! bounds, peer-key rotation.

#[cfg(test)]
mod tests {
    use shared_crypto::{
        ecies, IdentityKeyPair, KeyEvent, PeerKeyCache, SignedEnvelope,
        DEFAULT_REPLAY_WINDOW_SECS,
    };
    use shared_types::PeerTag;

    #[test]
    fn test_key_rotation_warns_exactly_once() {
        let cache = PeerKeyCache::new();
        let peer = PeerTag::new("peer-p");
        let key1 = IdentityKeyPair::generate();
        let key2 = IdentityKeyPair::generate();

        // Envelope 1 under K1: first sighting pins the key.
        let envelope1 = SignedEnvelope::seal(&key1, "order_announcement", vec![1], 1_000);
        let signer1 = envelope1.verify().unwrap();
        assert_eq!(cache.observe(&peer, signer1, 1_000), KeyEvent::FirstSeen);

        // Envelope 2 under K2: valid signature, accepted, pin rotates,
        // exactly one key_changed event.
        let envelope2 = SignedEnvelope::seal(&key2, "order_announcement", vec![2], 1_010);
        let signer2 = envelope2.verify().unwrap();
        assert_eq!(
            cache.observe(&peer, signer2, 1_010),
            KeyEvent::Changed {
                previous: key1.public_key()
            }
        );

        // Further envelopes under K2 are quiet.
        let envelope3 = SignedEnvelope::seal(&key2, "order_announcement", vec![3], 1_020);
        let signer3 = envelope3.verify().unwrap();
        assert_eq!(cache.observe(&peer, signer3, 1_020), KeyEvent::Unchanged);
        assert_eq!(cache.pinned_key(&peer), Some(key2.public_key()));
    }

    #[test]
    fn test_forged_envelope_never_validates() {
        let honest = IdentityKeyPair::generate();
        let forger = IdentityKeyPair::generate();

        // The forger signs but claims the honest identity's key.
        let mut envelope = SignedEnvelope::seal(&forger, "proposal", vec![9], 1_000);
        envelope.signer_pubkey = honest.public_key();
        assert!(envelope.verify().is_err());
    }

    #[test]
    fn test_replay_window_bounds_old_envelopes() {
        let keypair = IdentityKeyPair::generate();
        let envelope = SignedEnvelope::seal(&keypair, "order_request", vec![], 1_000);

        let now_inside = 1_000 + DEFAULT_REPLAY_WINDOW_SECS;
        let now_outside = now_inside + 1;
        assert!(envelope
            .verify_fresh(now_inside, DEFAULT_REPLAY_WINDOW_SECS)
            .is_ok());
        assert!(envelope
            .verify_fresh(now_outside, DEFAULT_REPLAY_WINDOW_SECS)
            .is_err());
    }

    #[test]
    fn test_ecies_envelope_tamper_matrix() {
        let recipient = IdentityKeyPair::generate();
        let plaintext = b"price=12 amount=100";
        let sealed = ecies::encrypt(&recipient.public_key(), plaintext).unwrap();

        // Untampered decrypts.
        assert_eq!(ecies::decrypt(&recipient, &sealed).unwrap(), plaintext);

        // Each field flipped independently breaks authentication.
        let mut bad = sealed.clone();
        bad.nonce[0] ^= 1;
        assert!(ecies::decrypt(&recipient, &bad).is_err());

        let mut bad = sealed.clone();
        bad.ciphertext[0] ^= 1;
        assert!(ecies::decrypt(&recipient, &bad).is_err());

        let mut bad = sealed.clone();
        bad.tag[15] ^= 1;
        assert!(ecies::decrypt(&recipient, &bad).is_err());

        let mut bad = sealed;
        // A different valid point as the ephemeral key.
        let decoy = ecies::encrypt(&recipient.public_key(), b"decoy").unwrap();
        bad.ephemeral_pubkey = decoy.ephemeral_pubkey;
        assert!(ecies::decrypt(&recipient, &bad).is_err());
    }
}
