use std::sync::Arc;
use std::time::Duration;

use bobs_bytes::auth::token::{ClaimKind, ClaimPayload, TokenService};
use bobs_bytes::auth::user::UserId;
use bobs_bytes::clock::ManualClock;
use bobs_bytes::error::TokenError;

const SECRET: &str = "integration-signing-key-7Hq2!mZ9#rX4wLp0";

fn service() -> (TokenService, ManualClock) {
    let clock = ManualClock::starting_now();
    let tokens = TokenService::with_clock(SECRET, Arc::new(clock.clone()));
    (tokens, clock)
}

#[test]
fn test_confirm_token_lifecycle() {
    let (tokens, clock) = service();
    let token = tokens
        .issue(ClaimKind::Confirm, UserId(42), ClaimPayload::empty(), Duration::from_secs(3600))
        .unwrap();

    assert_eq!(tokens.verify(&token, ClaimKind::Confirm, UserId(42)), Ok(ClaimPayload::empty()));
    assert_eq!(
        tokens.verify(&token, ClaimKind::Confirm, UserId(43)),
        Err(TokenError::Mismatch)
    );
    assert_eq!(
        tokens.verify(&token, ClaimKind::Reset, UserId(42)),
        Err(TokenError::Mismatch)
    );

    clock.advance_secs(3601);
    assert_eq!(
        tokens.verify(&token, ClaimKind::Confirm, UserId(42)),
        Err(TokenError::Expired)
    );
}

#[test]
fn test_change_email_payload_round_trip() {
    let (tokens, _) = service();
    let token = tokens.generate_email_change_token(UserId(7), "next@example.com").unwrap();
    let payload = tokens.verify(&token, ClaimKind::ChangeEmail, UserId(7)).unwrap();
    assert_eq!(payload.new_email.as_deref(), Some("next@example.com"));
}

#[test]
fn test_any_altered_character_invalidates() {
    let (tokens, _) = service();
    let token = tokens.generate_reset_token(UserId(5)).unwrap();

    for i in 0..token.len() {
        let mut bytes = token.clone().into_bytes();
        bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert_eq!(
            tokens.verify(&tampered, ClaimKind::Reset, UserId(5)),
            Err(TokenError::Invalid),
            "tampering at position {} went unnoticed",
            i
        );
    }
}

#[test]
fn test_truncated_and_garbage_tokens() {
    let (tokens, _) = service();
    let token = tokens.generate_confirmation_token(UserId(1)).unwrap();

    assert_eq!(
        tokens.verify(&token[..token.len() - 1], ClaimKind::Confirm, UserId(1)),
        Err(TokenError::Invalid)
    );
    assert_eq!(
        tokens.verify("not-a-token", ClaimKind::Confirm, UserId(1)),
        Err(TokenError::Invalid)
    );
}

#[test]
fn test_secret_rotation_invalidates_outstanding_tokens() {
    let (tokens, _) = service();
    let token = tokens.generate_confirmation_token(UserId(1)).unwrap();

    let rotated = TokenService::new("rotated-signing-key-0Vb8@kN3$tY6uQ1e");
    assert_eq!(
        rotated.verify(&token, ClaimKind::Confirm, UserId(1)),
        Err(TokenError::Invalid)
    );
}

#[test]
fn test_configured_lifetimes() {
    let (tokens, clock) = service();
    let tokens = tokens.with_ttls(Duration::from_secs(60), Duration::from_secs(600));
    assert_eq!(tokens.token_ttl(), Duration::from_secs(60));

    let reset = tokens.generate_reset_token(UserId(2)).unwrap();
    let session = tokens.generate_session_token(UserId(2)).unwrap();

    clock.advance_secs(61);
    assert_eq!(
        tokens.verify(&reset, ClaimKind::Reset, UserId(2)),
        Err(TokenError::Expired)
    );
    assert_eq!(tokens.verify_session(&session), Ok(UserId(2)));
}
