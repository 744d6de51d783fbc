//! Trust token lifecycle tests.
//!
//! Mint through the pipeline, ship the token as JSON, and validate it on a
//! second instance that shares the secret.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use serde_json::json;
use trustgate::audit::MemoryAuditSink;
use trustgate::token::{MintOptions, TokenRejection};
use trustgate::{
    SanitizationPipeline, SanitizeOptions, SigningKey, TokenValidation, TrustToken,
    TrustTokenIntegrity,
};

const SECRET: &str = "shared-e2e-secret-0123456789abcdef";

fn integrity() -> TrustTokenIntegrity {
    TrustTokenIntegrity::new(SigningKey::from_secret(SECRET).unwrap())
}

fn rules() -> Vec<String> {
    vec!["unicode-normalization".to_string(), "pattern-redaction".to_string()]
}

async fn minted_token() -> TrustToken {
    let p = SanitizationPipeline::builder().trust_tokens(integrity()).build();
    let out = p
        .sanitize(&json!("hello <b>world</b>"), &SanitizeOptions::new().with_trust_token())
        .await
        .unwrap();
    out.trust_token().unwrap().clone()
}

#[tokio::test]
async fn test_token_survives_wire_and_validates_elsewhere() {
    let token = minted_token().await;
    let wire = serde_json::to_string(&token).unwrap();

    let received = TrustToken::from_json(&wire).unwrap();
    assert_eq!(received, token);
    assert_eq!(integrity().validate(&received), TokenValidation::Valid);
}

#[tokio::test]
async fn test_other_secret_rejects() {
    let token = minted_token().await;
    let other = TrustTokenIntegrity::new(SigningKey::from_secret("a-different-secret-0123456789").unwrap());
    assert_eq!(
        other.validate(&token),
        TokenValidation::Invalid(TokenRejection::InvalidSignature)
    );
}

#[tokio::test]
async fn test_every_signed_field_is_bound() {
    let token = minted_token().await;
    let tokens = integrity();

    let mutations: Vec<Box<dyn Fn(&mut TrustToken)>> = vec![
        Box::new(|t: &mut TrustToken| t.content_hash.push('0')),
        Box::new(|t: &mut TrustToken| t.original_hash = t.original_hash.replace('a', "b") + "c"),
        Box::new(|t: &mut TrustToken| t.sanitization_version = "9.9".into()),
        Box::new(|t: &mut TrustToken| {
            t.rules_applied
                .get_or_insert_with(Vec::new)
                .push("extra".into())
        }),
        Box::new(|t: &mut TrustToken| {
            if let Some(rules) = t.rules_applied.as_mut() {
                rules.reverse();
            }
        }),
        Box::new(|t: &mut TrustToken| t.timestamp = "2020-01-01T00:00:00.000Z".into()),
        Box::new(|t: &mut TrustToken| t.expires_at = "2999-01-01T00:00:00.000Z".into()),
        Box::new(|t: &mut TrustToken| t.signature = "00".repeat(32)),
    ];

    for (i, mutate) in mutations.iter().enumerate() {
        let mut tampered = token.clone();
        mutate(&mut tampered);
        assert!(!tokens.validate(&tampered).is_valid(), "mutation {i} accepted");
    }
}

#[test]
fn test_expiry_boundary() {
    let tokens = integrity();
    let issued = Utc::now();
    let token = tokens
        .mint(
            "s",
            "o",
            &rules(),
            &MintOptions::default()
                .issued_at(issued)
                .with_expiration(TimeDelta::minutes(5)),
        )
        .unwrap();

    assert!(tokens.validate_at(&token, issued).is_valid());
    assert!(tokens
        .validate_at(&token, issued + TimeDelta::minutes(4))
        .is_valid());
    assert_eq!(
        tokens.validate_at(&token, issued + TimeDelta::minutes(5)),
        TokenValidation::Invalid(TokenRejection::Expired)
    );
}

#[test]
fn test_partial_wire_token_reports_missing_field() {
    let token = TrustToken::from_json(r#"{"contentHash":"abc","originalHash":"def"}"#).unwrap();
    let validation = integrity().validate(&token);

    assert_eq!(
        validation.error().as_deref(),
        Some("Missing required field: sanitizationVersion")
    );
    assert_eq!(
        serde_json::to_value(&validation).unwrap(),
        json!({"isValid": false, "error": "Missing required field: sanitizationVersion"})
    );
}

#[test]
fn test_malformed_expiry() {
    let tokens = integrity();
    let mut token = tokens.mint("s", "o", &rules(), &MintOptions::default()).unwrap();
    token.expires_at = "tomorrow".into();
    assert!(matches!(
        tokens.validate(&token),
        TokenValidation::Invalid(TokenRejection::MalformedExpiry(_))
    ));
}

#[tokio::test]
async fn test_valid_presented_token_does_not_skip_sanitization() {
    let sink = Arc::new(MemoryAuditSink::new());
    let p = SanitizationPipeline::builder()
        .trust_tokens(integrity())
        .audit_sink(sink.clone())
        .build();

    let input = json!("ping <script>x</script> 555-123-4567");
    let first = p
        .sanitize(&input, &SanitizeOptions::new().with_trust_token())
        .await
        .unwrap();
    let token = first.trust_token().unwrap().clone();

    let plain = p.sanitize(&input, &SanitizeOptions::default()).await.unwrap();
    let presented = p
        .sanitize(&input, &SanitizeOptions::new().presenting(token))
        .await
        .unwrap();

    assert_eq!(plain, presented);
    assert_eq!(presented.value(), first.value());
    assert_eq!(presented.value(), &json!("ping  PHONE_REDACTED"));

    let records = sink.processing_records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].presented_token, Some(TokenValidation::Valid));
    assert_eq!(p.stats().tokens_rejected(), 0);
}

#[tokio::test]
async fn test_token_from_empty_stage_chain_validates() {
    let p = SanitizationPipeline::builder()
        .stages(Vec::new())
        .trust_tokens(integrity())
        .build();
    let out = p
        .sanitize(&json!("as is"), &SanitizeOptions::new().with_trust_token())
        .await
        .unwrap();

    let token = out.trust_token().unwrap().clone();
    assert_eq!(token.rules_applied, Some(Vec::new()));

    let received = TrustToken::from_json(&serde_json::to_string(&token).unwrap()).unwrap();
    assert_eq!(integrity().validate(&received), TokenValidation::Valid);
}

#[test]
fn test_wire_token_without_rules_list_is_missing_field() {
    let mut token = integrity()
        .mint("s", "o", &rules(), &MintOptions::default())
        .unwrap();
    token.rules_applied = None;
    let wire = serde_json::to_string(&token).unwrap();
    assert!(!wire.contains("rulesApplied"));

    let received = TrustToken::from_json(&wire).unwrap();
    assert_eq!(
        integrity().validate(&received),
        TokenValidation::Invalid(TokenRejection::MissingField("rulesApplied"))
    );
}
