use chrono::{Duration, Utc};
use keygate_core::auth::{generate_secure_token, hash_token};
use keygate_core::domain::{RefreshToken, User};
use keygate_core::store::{RefreshTokenStorage, UserLookup};
use keygate_core::AuthError;
use keygate_core::TestApp;
use uuid::Uuid;

async fn user(app: &TestApp, email: &str) -> User {
    let user = User::new(email, None);
    app.state.users.create(&user).await.unwrap();
    user
}

// ═══ Issue ═══

#[tokio::test]
async fn test_issue_stores_only_the_hash() {
    let app = TestApp::new().await;
    let alice = user(&app, "alice@example.com").await;

    let issued = app.state.refresh.issue(alice.id).await.unwrap();

    assert_eq!(issued.token.len(), 64);
    assert_ne!(issued.record.token_hash, issued.token);
    assert_eq!(issued.record.token_hash, hash_token(&issued.token));

    let stored = app.state.refresh.validate(&issued.token).await.unwrap();
    assert_eq!(stored.id, issued.record.id);
    assert_eq!(stored.user_id, alice.id);
    assert!(stored.expires_at > Utc::now().naive_utc() + Duration::days(6));
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .state
        .refresh
        .validate(&generate_secure_token())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound(_)));
}

// ═══ Revoke ═══

#[tokio::test]
async fn test_revoked_token_is_invalid_and_revoke_is_idempotent() {
    let app = TestApp::new().await;
    let alice = user(&app, "alice@example.com").await;
    let issued = app.state.refresh.issue(alice.id).await.unwrap();

    app.state.refresh.revoke(issued.record.id).await.unwrap();
    let err = app.state.refresh.validate(&issued.token).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(_)));

    app.state.refresh.revoke(issued.record.id).await.unwrap();
    app.state.refresh.revoke(Uuid::new_v4()).await.unwrap();
}

#[tokio::test]
async fn test_revoke_all_only_touches_one_user() {
    let app = TestApp::new().await;
    let alice = user(&app, "alice@example.com").await;
    let bob = user(&app, "bob@example.com").await;

    let a1 = app.state.refresh.issue(alice.id).await.unwrap();
    let a2 = app.state.refresh.issue(alice.id).await.unwrap();
    let b1 = app.state.refresh.issue(bob.id).await.unwrap();
    app.state.refresh.revoke(a2.record.id).await.unwrap();

    let revoked = app.state.refresh.revoke_all_for_user(alice.id).await.unwrap();
    assert_eq!(revoked, 1, "already revoked rows are left alone");

    assert!(app.state.refresh.validate(&a1.token).await.is_err());
    assert!(app.state.refresh.validate(&a2.token).await.is_err());
    assert!(app.state.refresh.validate(&b1.token).await.is_ok());
}

// ═══ Expiry ═══

#[tokio::test]
async fn test_expired_token_is_invalid_and_swept() {
    let app = TestApp::new().await;
    let alice = user(&app, "alice@example.com").await;
    let now = Utc::now().naive_utc();

    let plaintext = generate_secure_token();
    let expired = RefreshToken {
        id: Uuid::new_v4(),
        user_id: alice.id,
        token_hash: hash_token(&plaintext),
        expires_at: now - Duration::minutes(1),
        created_at: now - Duration::days(8),
        revoked_at: None,
    };
    app.state.refresh_tokens.create(&expired).await.unwrap();
    let live = app.state.refresh.issue(alice.id).await.unwrap();

    let err = app.state.refresh.validate(&plaintext).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(_)));

    assert_eq!(app.state.refresh.sweep_expired().await.unwrap(), 1);
    let err = app.state.refresh.validate(&plaintext).await.unwrap_err();
    assert!(matches!(err, AuthError::NotFound(_)));
    assert!(app.state.refresh.validate(&live.token).await.is_ok());
}

// ═══ Rotation ═══

#[tokio::test]
async fn test_rotate_revokes_old_and_issues_new() {
    let app = TestApp::new().await;
    let alice = user(&app, "alice@example.com").await;
    let first = app.state.refresh.issue(alice.id).await.unwrap();

    let current = app.state.refresh.validate(&first.token).await.unwrap();
    let second = app.state.refresh.rotate(&current).await.unwrap();

    assert!(app.state.refresh.validate(&first.token).await.is_err());
    let renewed = app.state.refresh.validate(&second.token).await.unwrap();
    assert_eq!(renewed.user_id, alice.id);
}

#[tokio::test]
async fn test_second_rotation_of_same_record_fails() {
    let app = TestApp::new().await;
    let alice = user(&app, "alice@example.com").await;
    let first = app.state.refresh.issue(alice.id).await.unwrap();
    let current = app.state.refresh.validate(&first.token).await.unwrap();

    app.state.refresh.rotate(&current).await.unwrap();
    let err = app.state.refresh.rotate(&current).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid(_)));

    let rows = app.state.refresh_tokens.find_by_user(alice.id).await.unwrap();
    assert_eq!(rows.len(), 2, "losing rotation must not insert a token");
    assert_eq!(rows.iter().filter(|t| t.is_valid()).count(), 1);
}
