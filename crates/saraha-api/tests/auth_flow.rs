//! End-to-end flows through the real router with an in-memory store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use saraha_api::config::Config;
use saraha_api::identity::{ExternalIdentity, IdentityError, IdentityProvider};
use saraha_api::mailer::{EmailDispatcher, OutboundEmail};
use saraha_api::storage::ObjectStore;
use saraha_api::{AppState, AppStateInner, router};
use saraha_db::Database;
use saraha_db::models::NewUser;

/// Accepts `google:<email>` and `google-unverified:<email>` id tokens.
struct StaticIdentity;

#[async_trait]
impl IdentityProvider for StaticIdentity {
    fn name(&self) -> &str {
        "static"
    }

    async fn verify(&self, id_token: &str) -> Result<ExternalIdentity, IdentityError> {
        let (verified, email) = if let Some(email) = id_token.strip_prefix("google:") {
            (true, email)
        } else if let Some(email) = id_token.strip_prefix("google-unverified:") {
            (false, email)
        } else {
            return Err(IdentityError::Rejected("unknown token".into()));
        };
        Ok(ExternalIdentity {
            email: email.to_string(),
            email_verified: verified,
            name: Some("Google User".into()),
            picture: Some("https://lh3.example/pic".into()),
        })
    }
}

struct RecordingStore(Arc<Mutex<Vec<String>>>);

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn destroy(&self, public_id: &str) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(public_id.to_string());
        Ok(())
    }
}

struct Harness {
    app: Router,
    state: AppState,
    mail: mpsc::Receiver<OutboundEmail>,
    destroyed: Arc<Mutex<Vec<String>>>,
}

fn harness() -> Harness {
    let vars: HashMap<&str, String> = HashMap::from([
        ("SARAHA_ACCESS_TOKEN_SECRET", "test-access-secret".to_string()),
        ("SARAHA_ADMIN_TOKEN_SECRET", "test-admin-secret".to_string()),
        ("SARAHA_REFRESH_TOKEN_SECRET", "test-refresh-secret".to_string()),
        (
            "SARAHA_ENCRYPTION_KEY",
            saraha_crypto::keys::key_to_base64(&[7u8; 32]),
        ),
        ("SARAHA_HASH_MEMORY_KIB", "1024".to_string()),
        ("SARAHA_HASH_ITERATIONS", "1".to_string()),
        ("SARAHA_PUBLIC_URL", "http://saraha.test".to_string()),
    ]);
    let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();

    let db = Arc::new(Database::open_in_memory().unwrap());
    let (mailer, mail) = EmailDispatcher::channel();
    let destroyed = Arc::new(Mutex::new(Vec::new()));

    let state = AppStateInner::new(
        db,
        Arc::new(config),
        mailer,
        Arc::new(StaticIdentity),
        Arc::new(RecordingStore(destroyed.clone())),
    )
    .unwrap();

    Harness {
        app: router(state.clone()),
        state,
        mail,
        destroyed,
    }
}

impl Harness {
    async fn call(
        &self,
        method: &str,
        uri: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("Authorization", auth);
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn next_mail(&mut self) -> OutboundEmail {
        self.mail.try_recv().expect("an email was queued")
    }

    fn drain_mail(&mut self) {
        while self.mail.try_recv().is_ok() {}
    }

    async fn signup(&self, email: &str) -> (StatusCode, Value) {
        self.call(
            "POST",
            "/auth/sign-up",
            None,
            Some(json!({
                "name": "Alice",
                "email": email,
                "password": "secret1",
                "confirmPassword": "secret1",
                "phone": "+201000000000",
                "dob": "1999-04-01",
            })),
        )
        .await
    }

    async fn signin(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.call(
            "POST",
            "/auth/sign-in",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// Signed up, confirmed and signed in. Returns (user id, access, refresh).
    async fn confirmed_user(&mut self, email: &str) -> (String, String, String) {
        let (status, body) = self.signup(email).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let id = body["data"]["user"]["id"].as_str().unwrap().to_string();
        let token = body["data"]["accessToken"].as_str().unwrap().to_string();

        let (status, _) = self
            .call("GET", &format!("/auth/verify-email?token={token}"), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = self.signin(email, "secret1").await;
        assert_eq!(status, StatusCode::OK, "{body}");
        self.drain_mail();
        (
            id,
            body["data"]["accessToken"].as_str().unwrap().to_string(),
            body["data"]["refreshToken"].as_str().unwrap().to_string(),
        )
    }

    /// Inserts a confirmed admin directly and signs in.
    async fn admin(&self) -> String {
        let hash = self.state.hasher.hash("secret1").unwrap();
        self.state
            .db
            .create_user(&NewUser {
                id: &Uuid::new_v4().to_string(),
                name: "Admin",
                email: "admin@x.com",
                password: &hash,
                dob: None,
                gender: "male",
                phone: None,
                role: "admin",
                confirmed: true,
                provider: "system",
                picture_url: None,
            })
            .unwrap();

        let (status, body) = self.signin("admin@x.com", "secret1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["tokenType"], "Admin");
        body["data"]["accessToken"].as_str().unwrap().to_string()
    }
}

fn token_from(email: &OutboundEmail) -> String {
    email
        .text
        .split("token=")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap()
        .to_string()
}

// =============================================================================
// Credential flows
// =============================================================================

#[tokio::test]
async fn signin_requires_email_verification() {
    let mut h = harness();

    let (status, body) = h.signup("a@x.com").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"]["confirmed"], false);
    assert_eq!(body["data"]["user"]["phone"], "+201000000000");
    assert!(body["data"]["user"].get("password").is_none());
    let access = body["data"]["accessToken"].as_str().unwrap().to_string();

    let verification = h.next_mail();
    assert_eq!(verification.to, "a@x.com");
    assert!(verification.text.contains("http://saraha.test/auth/verify-email?token="));

    let (status, body) = h.signin("a@x.com", "secret1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, _) = h
        .call("GET", &format!("/auth/verify-email?token={access}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h.signin("a@x.com", "secret1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["accessToken"].is_string());
    assert!(body["data"]["refreshToken"].is_string());
    assert_eq!(body["data"]["tokenType"], "Bearer");

    // Confirmation is one-way.
    let (status, _) = h
        .call("GET", &format!("/auth/verify-email?token={access}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn verification_link_from_email_confirms() {
    let mut h = harness();
    h.signup("link@x.com").await;
    let token = token_from(&h.next_mail());

    let (status, _) = h
        .call("GET", &format!("/auth/verify-email?token={token}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h.call("GET", "/auth/verify-email", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logged_out_token_cannot_confirm_email() {
    let h = harness();
    let (_, body) = h.signup("a@x.com").await;
    let access = body["data"]["accessToken"].as_str().unwrap().to_string();

    let (status, _) = h
        .call("POST", "/auth/logout", Some(&format!("Bearer {access}")), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h
        .call("GET", &format!("/auth/verify-email?token={access}"), None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token has been revoked");

    let (status, _) = h.signin("a@x.com", "secret1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_and_invalid_signups_are_rejected() {
    let h = harness();
    h.signup("a@x.com").await;

    let (status, body) = h.signup("A@X.com").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already exists");

    let (status, body) = h
        .call(
            "POST",
            "/auth/sign-up",
            None,
            Some(json!({
                "name": "Alice",
                "email": "b@x.com",
                "password": "secret1",
                "confirmPassword": "secret2",
                "phone": "1",
                "dob": "1999-04-01",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "confirm_password");

    let (status, _) = h
        .call("POST", "/auth/sign-up", None, Some(json!({ "email": "c@x.com" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_password_is_bad_request_not_missing() {
    let mut h = harness();
    h.confirmed_user("a@x.com").await;

    let (status, body) = h.signin("a@x.com", "wrong-password").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid password");

    let (status, _) = h.signin("nobody@x.com", "secret1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn google_accounts_never_sign_in_locally() {
    let mut h = harness();

    let google = json!({ "idToken": "google:g@x.com", "dob": "1990-01-01", "phone": "+1555" });
    let (status, body) = h.call("POST", "/auth/google-sign-in", None, Some(google.clone())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let access = body["data"]["accessToken"].as_str().unwrap().to_string();

    let (status, body) = h
        .call("GET", "/users/profile", Some(&format!("Bearer {access}")), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["provider"], "google");
    assert_eq!(body["data"]["confirmed"], true);

    // Second Google sign-in reuses the account.
    let (status, _) = h.call("POST", "/auth/google-sign-in", None, Some(google)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h.signin("g@x.com", "any-guess").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "This account uses a different sign-in provider");

    // And the reverse: a local account cannot be taken over through Google.
    h.confirmed_user("local@x.com").await;
    let (status, _) = h
        .call(
            "POST",
            "/auth/google-sign-in",
            None,
            Some(json!({ "idToken": "google:local@x.com", "dob": "1990-01-01", "phone": "1" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn google_requires_verified_email() {
    let h = harness();

    let (status, body) = h
        .call(
            "POST",
            "/auth/google-sign-in",
            None,
            Some(json!({ "idToken": "google-unverified:u@x.com", "dob": "1990-01-01", "phone": "1" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email is not verified by the identity provider");

    let (status, _) = h
        .call(
            "POST",
            "/auth/google-sign-in",
            None,
            Some(json!({ "idToken": "forged", "dob": "1990-01-01", "phone": "1" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Authorization chain
// =============================================================================

#[tokio::test]
async fn header_shape_errors() {
    let mut h = harness();
    let (_, access, _) = h.confirmed_user("a@x.com").await;

    let cases = [
        (None, StatusCode::UNAUTHORIZED),
        (Some("Bearer".to_string()), StatusCode::BAD_REQUEST),
        (Some(format!("Basic {access}")), StatusCode::BAD_REQUEST),
        (Some("Bearer not-a-jwt".to_string()), StatusCode::UNAUTHORIZED),
        (Some(format!("bearer {access}")), StatusCode::OK),
        (Some(format!("BEARER {access}")), StatusCode::OK),
    ];

    for (header, expected) in cases {
        let (status, body) = h.call("GET", "/users/profile", header.as_deref(), None).await;
        assert_eq!(status, expected, "header {:?}: {}", header, body);
        if expected != StatusCode::OK {
            assert_eq!(body["success"], false);
        }
    }
}

#[tokio::test]
async fn logout_revokes_token_everywhere() {
    let mut h = harness();
    let (_, access, refresh) = h.confirmed_user("a@x.com").await;
    let bearer = format!("Bearer {access}");

    let (status, _) = h.call("GET", "/messages", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h
        .call(
            "POST",
            "/auth/logout",
            Some(&bearer),
            Some(json!({ "refreshToken": refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    for (method, uri) in [("GET", "/users/profile"), ("GET", "/messages"), ("POST", "/auth/logout")] {
        let (status, body) = h.call(method, uri, Some(&bearer), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["message"], "Token has been revoked");
    }

    // The refresh token handed in at logout is dead too.
    let (status, body) = h
        .call("POST", "/auth/refresh-token", Some(&format!("Refresh {refresh}")), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token has been revoked");

    // Signing in again yields fresh, working tokens.
    let (_, body) = h.signin("a@x.com", "secret1").await;
    let fresh = body["data"]["accessToken"].as_str().unwrap();
    let (status, _) = h
        .call("GET", "/users/profile", Some(&format!("Bearer {fresh}")), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_tokens_only_refresh() {
    let mut h = harness();
    let (_, access, refresh) = h.confirmed_user("a@x.com").await;

    let (status, body) = h
        .call("POST", "/auth/refresh-token", Some(&format!("Refresh {refresh}")), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let minted = body["data"]["accessToken"].as_str().unwrap().to_string();
    let (status, _) = h
        .call("GET", "/users/profile", Some(&format!("Bearer {minted}")), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Refresh tokens are useless as bearer credentials.
    let (status, _) = h
        .call("GET", "/users/profile", Some(&format!("Bearer {refresh}")), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The refresh route only takes the refresh prefix.
    let (status, _) = h
        .call("POST", "/auth/refresh-token", Some(&format!("Bearer {access}")), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Access tokens do not verify against the refresh secret.
    let (status, _) = h
        .call("POST", "/auth/refresh-token", Some(&format!("Refresh {access}")), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_and_user_secrets_are_isolated() {
    let mut h = harness();
    let admin = h.admin().await;
    let (_, user, _) = h.confirmed_user("a@x.com").await;

    let (status, _) = h.call("GET", "/reports", Some(&format!("Admin {admin}")), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h.call("GET", "/reports", Some(&format!("Bearer {admin}")), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h.call("GET", "/reports", Some(&format!("Admin {user}")), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = h.call("GET", "/reports", Some(&format!("Bearer {user}")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Admin access required");
}

#[tokio::test]
async fn deleted_principal_is_not_found() {
    let mut h = harness();
    let (_, access, _) = h.confirmed_user("a@x.com").await;
    let bearer = format!("Bearer {access}");

    let (status, _) = h.call("DELETE", "/users/profile", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.next_mail().subject, "Your account was deleted");

    let (status, body) = h.call("GET", "/users/profile", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");
}

// =============================================================================
// Users
// =============================================================================

#[tokio::test]
async fn resend_confirmation_uses_refresh_token() {
    let mut h = harness();
    let (_, body) = h.signup("a@x.com").await;
    let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();
    h.drain_mail();

    let (status, _) = h
        .call(
            "PUT",
            "/users/resend-confirm-email",
            Some(&format!("Refresh {refresh}")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = token_from(&h.next_mail());

    let (status, _) = h
        .call("GET", &format!("/auth/verify-email?token={token}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h
        .call(
            "PUT",
            "/users/resend-confirm-email",
            Some(&format!("Refresh {refresh}")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already confirmed");
}

#[tokio::test]
async fn unconfirmed_accounts_cannot_be_deleted() {
    let h = harness();
    let (_, body) = h.signup("a@x.com").await;
    let access = body["data"]["accessToken"].as_str().unwrap();

    let (status, _) = h
        .call("DELETE", "/users/profile", Some(&format!("Bearer {access}")), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn password_reset_with_otp() {
    let mut h = harness();
    h.confirmed_user("a@x.com").await;

    let (status, _) = h
        .call("POST", "/users/forget-password", None, Some(json!({ "email": "nobody@x.com" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let reset = |otp: &str| {
        json!({
            "email": "a@x.com",
            "otp": otp,
            "newPassword": "secret2",
            "confirmPassword": "secret2",
        })
    };

    let (status, body) = h
        .call("POST", "/users/reset-password", None, Some(reset("123456")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No password reset was requested");

    let (status, _) = h
        .call("POST", "/users/forget-password", None, Some(json!({ "email": "a@x.com" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let mail = h.next_mail();
    let otp: String = mail.text.chars().filter(|c| c.is_ascii_digit()).take(6).collect();
    assert_eq!(otp.len(), 6);

    let wrong = if otp == "000000" { "111111" } else { "000000" };
    let (status, body) = h
        .call("POST", "/users/reset-password", None, Some(reset(wrong)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid OTP");

    let (status, _) = h
        .call("POST", "/users/reset-password", None, Some(reset(&otp)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.next_mail().subject, "Your password was changed");

    let (status, _) = h.signin("a@x.com", "secret1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = h.signin("a@x.com", "secret2").await;
    assert_eq!(status, StatusCode::OK);

    // The code is single-use.
    let (status, _) = h
        .call("POST", "/users/reset-password", None, Some(reset(&otp)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_update_replaces_picture() {
    let mut h = harness();
    let (_, access, _) = h.confirmed_user("a@x.com").await;
    let bearer = format!("Bearer {access}");

    let (status, _) = h.call("PATCH", "/users/profile", Some(&bearer), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call("PATCH", "/users/profile", Some(&bearer), Some(json!({ "gender": "other" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let picture = |id: &str| {
        json!({ "profilePicture": { "public_id": id, "secure_url": "https://cdn/x", "display_name": "me" } })
    };
    let (status, body) = h
        .call("PATCH", "/users/profile", Some(&bearer), Some(picture("users/one")))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["profilePicture"]["public_id"], "users/one");

    let (status, body) = h
        .call(
            "PATCH",
            "/users/profile",
            Some(&bearer),
            Some(json!({ "name": "Alicia", "phone": "+44123", "gender": "female" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Alicia");
    assert_eq!(body["data"]["phone"], "+44123");
    assert_eq!(body["data"]["profilePicture"]["public_id"], "users/one");
    assert!(h.destroyed.lock().unwrap().is_empty());

    let (status, _) = h
        .call("PATCH", "/users/profile", Some(&bearer), Some(picture("users/two")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(*h.destroyed.lock().unwrap(), vec!["users/one".to_string()]);
}

// =============================================================================
// Messages and reports
// =============================================================================

#[tokio::test]
async fn messages_and_reports() {
    let mut h = harness();
    let (alice_id, alice, _) = h.confirmed_user("alice@x.com").await;
    let (_, bob, _) = h.confirmed_user("bob@x.com").await;
    let alice_auth = format!("Bearer {alice}");
    let bob_auth = format!("Bearer {bob}");

    // Anonymous.
    let (status, body) = h
        .call(
            "POST",
            "/messages/send",
            None,
            Some(json!({ "content": "  hello  ", "userId": alice_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["content"], "hello");
    assert!(body["data"]["senderId"].is_null());
    let anonymous_id = body["data"]["id"].as_str().unwrap().to_string();

    // Authenticated sender is taken from the credential.
    let (status, body) = h
        .call(
            "POST",
            "/messages/send",
            Some(&bob_auth),
            Some(json!({
                "userId": alice_id,
                "attachments": [{ "public_id": "att/1", "secure_url": "https://cdn/1", "asset_id": "a1" }],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["data"]["senderId"].is_string());
    let from_bob = body["data"]["id"].as_str().unwrap().to_string();

    // Broken credentials are not silently downgraded to anonymous.
    let (status, _) = h
        .call(
            "POST",
            "/messages/send",
            Some("Bearer garbage"),
            Some(json!({ "content": "hi", "userId": alice_id })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
        .call(
            "POST",
            "/messages/send",
            Some(&alice_auth),
            Some(json!({ "content": "me", "userId": alice_id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call("POST", "/messages/send", None, Some(json!({ "userId": alice_id })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call(
            "POST",
            "/messages/send",
            None,
            Some(json!({ "content": "hi", "userId": Uuid::new_v4() })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Listing, newest first.
    let (status, body) = h.call("GET", "/messages?page=1&limit=10", Some(&alice_auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["messages"][0]["id"], from_bob.as_str());
    assert_eq!(body["data"]["messages"][1]["id"], anonymous_id.as_str());

    let (status, _) = h.call("GET", "/messages?limit=500", Some(&alice_auth), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Only the recipient (or an admin) may edit, delete or report.
    let (status, _) = h
        .call("DELETE", &format!("/messages/{anonymous_id}"), Some(&bob_auth), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h
        .call(
            "POST",
            &format!("/messages/{anonymous_id}/report"),
            Some(&bob_auth),
            Some(json!({ "reason": "spam" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = h
        .call(
            "PATCH",
            &format!("/messages/{from_bob}"),
            Some(&alice_auth),
            Some(json!({ "content": "edited", "attachments": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["content"], "edited");
    assert_eq!(*h.destroyed.lock().unwrap(), vec!["att/1".to_string()]);

    let (status, body) = h
        .call(
            "POST",
            &format!("/messages/{anonymous_id}/report"),
            Some(&alice_auth),
            Some(json!({ "reason": "  rude  " })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["reason"], "rude");
    let report_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = h
        .call("DELETE", "/messages/not-a-uuid", Some(&alice_auth), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Admin review.
    let admin = format!("Admin {}", h.admin().await);
    let (status, body) = h.call("GET", "/reports", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], report_id.as_str());

    let (status, _) = h
        .call(
            "PATCH",
            &format!("/reports/{report_id}"),
            Some(&admin),
            Some(json!({ "status": "pending" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h
        .call(
            "PATCH",
            &format!("/reports/{report_id}"),
            Some(&admin),
            Some(json!({ "status": "reviewed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "reviewed");

    let (status, _) = h
        .call(
            "PATCH",
            &format!("/reports/{}", Uuid::new_v4()),
            Some(&admin),
            Some(json!({ "status": "dismissed" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Admins may delete any message.
    let (status, _) = h
        .call("DELETE", &format!("/messages/{anonymous_id}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = h.call("GET", "/messages", Some(&alice_auth), None).await;
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn welcome_and_fallback() {
    let h = harness();

    let (status, body) = h.call("GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = h.call("GET", "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Route not found");
    assert_eq!(body["success"], false);
}
