mod common;

use chrono::{TimeZone, Utc};
use common::FlakyGateway;
use grading_evaluator::error::{AppError, AuthError, DeletionStep, ValidationError};
use grading_evaluator::infrastructure::cache::LAST_LOGGED_IN_KEY;
use grading_evaluator::infrastructure::{
    AuthProvider, Collection, LocalAuthProvider, LocalCache, MemoryCache, PersistenceGateway,
};
use grading_evaluator::models::{Settings, Theme};
use grading_evaluator::services::{
    ProfileUpdate, ProfileUpdateOutcome, SessionManager, SessionState,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const EMAIL: &str = "ana@escuela.es";
const PASSWORD: &str = "secreta1";

struct Harness {
    auth: Arc<LocalAuthProvider>,
    gateway: Arc<FlakyGateway>,
    cache: Arc<MemoryCache>,
    session: SessionManager,
}

fn harness() -> Harness {
    let auth = Arc::new(LocalAuthProvider::with_account("u1", "Ana", EMAIL, PASSWORD).unwrap());
    let gateway = Arc::new(FlakyGateway::new());
    let cache = Arc::new(MemoryCache::new());
    let session = SessionManager::new(auth.clone(), gateway.clone(), cache.clone());
    Harness {
        auth,
        gateway,
        cache,
        session,
    }
}

impl Harness {
    async fn sign_in(&self) -> SessionState {
        self.session.sign_in(EMAIL, PASSWORD).await.unwrap()
    }

    async fn seed_data(&self) {
        for name in ["Historia", "Lengua"] {
            self.gateway
                .add("u1", Collection::Subjects, json!({ "name": name }))
                .await
                .unwrap();
        }
        self.gateway
            .add("u1", Collection::Tasks, json!({ "fileName": "ana.pdf", "score": 8 }))
            .await
            .unwrap();
    }

    async fn count(&self, collection: Collection) -> usize {
        self.gateway.inner.list("u1", collection).await.unwrap().len()
    }
}

#[tokio::test]
async fn test_persisted_profile_wins_over_auth_fields() {
    let h = harness();
    h.gateway
        .merge_profile("u1", json!({ "name": "B", "role": "teacher" }))
        .await
        .unwrap();

    let state = h.sign_in().await;
    let session = state.session().unwrap();
    let profile = session.profile.as_ref().unwrap();
    assert_eq!(profile.id, "u1");
    assert_eq!(profile.name, "B");
    assert_eq!(profile.email, EMAIL);
    assert_eq!(h.session.state(), state);

    let cached = h.cache.get("user_u1").await.unwrap().unwrap();
    assert!(cached.contains("\"B\""));
    assert_eq!(
        h.cache.get(LAST_LOGGED_IN_KEY).await.unwrap().as_deref(),
        Some("u1")
    );
}

#[tokio::test]
async fn test_restore_follows_provider_state() {
    let h = harness();
    assert_eq!(h.session.restore().await, SessionState::Anonymous);

    h.auth.sign_in(EMAIL, PASSWORD).await.unwrap();
    let state = h.session.restore().await;
    assert_eq!(state.session().unwrap().uid(), "u1");
    assert_eq!(h.session.state(), state);
    assert!(h.cache.get("user_u1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_offline_sign_in_uses_cached_profile() {
    let h = harness();
    h.cache
        .set("user_u1", &json!({ "id": "u1", "name": "Ana Cacheada" }).to_string())
        .await
        .unwrap();
    h.gateway.profile_offline.store(true, Ordering::SeqCst);

    let state = h.sign_in().await;
    let session = state.session().unwrap();
    assert!(!session.is_degraded());
    assert_eq!(session.profile.as_ref().unwrap().name, "Ana Cacheada");
}

#[tokio::test]
async fn test_offline_sign_in_without_cache_is_degraded() {
    let h = harness();
    h.gateway.profile_offline.store(true, Ordering::SeqCst);

    let state = h.sign_in().await;
    let session = state.session().unwrap();
    assert!(session.is_degraded());
    assert_eq!(session.uid(), "u1");
}

#[tokio::test]
async fn test_persisted_theme_applied_on_sign_in() {
    let h = harness();
    h.gateway
        .merge_profile("u1", json!({ "settings": { "theme": "dark" } }))
        .await
        .unwrap();
    let theme = h.session.theme();
    assert_eq!(*theme.borrow(), Theme::Light);

    h.sign_in().await;
    assert_eq!(*theme.borrow(), Theme::Dark);
}

#[tokio::test]
async fn test_load_settings_creates_initial_document() {
    let h = harness();
    h.sign_in().await;
    assert_eq!(h.gateway.get_profile("u1").await.unwrap(), None);

    let settings = h.session.load_settings().await.unwrap();
    assert_eq!(settings, Settings::default());

    let doc = h.gateway.get_profile("u1").await.unwrap().unwrap();
    assert_eq!(doc["settings"]["theme"], "light");
    assert_eq!(doc["name"], "Ana");
    assert_eq!(doc["email"], EMAIL);
    assert!(doc["updatedAt"].is_string());
}

#[tokio::test]
async fn test_save_settings_writes_through_to_cache() {
    let h = harness();
    h.sign_in().await;

    let mut settings = Settings {
        theme: Theme::Dark,
        language: "en".to_string(),
        ..Settings::default()
    };
    settings.privacy.show_email = true;
    h.session.save_settings(&settings).await.unwrap();

    let doc = h.gateway.get_profile("u1").await.unwrap().unwrap();
    assert_eq!(doc["settings"]["theme"], "dark");
    assert_eq!(h.cache.get("theme_u1").await.unwrap().as_deref(), Some("dark"));
    assert_eq!(h.cache.get("showEmail_u1").await.unwrap().as_deref(), Some("true"));
    assert_eq!(h.session.cached_settings("u1").await.unwrap(), Some(settings.clone()));
    assert_eq!(*h.session.theme().borrow(), Theme::Dark);

    // 离线时从缓存读取
    h.gateway.profile_offline.store(true, Ordering::SeqCst);
    assert_eq!(h.session.load_settings().await.unwrap(), settings);
}

#[tokio::test]
async fn test_settings_require_a_session() {
    let h = harness();
    assert!(matches!(
        h.session.save_settings(&Settings::default()).await,
        Err(AppError::Validation(ValidationError::NotAuthenticated))
    ));
}

#[tokio::test]
async fn test_sign_up_checks_confirmation_first() {
    let h = harness();
    let result = h
        .session
        .sign_up("Luis", "luis@escuela.es", "secreta1", "secreta2")
        .await;
    assert!(matches!(
        result,
        Err(AppError::Validation(ValidationError::PasswordMismatch))
    ));
    assert_eq!(h.session.state(), SessionState::Anonymous);
    assert!(matches!(
        h.session.sign_in("luis@escuela.es", "secreta1").await,
        Err(AppError::Auth(AuthError::UserNotFound))
    ));
}

#[tokio::test]
async fn test_sign_out_clears_cached_profile() {
    let h = harness();
    h.sign_in().await;
    h.session.sign_out().await.unwrap();

    assert_eq!(h.session.state(), SessionState::Anonymous);
    assert_eq!(h.cache.get("user_u1").await.unwrap(), None);
    assert_eq!(h.cache.get(LAST_LOGGED_IN_KEY).await.unwrap(), None);
    assert!(h.auth.current_user().is_none());
}

#[tokio::test]
async fn test_update_profile_validates_passwords_before_provider() {
    let h = harness();
    h.sign_in().await;

    let mismatch = ProfileUpdate {
        name: "Ana María".to_string(),
        email: EMAIL.to_string(),
        new_password: "nueva123".to_string(),
        confirm_password: "nueva124".to_string(),
    };
    assert!(matches!(
        h.session.update_profile(mismatch).await,
        Err(AppError::Validation(ValidationError::PasswordMismatch))
    ));

    let weak = ProfileUpdate {
        name: "Ana María".to_string(),
        email: EMAIL.to_string(),
        new_password: "abc".to_string(),
        confirm_password: "abc".to_string(),
    };
    assert!(matches!(
        h.session.update_profile(weak).await,
        Err(AppError::Validation(ValidationError::WeakPassword { .. }))
    ));

    // 校验失败时姓名没有被修改
    assert_eq!(
        h.auth.current_user().unwrap().display_name.as_deref(),
        Some("Ana")
    );
}

#[tokio::test]
async fn test_update_profile_applies_changes() {
    let h = harness();
    h.sign_in().await;

    let unchanged = ProfileUpdate {
        name: "Ana".to_string(),
        email: EMAIL.to_string(),
        ..Default::default()
    };
    assert_eq!(
        h.session.update_profile(unchanged).await.unwrap(),
        ProfileUpdateOutcome::NoChanges
    );

    let renamed = ProfileUpdate {
        name: "  Ana María ".to_string(),
        email: EMAIL.to_string(),
        new_password: "nueva123".to_string(),
        confirm_password: "nueva123".to_string(),
    };
    assert_eq!(
        h.session.update_profile(renamed).await.unwrap(),
        ProfileUpdateOutcome::Updated
    );

    let doc = h.gateway.get_profile("u1").await.unwrap().unwrap();
    assert_eq!(doc["name"], "Ana María");
    assert_eq!(
        h.session.state().session().unwrap().profile.as_ref().unwrap().name,
        "Ana María"
    );

    h.session.sign_out().await.unwrap();
    assert!(h.session.sign_in(EMAIL, "nueva123").await.is_ok());
}

#[tokio::test]
async fn test_export_account_data() {
    let h = harness();
    h.seed_data().await;
    h.sign_in().await;

    let now = Utc.with_ymd_and_hms(2026, 5, 2, 8, 0, 0).unwrap();
    let export = h.session.export_account_data(now).await.unwrap();
    assert_eq!(export.profile.name, "Ana");
    assert_eq!(export.tasks.as_ref().unwrap().len(), 1);
    assert_eq!(export.subjects.as_ref().unwrap().len(), 2);
    assert!(export.note.is_none());
    assert_eq!(export.file_name(now), "mis-datos-2026-05-02.json");

    h.gateway.lists_offline.store(true, Ordering::SeqCst);
    let partial = h.session.export_account_data(now).await.unwrap();
    assert!(partial.tasks.is_none());
    assert!(partial.note.is_some());
}

#[tokio::test]
async fn test_delete_account_requires_password() {
    let h = harness();
    h.sign_in().await;
    assert!(matches!(
        h.session.delete_account("").await,
        Err(AppError::Validation(ValidationError::MissingPassword))
    ));
}

#[tokio::test]
async fn test_delete_account_wrong_password_keeps_everything() {
    let h = harness();
    h.seed_data().await;
    h.sign_in().await;

    let err = h.session.delete_account("incorrecta").await.unwrap_err();
    match &err {
        AppError::AccountDeletion { step, source } => {
            assert_eq!(*step, DeletionStep::Reauthenticate);
            assert!(matches!(**source, AppError::Auth(AuthError::WrongPassword)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.user_message(), "Contraseña incorrecta");
    assert_eq!(h.count(Collection::Tasks).await, 1);
    assert_eq!(h.count(Collection::Subjects).await, 2);
    assert!(h.session.state().session().is_some());
}

#[tokio::test]
async fn test_delete_account_removes_all_user_data() {
    let h = harness();
    h.seed_data().await;
    h.sign_in().await;
    h.session.save_settings(&Settings::default()).await.unwrap();

    h.session.delete_account(PASSWORD).await.unwrap();

    assert_eq!(h.count(Collection::Tasks).await, 0);
    assert_eq!(h.count(Collection::Subjects).await, 0);
    assert_eq!(h.gateway.get_profile("u1").await.unwrap(), None);
    assert_eq!(h.cache.get("user_u1").await.unwrap(), None);
    assert_eq!(h.cache.get("theme_u1").await.unwrap(), None);
    assert_eq!(h.cache.get(LAST_LOGGED_IN_KEY).await.unwrap(), None);
    assert_eq!(h.session.state(), SessionState::Anonymous);
    assert!(matches!(
        h.session.sign_in(EMAIL, PASSWORD).await,
        Err(AppError::Auth(AuthError::UserNotFound))
    ));
}

#[tokio::test]
async fn test_delete_account_stops_at_failed_step_without_rollback() {
    let h = harness();
    h.seed_data().await;
    h.sign_in().await;
    h.session.load_settings().await.unwrap();
    h.gateway.fail_profile_delete.store(true, Ordering::SeqCst);

    let err = h.session.delete_account(PASSWORD).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::AccountDeletion {
            step: DeletionStep::Profile,
            ..
        }
    ));
    assert_eq!(h.count(Collection::Tasks).await, 0);
    assert_eq!(h.count(Collection::Subjects).await, 0);
    assert!(h.gateway.get_profile("u1").await.unwrap().is_some());
    // 认证账号仍然存在
    assert!(h.auth.current_user().is_some());
}
