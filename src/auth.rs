use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, Json, TypedHeader};
use chrono::{DateTime, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::err::{Error, FieldError};
use crate::models::{AccountState, FacultyAccount, Profile, Role};
use crate::store::Store;
use crate::token::{TokenError, TokenSigner};
use crate::{proceeds, AppState, Payload};

pub const MIN_PASSWORD_LEN: usize = 6;

pub type BearerHeader = Option<TypedHeader<Authorization<Bearer>>>;

pub fn bearer(header: &BearerHeader) -> Result<&str, Error> {
    match header {
        Some(TypedHeader(auth)) if !auth.token().is_empty() => Ok(auth.token()),
        _ => Err(Error::Unauthorized {
            message: "Access token required".to_string(),
        }),
    }
}

pub fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Pbkdf2.hash_password(password.as_bytes(), &salt)?.to_string())
}

fn password_matches(stored: &str, password: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(hash) => Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok(),
        Err(err) => {
            log::error!("stored password hash is unreadable: {}", err);
            false
        }
    }
}

fn required(field: &str, value: &Option<String>, errors: &mut Vec<FieldError>) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => {
            errors.push(FieldError::new(field, format!("`{}` is required", field)));
            String::new()
        }
    }
}

fn check_new_password(field: &str, password: &str, errors: &mut Vec<FieldError>) {
    if !password.is_empty() && password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            field,
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
}

/// Fields an admin supplies when provisioning a faculty account.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAccount {
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub department: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedIn {
    pub token: String,
    pub user: Profile,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthService {
    store: Arc<dyn Store>,
    tokens: TokenSigner,
    department: String,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, tokens: TokenSigner, department: String) -> Self {
        Self {
            store,
            tokens,
            department,
        }
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoggedIn, Error> {
        let identifier = identifier.trim();
        let mut errors = Vec::new();
        if identifier.is_empty() {
            errors.push(FieldError::new("identifier", "Email/Username is required"));
        }
        if password.is_empty() {
            errors.push(FieldError::new("password", "Password is required"));
        }
        if !errors.is_empty() {
            return Err(Error::invalid_input(errors));
        }

        let account = self
            .store
            .find_active_login(&identifier.to_lowercase(), identifier)
            .await?;
        let account = match account {
            Some(account) if password_matches(&account.password_hash, password) => account,
            _ => {
                log::warn!("rejected login for `{}`", identifier);
                return Err(Error::invalid_credentials());
            }
        };

        let now = Utc::now();
        self.store.record_login(account.id, now).await?;

        let user = account.profile();
        let token = self.tokens.issue_at(user.clone(), now).map_err(|err| {
            log::error!("could not encode token claims: {}", err);
            Error::Store {
                message: "Server error".to_string(),
            }
        })?;
        log::info!("{} ({}) logged in", account.username, account.role.as_str());
        Ok(LoggedIn {
            token,
            user,
            expires_at: now + self.tokens.ttl(),
        })
    }

    /// Checks the token and that its account still exists and is active.
    pub async fn verify(&self, token: &str) -> Result<FacultyAccount, Error> {
        let claims = self.tokens.verify(token).map_err(|err| {
            match err {
                TokenError::Expired => log::debug!("{}", err),
                other => log::warn!("token rejected: {}", other),
            }
            Error::invalid_token()
        })?;
        match self.store.faculty_by_id(claims.user.id).await? {
            Some(account) if account.state.is_active() => Ok(account),
            _ => Err(Error::invalid_token()),
        }
    }

    async fn verify_admin(&self, token: &str) -> Result<FacultyAccount, Error> {
        let account = self.verify(token).await?;
        if account.role != Role::Admin {
            log::warn!("{} attempted an admin operation", account.username);
            return Err(Error::access_denied());
        }
        Ok(account)
    }

    pub async fn change_password(
        &self,
        token: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), Error> {
        let account = self.verify(token).await?;

        let mut errors = Vec::new();
        if old_password.is_empty() {
            errors.push(FieldError::new("oldPassword", "Old password is required"));
        }
        if new_password.is_empty() {
            errors.push(FieldError::new("newPassword", "New password is required"));
        }
        check_new_password("newPassword", new_password, &mut errors);
        if !errors.is_empty() {
            return Err(Error::invalid_input(errors));
        }

        if !password_matches(&account.password_hash, old_password) {
            return Err(Error::Unauthorized {
                message: "Old password is incorrect".to_string(),
            });
        }
        let hash = hash_password(new_password)?;
        self.store.set_password_hash(account.id, &hash).await?;
        log::info!("{} changed their password", account.username);
        Ok(())
    }

    pub async fn provision(&self, token: &str, fields: NewAccount) -> Result<Profile, Error> {
        let admin = self.verify_admin(token).await?;

        let mut errors = Vec::new();
        let name = required("name", &fields.name, &mut errors);
        let email = required("email", &fields.email, &mut errors).to_lowercase();
        let username = required("username", &fields.username, &mut errors);
        let password = fields.password.unwrap_or_default();
        if password.is_empty() {
            errors.push(FieldError::new("password", "`password` is required"));
        }
        check_new_password("password", &password, &mut errors);
        if !errors.is_empty() {
            return Err(Error::invalid_input(errors));
        }

        if self.store.faculty_exists(&email, &username).await? {
            return Err(Error::Conflict {
                message: "Email or username already exists".to_string(),
            });
        }

        let department = fields
            .department
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| self.department.clone());
        let account = FacultyAccount {
            id: Uuid::new_v4(),
            name,
            email,
            username,
            password_hash: hash_password(&password)?,
            department,
            role: fields.role.unwrap_or_default(),
            state: AccountState::Active,
            last_login: None,
            created_at: Utc::now(),
        };
        self.store.insert_faculty(&account).await?;
        log::info!(
            "{} provisioned {} account `{}`",
            admin.username,
            account.role.as_str(),
            account.username
        );
        Ok(account.profile())
    }

    pub async fn deactivate(&self, token: &str, username: &str) -> Result<(), Error> {
        let admin = self.verify_admin(token).await?;

        let username = username.trim();
        if username.is_empty() {
            return Err(Error::invalid_field("username", "Username is required"));
        }
        if username == admin.username {
            return Err(Error::invalid_field(
                "username",
                "You cannot remove yourself",
            ));
        }
        let target = self
            .store
            .faculty_by_username(username)
            .await?
            .ok_or_else(|| Error::NotFound {
                message: "User not found".to_string(),
            })?;
        self.store.deactivate_faculty(target.id, Utc::now()).await?;
        log::info!("{} deactivated `{}`", admin.username, target.username);
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email")]
    identifier: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePassword {
    old_password: Option<String>,
    new_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveUser {
    username: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    user: Profile,
}

#[derive(Debug, Clone, Serialize)]
pub struct Done {
    message: &'static str,
}

pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Payload<LoggedIn> {
    let Json(body) = body?;
    let logged_in = state
        .auth
        .login(
            body.identifier.as_deref().unwrap_or_default(),
            body.password.as_deref().unwrap_or_default(),
        )
        .await?;
    proceeds(logged_in)
}

pub async fn verify(
    Extension(state): Extension<Arc<AppState>>,
    header: BearerHeader,
) -> Payload<UserResponse> {
    let account = state.auth.verify(bearer(&header)?).await?;
    proceeds(UserResponse {
        user: account.profile(),
    })
}

pub async fn change_password(
    Extension(state): Extension<Arc<AppState>>,
    header: BearerHeader,
    body: Result<Json<ChangePassword>, JsonRejection>,
) -> Payload<Done> {
    let token = bearer(&header)?;
    let Json(body) = body?;
    state
        .auth
        .change_password(
            token,
            body.old_password.as_deref().unwrap_or_default(),
            body.new_password.as_deref().unwrap_or_default(),
        )
        .await?;
    proceeds(Done {
        message: "Password changed successfully",
    })
}

pub async fn signup(
    Extension(state): Extension<Arc<AppState>>,
    header: BearerHeader,
    body: Result<Json<NewAccount>, JsonRejection>,
) -> Payload<UserResponse> {
    let token = bearer(&header)?;
    let Json(body) = body?;
    let user = state.auth.provision(token, body).await?;
    proceeds(UserResponse { user })
}

pub async fn remove_user(
    Extension(state): Extension<Arc<AppState>>,
    header: BearerHeader,
    body: Result<Json<RemoveUser>, JsonRejection>,
) -> Payload<Done> {
    let token = bearer(&header)?;
    let Json(body) = body?;
    state
        .auth
        .deactivate(token, body.username.as_deref().unwrap_or_default())
        .await?;
    proceeds(Done {
        message: "User removed successfully",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    async fn service() -> (AuthService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenSigner::new(b"test-secret", Duration::hours(24)).unwrap();
        let auth = AuthService::new(store.clone(), tokens, "AIML".to_string());
        for (username, role) in [("admin", Role::Admin), ("rao", Role::Faculty)] {
            let account = FacultyAccount {
                id: Uuid::new_v4(),
                name: username.to_string(),
                email: format!("{}@dept.edu", username),
                username: username.to_string(),
                password_hash: hash_password("password123").unwrap(),
                department: "AIML".to_string(),
                role,
                state: AccountState::Active,
                last_login: None,
                created_at: Utc::now(),
            };
            store.insert_faculty(&account).await.unwrap();
        }
        (auth, store)
    }

    #[tokio::test]
    async fn login_accepts_username_or_case_insensitive_email() {
        let (auth, store) = service().await;
        let by_name = auth.login("rao", "password123").await.unwrap();
        assert_eq!(by_name.user.email, "rao@dept.edu");
        let by_email = auth.login("RAO@Dept.edu", "password123").await.unwrap();
        assert_eq!(by_email.user.id, by_name.user.id);

        let account = store.faculty_by_id(by_name.user.id).await.unwrap().unwrap();
        assert!(account.last_login.is_some());
    }

    #[tokio::test]
    async fn inactive_account_fails_login_like_a_wrong_password() {
        let (auth, _) = service().await;
        let admin = auth.login("admin", "password123").await.unwrap();
        auth.deactivate(&admin.token, "rao").await.unwrap();

        let wrong = auth.login("admin", "nope-nope").await.unwrap_err();
        let inactive = auth.login("rao", "password123").await.unwrap_err();
        let unknown = auth.login("ghost", "password123").await.unwrap_err();
        assert_eq!(wrong, inactive);
        assert_eq!(wrong, unknown);
        assert_eq!(wrong, Error::invalid_credentials());
    }

    #[tokio::test]
    async fn deactivation_revokes_unexpired_tokens() {
        let (auth, _) = service().await;
        let admin = auth.login("admin", "password123").await.unwrap();
        let rao = auth.login("rao", "password123").await.unwrap();
        assert!(auth.verify(&rao.token).await.is_ok());

        auth.deactivate(&admin.token, "rao").await.unwrap();
        assert_eq!(
            auth.verify(&rao.token).await.unwrap_err(),
            Error::invalid_token()
        );
        assert_eq!(
            auth.verify("garbage").await.unwrap_err(),
            Error::invalid_token()
        );
    }

    #[tokio::test]
    async fn change_password_enforces_old_password_and_length() {
        let (auth, _) = service().await;
        let rao = auth.login("rao", "password123").await.unwrap();

        let short = auth
            .change_password(&rao.token, "password123", "abc")
            .await
            .unwrap_err();
        assert!(matches!(short, Error::Validation { .. }));

        let wrong_old = auth
            .change_password(&rao.token, "password124", "brand-new")
            .await
            .unwrap_err();
        assert!(matches!(wrong_old, Error::Unauthorized { .. }));

        auth.change_password(&rao.token, "password123", "brand-new")
            .await
            .unwrap();
        assert!(auth.login("rao", "password123").await.is_err());
        assert!(auth.login("rao", "brand-new").await.is_ok());
    }

    #[tokio::test]
    async fn provisioning_is_admin_only_and_rejects_taken_identities() {
        let (auth, _) = service().await;
        let admin = auth.login("admin", "password123").await.unwrap();
        let rao = auth.login("rao", "password123").await.unwrap();

        let fields = NewAccount {
            name: Some("Mrs. Ramya".to_string()),
            email: Some("Ramya@Dept.edu".to_string()),
            username: Some("ramya".to_string()),
            password: Some("welcome1".to_string()),
            ..NewAccount::default()
        };
        assert_eq!(
            auth.provision(&rao.token, fields.clone()).await.unwrap_err(),
            Error::access_denied()
        );

        let created = auth.provision(&admin.token, fields.clone()).await.unwrap();
        assert_eq!(created.role, Role::Faculty);
        assert_eq!(created.email, "ramya@dept.edu");
        assert_eq!(created.department, "AIML");
        assert!(auth.login("ramya", "welcome1").await.is_ok());

        let again = auth.provision(&admin.token, fields).await.unwrap_err();
        assert!(matches!(again, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn deactivated_identities_stay_reserved() {
        let (auth, _) = service().await;
        let admin = auth.login("admin", "password123").await.unwrap();
        auth.deactivate(&admin.token, "rao").await.unwrap();

        let reuse = NewAccount {
            name: Some("Someone Else".to_string()),
            email: Some("other@dept.edu".to_string()),
            username: Some("rao".to_string()),
            password: Some("welcome1".to_string()),
            ..NewAccount::default()
        };
        let err = auth.provision(&admin.token, reuse).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn deactivate_guards_self_and_missing_targets() {
        let (auth, _) = service().await;
        let admin = auth.login("admin", "password123").await.unwrap();
        assert!(matches!(
            auth.deactivate(&admin.token, "admin").await.unwrap_err(),
            Error::Validation { .. }
        ));
        assert!(matches!(
            auth.deactivate(&admin.token, "ghost").await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }
}
