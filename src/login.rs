#![cfg(not(tarpaulin_include))]

#[cfg(feature = "web")]
use crate::app::AppState;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
#[cfg(feature = "web")]
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
#[cfg(feature = "web")]
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::info;
#[cfg(feature = "web")]
use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, create_dir_all};
use std::io::Write;
use std::path::PathBuf;
#[cfg(feature = "web")]
use std::sync::Arc;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use uuid::Uuid;

lazy_static! {
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]{3,32}$").unwrap();
}

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "session";
const USERS_FILE: &str = "users.json";
const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds
const PASSWORD_MIN_LENGTH: usize = 8;

/// User data structure representing a registered application user
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    /// Username (unique identifier for the user)
    pub username: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,

    pub created_at: DateTime<Utc>,
}

/// Login form data
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCredentials {
    pub username: String,

    /// Password in plaintext (only transmitted, never stored)
    pub password: String,
}

/// Signup form data
#[derive(Debug, Serialize, Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username must be 3-32 letters, digits, '_' or '-'")]
    InvalidUsername,

    #[error("username already exists")]
    UsernameTaken,

    #[error("{0}")]
    WeakPassword(&'static str),

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("password hashing failed")]
    Hash,

    #[error("failed to access users file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse users data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Whether `name` is usable as a username and as a directory name
pub fn is_valid_username(name: &str) -> bool {
    USERNAME_REGEX.is_match(name)
}

/// Checks the password strength rules used at signup
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        return Err(AuthError::WeakPassword(
            "Password must be at least 8 characters long",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one number",
        ));
    }
    Ok(())
}

/// Hash a password using Argon2
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err(AuthError::Hash),
    }
}

/// Verify a password against a stored hash
fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::Hash)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false), // Password didn't match
    }
}

/// Registered users, kept as a JSON map in the data directory
#[derive(Debug)]
pub struct UserStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl UserStore {
    /// Creates the data directory and an empty users file if missing
    pub fn init(data_dir: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let data_dir = data_dir.into();
        create_dir_all(&data_dir)?;

        let path = data_dir.join(USERS_FILE);
        if !path.exists() {
            let mut file = File::create(&path)?;
            file.write_all(b"{}")?;
        }

        Ok(UserStore {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Get all registered users
    pub fn get_users(&self) -> Result<HashMap<String, User>, AuthError> {
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save_users(&self, users: &HashMap<String, User>) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(users)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Register a new user after checking the name and password rules
    pub fn register_user(&self, form: &SignupForm) -> Result<(), AuthError> {
        if !is_valid_username(&form.username) {
            return Err(AuthError::InvalidUsername);
        }
        validate_password(&form.password)?;
        if form.password != form.confirm_password {
            return Err(AuthError::PasswordMismatch);
        }

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut users = self.get_users()?;
        if users.contains_key(&form.username) {
            return Err(AuthError::UsernameTaken);
        }

        let user = User {
            username: form.username.clone(),
            password_hash: hash_password(&form.password)?,
            created_at: Utc::now(),
        };
        users.insert(form.username.clone(), user);
        self.save_users(&users)?;
        info!("registered user {}", form.username);
        Ok(())
    }

    /// Checks a username/password pair
    pub fn verify_user(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let users = self.get_users()?;

        if let Some(user) = users.get(username) {
            verify_password(password, &user.password_hash)
        } else {
            Ok(false)
        }
    }
}

/// An authenticated user session
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub expires_at: SystemTime,
}

/// Active sessions, owned by the application state
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    duration: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(SESSION_DURATION))
    }
}

impl SessionStore {
    pub fn new(duration: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            duration,
        }
    }

    /// Create a new user session and return its id
    pub fn create_session(&self, username: &str) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            username: username.to_string(),
            expires_at: SystemTime::now() + self.duration,
        };

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session_id.clone(), session);
        session_id
    }

    /// The username for a live session
    pub fn validate_session(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .filter(|s| s.expires_at > SystemTime::now())
            .map(|s| s.username.clone())
    }

    pub fn remove_session(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id);
    }

    /// Drops expired sessions, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Web handler functions below (only compiled with "web" feature)

/// The user a request was authenticated as, set by [`require_auth`]
#[cfg(feature = "web")]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

#[cfg(feature = "web")]
#[derive(Serialize)]
struct AuthResponse {
    status: &'static str,
    message: String,
}

#[cfg(feature = "web")]
fn auth_response(status: StatusCode, ok: bool, message: impl Into<String>) -> Response {
    let body = AuthResponse {
        status: if ok { "ok" } else { "error" },
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

#[cfg(feature = "web")]
fn auth_error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidUsername
        | AuthError::WeakPassword(_)
        | AuthError::PasswordMismatch => StatusCode::BAD_REQUEST,
        AuthError::UsernameTaken => StatusCode::CONFLICT,
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::Hash | AuthError::Io(_) | AuthError::Parse(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Handle user registration
#[cfg(feature = "web")]
pub async fn handle_signup(
    State(state): State<Arc<AppState>>,
    Json(form): Json<SignupForm>,
) -> Response {
    match state.users.register_user(&form) {
        Ok(()) => auth_response(StatusCode::CREATED, true, "Account created"),
        Err(e) => {
            warn!("signup for {} rejected: {}", form.username, e);
            auth_response(auth_error_status(&e), false, e.to_string())
        }
    }
}

/// Session cookie that expires with the server-side session
#[cfg(feature = "web")]
fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(SESSION_DURATION as i64))
        .build()
}

/// Handle user login: validate credentials and set the session cookie
#[cfg(feature = "web")]
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(credentials): Json<UserCredentials>,
) -> Response {
    match state
        .users
        .verify_user(&credentials.username, &credentials.password)
    {
        Ok(true) => {
            let session_id = state.sessions.create_session(&credentials.username);
            let cookie = session_cookie(session_id);
            info!("user {} logged in", credentials.username);
            (jar.add(cookie), auth_response(StatusCode::OK, true, "Logged in")).into_response()
        }
        Ok(false) => {
            let e = AuthError::InvalidCredentials;
            auth_response(auth_error_status(&e), false, e.to_string())
        }
        Err(e) => {
            warn!("login failed: {}", e);
            auth_response(StatusCode::INTERNAL_SERVER_ERROR, false, "Authentication error")
        }
    }
}

/// Handle user logout: forget the session and clear the cookie
#[cfg(feature = "web")]
pub async fn handle_logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove_session(cookie.value());
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, auth_response(StatusCode::OK, true, "Logged out")).into_response()
}

/// Authentication middleware
///
/// Lets the request through with a [`CurrentUser`] extension when the
/// session cookie is valid, otherwise answers 401.
#[cfg(feature = "web")]
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if let Some(session_cookie) = jar.get(SESSION_COOKIE) {
        if let Some(username) = state.sessions.validate_session(session_cookie.value()) {
            request.extensions_mut().insert(CurrentUser(username));
            return next.run(request).await;
        }
    }

    auth_response(StatusCode::UNAUTHORIZED, false, "Unauthorized")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(username: &str, password: &str) -> SignupForm {
        SignupForm {
            username: username.to_string(),
            password: password.to_string(),
            confirm_password: password.to_string(),
        }
    }

    #[test]
    fn test_password_rules() {
        assert!(matches!(validate_password("Ab1"), Err(AuthError::WeakPassword(_))));
        assert!(matches!(validate_password("abcdefg1"), Err(AuthError::WeakPassword(_))));
        assert!(matches!(validate_password("ABCDEFG1"), Err(AuthError::WeakPassword(_))));
        assert!(matches!(validate_password("Abcdefgh"), Err(AuthError::WeakPassword(_))));
        assert!(validate_password("Abcdefg1").is_ok());
    }

    #[test]
    fn test_username_rules() {
        assert!(is_valid_username("alice_01"));
        assert!(!is_valid_username("al"));
        assert!(!is_valid_username("../x"));
        assert!(!is_valid_username("a b c"));
    }

    #[test]
    fn test_register_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let users = UserStore::init(dir.path()).unwrap();
        users.register_user(&signup("alice", "Secret123")).unwrap();

        assert!(users.verify_user("alice", "Secret123").unwrap());
        assert!(!users.verify_user("alice", "wrong").unwrap());
        assert!(!users.verify_user("nobody", "Secret123").unwrap());
        assert!(matches!(
            users.register_user(&signup("alice", "Secret123")),
            Err(AuthError::UsernameTaken)
        ));
    }

    #[test]
    fn test_mismatched_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let users = UserStore::init(dir.path()).unwrap();
        let mut form = signup("alice", "Secret123");
        form.confirm_password = "Secret124".to_string();
        assert!(matches!(users.register_user(&form), Err(AuthError::PasswordMismatch)));
    }

    #[test]
    fn test_sessions_expire() {
        let sessions = SessionStore::new(Duration::from_secs(0));
        let id = sessions.create_session("alice");
        assert_eq!(sessions.validate_session(&id), None);
        assert_eq!(sessions.purge_expired(), 1);

        let sessions = SessionStore::default();
        let id = sessions.create_session("alice");
        assert_eq!(sessions.validate_session(&id).as_deref(), Some("alice"));
        sessions.remove_session(&id);
        assert!(sessions.is_empty());
    }

    #[cfg(feature = "web")]
    #[test]
    fn test_session_cookie_expires_with_session() {
        let cookie = session_cookie("abc".to_string());
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(24)));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }
}
