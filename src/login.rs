use crate::record::{Field, FieldSet};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// Role an authenticated actor acts under
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sees every record and may edit every user-editable field
    Admin,
    /// Sees only records assigned to their email, edits workflow fields
    #[serde(alias = "gerente")]
    Manager,
}

/// Result of a successful authentication
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Normalised (trimmed, lower-case) email address
    pub email: String,
    pub role: Role,
    /// Branch label shown to the actor, e.g. "Sucursal Masaya"
    pub branch: String,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("incorrect password")]
    BadSecret,

    #[error("stored password hash is malformed")]
    InvalidHash,

    #[error("session is missing or expired")]
    NoSession,

    #[error("user directory: {0}")]
    Directory(String),
}

/// Something that can turn an email and secret into an [`Identity`]
pub trait IdentityProvider {
    fn authenticate(&self, email: &str, secret: &str) -> Result<Identity, AuthError>;
}

/// Decides which fields a role may write
pub trait PermissionPolicy {
    fn permissions_for(&self, role: Role) -> FieldSet;
}

/// Default policy: managers edit workflow fields, the administrator edits
/// identity and workflow fields. Nobody writes the last-updated stamp.
#[derive(Clone, Copy, Debug, Default)]
pub struct RolePolicy;

impl PermissionPolicy for RolePolicy {
    fn permissions_for(&self, role: Role) -> FieldSet {
        let mut fields: FieldSet = Field::WORKFLOW.into_iter().collect();
        if role == Role::Admin {
            fields.extend(Field::IDENTITY);
        }
        fields
    }
}

/// Stored user entry
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    /// Argon2 hash of the user's password
    pub password_hash: String,

    /// Branch label
    pub branch: String,

    pub role: Role,
}

/// File-backed user directory keyed by email
///
/// The file is a JSON object mapping each normalised email address to a
/// [`User`]. A missing file yields an empty directory.
#[derive(Debug, Default)]
pub struct Directory {
    users: BTreeMap<String, User>,
    path: Option<PathBuf>,
}

/// Canonical form of an email address: trimmed and lower-cased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Directory {
    /// Load the directory from `path`
    ///
    /// # Arguments
    /// * `path` - Location of the users JSON file
    ///
    /// # Returns
    /// * `Result<Directory, AuthError>` - The directory, or an error if the file
    ///   exists but cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let users = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str::<BTreeMap<String, User>>(&contents)
                .map_err(|e| AuthError::Directory(format!("cannot parse {}: {}", path.display(), e)))?
                .into_iter()
                .map(|(email, user)| (normalize_email(&email), user))
                .collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("user directory {} not found, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(AuthError::Directory(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Ok(Directory {
            users,
            path: Some(path.to_path_buf()),
        })
    }

    /// Build an in-memory directory (not persisted)
    pub fn from_users(users: impl IntoIterator<Item = (String, User)>) -> Self {
        Directory {
            users: users
                .into_iter()
                .map(|(email, user)| (normalize_email(&email), user))
                .collect(),
            path: None,
        }
    }

    /// Write the directory back to the file it was loaded from
    pub fn save(&self) -> Result<(), AuthError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.users)
            .map_err(|e| AuthError::Directory(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AuthError::Directory(e.to_string()))?;
        }
        fs::write(path, json).map_err(|e| AuthError::Directory(e.to_string()))
    }

    /// Register a user
    ///
    /// # Arguments
    /// * `email` - Login address (normalised before storage)
    /// * `password` - Plain text password (will be hashed)
    /// * `branch` - Branch label
    /// * `role` - Role granted on login
    ///
    /// # Errors
    /// * Returns an error if the email is empty or already registered
    pub fn add_user(
        &mut self,
        email: &str,
        password: &str,
        branch: &str,
        role: Role,
    ) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::Directory(
                "email and password cannot be empty".to_string(),
            ));
        }
        if self.users.contains_key(&email) {
            return Err(AuthError::Directory(format!("{} is already registered", email)));
        }

        let user = User {
            password_hash: hash_password(password)?,
            branch: branch.to_string(),
            role,
        };
        self.users.insert(email.clone(), user);
        info!("registered {} as {:?}", email, role);
        Ok(())
    }

    pub fn user(&self, email: &str) -> Option<&User> {
        self.users.get(&normalize_email(email))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl IdentityProvider for Directory {
    fn authenticate(&self, email: &str, secret: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        let user = self
            .users
            .get(&email)
            .ok_or_else(|| AuthError::UnknownUser(email.clone()))?;

        if !verify_password(secret, &user.password_hash)? {
            return Err(AuthError::BadSecret);
        }

        Ok(Identity {
            email,
            role: user.role,
            branch: user.branch.clone(),
        })
    }
}

impl PermissionPolicy for Directory {
    fn permissions_for(&self, role: Role) -> FieldSet {
        RolePolicy.permissions_for(role)
    }
}

/// Hash a password using Argon2
///
/// # Errors
/// * Returns an error if the password hashing fails
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Directory(format!("password hashing failed: {}", e)))
}

/// Check a plaintext password against a stored Argon2 hash
///
/// # Returns
/// * `Result<bool, AuthError>` - True if the password matches, false if not, or
///   an error if the hash is not in PHC format
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidHash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// An authenticated actor's session
///
/// Created by [`SessionStore::create`] after a successful authentication and
/// passed explicitly to every operation that needs to know who is acting.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub identity: Identity,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Active sessions, keyed by session id
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Open a session for an authenticated identity
    pub fn create(&self, identity: Identity) -> Session {
        self.create_at(identity, Utc::now())
    }

    pub fn create_at(&self, identity: Identity, now: DateTime<Utc>) -> Session {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            identity,
            expires_at: now + self.ttl,
        };
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id.clone(), session.clone());
        session
    }

    /// Look up a live session; expired sessions are dropped on sight
    pub fn validate(&self, session_id: &str) -> Option<Session> {
        self.validate_at(session_id, Utc::now())
    }

    pub fn validate_at(&self, session_id: &str, now: DateTime<Utc>) -> Option<Session> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(session_id) {
            Some(session) if !session.is_expired_at(now) => Some(session.clone()),
            Some(_) => {
                sessions.remove(session_id);
                None
            }
            None => None,
        }
    }

    /// Tear a session down (logout); returns whether it existed
    pub fn end(&self, session_id: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some()
    }

    /// Drop every session expired at `now`, returning how many were removed
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Authenticate and open a session in one step
///
/// Sessions abandoned without a logout are swept here, so the store only
/// holds live sessions plus those expired since the last login.
pub fn login<P: IdentityProvider + ?Sized>(
    provider: &P,
    sessions: &SessionStore,
    email: &str,
    secret: &str,
) -> Result<Session, AuthError> {
    login_at(provider, sessions, email, secret, Utc::now())
}

pub fn login_at<P: IdentityProvider + ?Sized>(
    provider: &P,
    sessions: &SessionStore,
    email: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<Session, AuthError> {
    let identity = provider.authenticate(email, secret)?;
    let purged = sessions.purge_expired(now);
    if purged > 0 {
        debug!("dropped {} expired session(s)", purged);
    }
    info!("{} logged in as {:?}", identity.email, identity.role);
    Ok(sessions.create_at(identity, now))
}
