use chrono::{Duration, Utc};
use credit_desk::login::{
    AuthError, Directory, Identity, IdentityProvider, PermissionPolicy, Role, RolePolicy,
    SessionStore, User, hash_password, login, login_at, verify_password,
};
use credit_desk::record::Field;
use tempfile::TempDir;

fn directory() -> Directory {
    let mut directory = Directory::default();
    directory
        .add_user("AlfaCredit@Example.com", "1234", "ADMINISTRADOR", Role::Admin)
        .unwrap();
    directory
        .add_user("gerentemasaya@example.com", "masaya", "Sucursal Masaya", Role::Manager)
        .unwrap();
    directory
}

#[test]
fn authenticate_normalises_the_email() {
    let directory = directory();

    let identity = directory
        .authenticate("  GerenteMasaya@Example.com ", "masaya")
        .unwrap();
    assert_eq!(
        identity,
        Identity {
            email: "gerentemasaya@example.com".to_string(),
            role: Role::Manager,
            branch: "Sucursal Masaya".to_string(),
        }
    );
    assert!(directory.authenticate("alfacredit@example.com", "1234").unwrap().is_admin());
}

#[test]
fn wrong_secret_and_unknown_user_are_distinguished_internally() {
    let directory = directory();
    assert_eq!(
        directory.authenticate("gerentemasaya@example.com", "1234"),
        Err(AuthError::BadSecret)
    );
    assert_eq!(
        directory.authenticate("nadie@example.com", "1234"),
        Err(AuthError::UnknownUser("nadie@example.com".to_string()))
    );
}

#[test]
fn duplicate_and_empty_registrations_are_refused() {
    let mut directory = directory();
    assert!(matches!(
        directory.add_user("ALFACREDIT@example.com", "x", "ADMINISTRADOR", Role::Admin),
        Err(AuthError::Directory(_))
    ));
    assert!(matches!(
        directory.add_user(" ", "x", "Sucursal Rivas", Role::Manager),
        Err(AuthError::Directory(_))
    ));
    assert_eq!(directory.len(), 2);
}

#[test]
fn directory_survives_a_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users").join("users.json");

    let mut directory = Directory::load(&path).unwrap();
    assert!(directory.is_empty());
    directory
        .add_user("gerenterivas@example.com", "rivas", "Sucursal Rivas", Role::Manager)
        .unwrap();
    directory.save().unwrap();

    let reloaded = Directory::load(&path).unwrap();
    assert_eq!(reloaded.user("GERENTERIVAS@example.com").map(|u| u.role), Some(Role::Manager));
    assert!(reloaded.authenticate("gerenterivas@example.com", "rivas").is_ok());
}

#[test]
fn legacy_role_names_and_bad_hashes() {
    let json = r#"{ "GerenteLeon@example.com": { "password_hash": "plain", "branch": "Sucursal León", "role": "gerente" } }"#;
    let users: std::collections::BTreeMap<String, User> = serde_json::from_str(json).unwrap();
    let directory = Directory::from_users(users);

    assert_eq!(directory.user("gerenteleon@example.com").map(|u| u.role), Some(Role::Manager));
    assert_eq!(
        directory.authenticate("gerenteleon@example.com", "plain"),
        Err(AuthError::InvalidHash)
    );
}

#[test]
fn hashes_verify_only_the_original_password() {
    let hash = hash_password("1234").unwrap();
    assert_ne!(hash, "1234");
    assert_eq!(verify_password("1234", &hash), Ok(true));
    assert_eq!(verify_password("4321", &hash), Ok(false));
}

#[test]
fn managers_get_workflow_fields_and_admin_gets_everything_editable() {
    let manager = RolePolicy.permissions_for(Role::Manager);
    assert_eq!(manager.len(), 4);
    assert!(Field::WORKFLOW.iter().all(|f| manager.contains(f)));
    assert!(!Field::IDENTITY.iter().any(|f| manager.contains(f)));

    let admin = RolePolicy.permissions_for(Role::Admin);
    assert_eq!(admin.len(), 14);
    assert!(!admin.contains(&Field::LastUpdated));
    assert!(!manager.contains(&Field::LastUpdated));
}

#[test]
fn sessions_expire_and_end_on_logout() {
    let sessions = SessionStore::new(Duration::hours(24));
    let identity = Identity {
        email: "gerentemasaya@example.com".to_string(),
        role: Role::Manager,
        branch: "Sucursal Masaya".to_string(),
    };
    let now = Utc::now();

    let session = sessions.create_at(identity.clone(), now);
    assert_eq!(sessions.validate_at(&session.id, now + Duration::hours(23)), Some(session.clone()));
    assert_eq!(sessions.validate_at(&session.id, now + Duration::hours(25)), None);
    assert!(sessions.is_empty(), "expired sessions are dropped when seen");

    let session = sessions.create(identity.clone());
    assert!(sessions.validate(&session.id).is_some());
    assert!(sessions.end(&session.id));
    assert!(!sessions.end(&session.id));
    assert!(sessions.validate(&session.id).is_none());

    sessions.create_at(identity.clone(), now - Duration::hours(48));
    sessions.create_at(identity, now);
    assert_eq!(sessions.purge_expired(now), 1);
    assert_eq!(sessions.len(), 1);
}

#[test]
fn login_opens_a_session_only_for_valid_credentials() {
    let directory = directory();
    let sessions = SessionStore::new(Duration::hours(1));

    let session = login(&directory, &sessions, "gerentemasaya@example.com", "masaya").unwrap();
    assert_eq!(sessions.validate(&session.id).map(|s| s.identity.role), Some(Role::Manager));

    assert!(login(&directory, &sessions, "gerentemasaya@example.com", "wrong").is_err());
    assert_eq!(sessions.len(), 1);
}

#[test]
fn logging_in_sweeps_sessions_abandoned_without_logout() {
    let directory = directory();
    let sessions = SessionStore::new(Duration::hours(1));
    let now = Utc::now();
    let identity = directory.authenticate("gerentemasaya@example.com", "masaya").unwrap();

    let abandoned = sessions.create_at(identity.clone(), now - Duration::hours(3));
    let live = sessions.create_at(identity, now);

    let session = login_at(&directory, &sessions, "alfacredit@example.com", "1234", now).unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.validate_at(&live.id, now).is_some());
    assert!(sessions.validate_at(&session.id, now).is_some());
    assert!(sessions.validate_at(&abandoned.id, now).is_none());
    assert_eq!(session.expires_at, now + Duration::hours(1));
}

#[test]
fn sessions_carry_their_expiry_for_the_cookie_response() {
    let sessions = SessionStore::new(Duration::hours(24));
    let identity = Identity {
        email: "alfacredit@example.com".to_string(),
        role: Role::Admin,
        branch: "ADMINISTRADOR".to_string(),
    };
    let now = Utc::now();
    let session = sessions.create_at(identity, now);

    let stamp = session.expires_at.to_rfc3339();
    assert_eq!(chrono::DateTime::parse_from_rfc3339(&stamp).unwrap(), now + Duration::hours(24));
    assert_eq!(session.id.len(), 36);
}
