use super::*;
use clap::CommandFactory;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn login_takes_email_and_password() {
    let cli = Cli::try_parse_from([
        "chat-session",
        "--backend-url",
        "http://localhost:5000",
        "login",
        "--email",
        "ada@example.test",
        "--password",
        "pw",
    ])
    .expect("parse");
    assert_eq!(cli.backend_url.as_deref(), Some("http://localhost:5000"));
    assert_eq!(
        cli.command,
        Command::Login {
            email: "ada@example.test".to_owned(),
            password: "pw".to_owned(),
        }
    );
}

#[test]
fn register_requires_full_name() {
    let err = Cli::try_parse_from([
        "chat-session",
        "register",
        "--email",
        "a@b.test",
        "--password",
        "pw",
    ]);
    assert!(err.is_err());
}

#[test]
fn update_profile_flags_are_optional() {
    let cli = Cli::try_parse_from(["chat-session", "update-profile", "--bio", "hello"])
        .expect("parse");
    assert_eq!(
        cli.command,
        Command::UpdateProfile {
            full_name: None,
            bio: Some("hello".to_owned()),
            profile_pic: None,
        }
    );
}

#[test]
fn register_body_uses_backend_field_names() {
    let body = register_body("Ada", "a@b.test", "pw", Some("math"));
    assert_eq!(
        body,
        json!({"fullName": "Ada", "email": "a@b.test", "password": "pw", "bio": "math"})
    );
    let body = register_body("Ada", "a@b.test", "pw", None);
    assert!(body.get("bio").is_none());
}

#[test]
fn profile_body_only_carries_passed_fields() {
    assert_eq!(profile_body(None, None, None), None);
    assert_eq!(
        profile_body(Some("Ada L".to_owned()), None, Some("pic.png".to_owned())),
        Some(json!({"fullName": "Ada L", "profilePic": "pic.png"}))
    );
}

#[test]
fn drained_errors_are_reported_as_failure() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    tx.send(Notification::success("Profile updated successfully"))
        .expect("send");
    assert_eq!(drain_notifications(&mut rx), None);

    tx.send(Notification::error("Invalid credentials")).expect("send");
    assert_eq!(
        drain_notifications(&mut rx).as_deref(),
        Some("Invalid credentials")
    );
}

#[test]
fn flags_override_config_lookup() {
    let cli = Cli::try_parse_from([
        "chat-session",
        "--backend-url",
        "https://chat.example.test/",
        "--storage-path",
        "/tmp/chat-session-test.json",
        "check",
    ])
    .expect("parse");
    let config = build_config(&cli).expect("config");
    assert_eq!(config.backend_url, "https://chat.example.test");
    assert_eq!(config.storage_path, PathBuf::from("/tmp/chat-session-test.json"));
}
