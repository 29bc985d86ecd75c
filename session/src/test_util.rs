//! Helpers shared by the unit tests.

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::SessionConfig;
use crate::peer::StaticPeer;
use crate::session::UserSession;

/// A session against a dead address, with its resource file in a scratch
/// directory. Loops are not started.
pub(crate) fn test_session() -> UserSession {
    let dir = std::env::temp_dir().join(format!("session-test-{}", Uuid::new_v4().simple()));
    let config = SessionConfig {
        resource_dir: Some(PathBuf::from(dir)),
        ..SessionConfig::default()
    };
    UserSession::new(
        7,
        "alice",
        Arc::new(StaticPeer::new("127.0.0.1:1".parse().expect("valid addr"))),
        config,
    )
    .expect("test session")
}

pub(crate) fn token_bundle() -> String {
    r#"{"code":200,"data":{"appPackage":"com.example.app","miChid":9.0,"miUserId":"4711","miUserSecurityKey":"sec-key","token":"tok-1"}}"#.to_string()
}
