//! Shared fixtures for the async, store-backed tests.

use async_trait::async_trait;
use sea_orm::{Database, DatabaseConnection};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::auth::RoleGrants;
use crate::config::Config;
use crate::error::{BotError, Result};
use crate::mailer::Mailer;

static DIR_COUNTER: AtomicU32 = AtomicU32::new(0);

pub struct TempDir {
    pub path: PathBuf,
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

pub fn temp_dir(prefix: &str) -> TempDir {
    let path = std::env::temp_dir().join(format!(
        "securibot-{}-{}-{}",
        prefix,
        std::process::id(),
        DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::create_dir_all(&path).unwrap();
    TempDir { path }
}

pub async fn memory_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    crate::db::init_schema(&db).await.unwrap();
    db
}

pub fn test_config(roster_dir: PathBuf) -> Config {
    Config {
        discord_token: "test-token".into(),
        database_url: "sqlite::memory:".into(),
        jwt_secret: "test-signing-secret".into(),
        roster_dir,
        student_email_domain: "etu.example.fr".into(),
        staff_email_domain: "example.fr".into(),
        mail_relay_url: "http://localhost:0/send".into(),
        mail_relay_key: "test-key".into(),
        m1_role: 101,
        m2_role: 102,
        staff_role: 200,
    }
}

/// Mailer that records every send and can be told to fail.
#[derive(Default)]
pub struct MockMailer {
    pub sent: Mutex<Vec<(String, String, String)>>,
    pub fail: AtomicBool,
}

impl MockMailer {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// The token travels in the body; tests fish it back out of the
    /// recorded mail instead of re-deriving it.
    pub fn last_token(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let (_, body, _) = sent.last().expect("no mail recorded");
        body.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .find(|l| l.split('.').count() == 3 && !l.contains(' '))
            .expect("no token line in mail body")
            .to_string()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BotError::ExternalService("mock relay down".into()));
        }
        self.sent.lock().unwrap().push((
            subject.to_string(),
            body.to_string(),
            recipient.to_string(),
        ));
        Ok(())
    }
}

/// Role-grant recorder.
#[derive(Default)]
pub struct MockGrants {
    pub granted_roles: Mutex<Vec<(u64, u64)>>,
    pub revoked_roles: Mutex<Vec<(u64, u64)>>,
    pub granted_channels: Mutex<Vec<(u64, u64)>>,
    pub revoked_channels: Mutex<Vec<(u64, u64)>>,
}

#[async_trait]
impl RoleGrants for MockGrants {
    async fn grant_role(&self, user_id: u64, role_id: u64) -> Result<()> {
        self.granted_roles.lock().unwrap().push((user_id, role_id));
        Ok(())
    }

    async fn revoke_role(&self, user_id: u64, role_id: u64) -> Result<()> {
        self.revoked_roles.lock().unwrap().push((user_id, role_id));
        Ok(())
    }

    async fn grant_channel(&self, user_id: u64, channel_id: u64) -> Result<()> {
        self.granted_channels
            .lock()
            .unwrap()
            .push((user_id, channel_id));
        Ok(())
    }

    async fn revoke_channel(&self, user_id: u64, channel_id: u64) -> Result<()> {
        self.revoked_channels
            .lock()
            .unwrap()
            .push((user_id, channel_id));
        Ok(())
    }
}
