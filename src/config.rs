use anyhow::{bail, Context};
use std::path::PathBuf;

use crate::roster::Cohort;

/// Process-wide configuration, resolved from the environment once at startup
/// and passed by reference to every component that needs it.
#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    /// Signing secret for verification tokens. Rotating it invalidates every
    /// outstanding token.
    pub jwt_secret: String,
    pub roster_dir: PathBuf,
    pub student_email_domain: String,
    pub staff_email_domain: String,
    pub mail_relay_url: String,
    pub mail_relay_key: String,
    pub m1_role: u64,
    pub m2_role: u64,
    pub staff_role: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() {
            // The token service cannot operate without it, so refuse to start.
            bail!("JWT_SECRET is not set; refusing to start");
        }

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://securibot.db?mode=rwc".to_string()),
            jwt_secret,
            roster_dir: std::env::var("ROSTER_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("rosters")),
            student_email_domain: required("STUDENT_EMAIL_DOMAIN")?,
            staff_email_domain: required("STAFF_EMAIL_DOMAIN")?,
            mail_relay_url: required("MAIL_RELAY_URL")?,
            mail_relay_key: required("MAIL_RELAY_KEY")?,
            m1_role: required_id("M1_ROLE_ID")?,
            m2_role: required_id("M2_ROLE_ID")?,
            staff_role: required_id("STAFF_ROLE_ID")?,
        })
    }

    pub fn cohort_role(&self, cohort: Cohort) -> u64 {
        match cohort {
            Cohort::M1 => self.m1_role,
            Cohort::M2 => self.m2_role,
        }
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{} is not set", name))
}

fn required_id(name: &str) -> anyhow::Result<u64> {
    required(name)?
        .parse::<u64>()
        .with_context(|| format!("{} is not a valid Discord id", name))
}
