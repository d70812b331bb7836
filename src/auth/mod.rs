#[cfg(test)]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use tracing::info;

use crate::config::Config;
use crate::db::{member, member_access, pending_claim};
use crate::error::{BotError, Result};
use crate::mailer::{verification_body, Mailer, VERIFICATION_SUBJECT};
use crate::roster::{Cohort, Roster, Track};
use crate::token::TokenService;

/// While a pending claim is younger than this, repeat claim requests
/// re-prompt for the code instead of issuing and mailing a new one.
const CLAIM_COOLDOWN_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Student,
    Staff,
}

impl MemberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberKind::Student => "student",
            MemberKind::Staff => "staff",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(MemberKind::Student),
            "staff" => Some(MemberKind::Staff),
            _ => None,
        }
    }
}

/// External role/permission effects of the workflow. The Discord
/// implementation lives in the command layer; tests record calls.
#[async_trait]
pub trait RoleGrants: Send + Sync {
    async fn grant_role(&self, user_id: u64, role_id: u64) -> Result<()>;
    async fn revoke_role(&self, user_id: u64, role_id: u64) -> Result<()>;
    async fn grant_channel(&self, user_id: u64, channel_id: u64) -> Result<()>;
    async fn revoke_channel(&self, user_id: u64, channel_id: u64) -> Result<()>;
}

/// What the requester should be told after starting a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Fresh claim: a verification mail with the code is on its way.
    MailSent { email: String },
    /// A claim is still inside the cooldown window. Prompt for the code
    /// again; nothing was created and nothing was re-sent.
    AwaitingToken { email: String },
}

#[derive(Debug, Clone)]
pub struct VerifiedProfile {
    pub email: String,
    pub kind: MemberKind,
    pub cohort: Option<Cohort>,
    pub track: Option<Track>,
    pub display_name: Option<String>,
}

/// Claim → token → verification state machine, persisted across the
/// `pending_claim` and `member` tables.
pub struct AuthWorkflow<'a> {
    db: &'a DatabaseConnection,
    roster: &'a Roster,
    tokens: &'a TokenService,
    config: &'a Config,
}

impl<'a> AuthWorkflow<'a> {
    pub fn new(
        db: &'a DatabaseConnection,
        roster: &'a Roster,
        tokens: &'a TokenService,
        config: &'a Config,
    ) -> Self {
        Self {
            db,
            roster,
            tokens,
            config,
        }
    }

    /// Starts a student claim: roster lookup, token issuance, verification
    /// mail. Inside the cooldown window the existing claim is kept and only
    /// the prompt is re-issued.
    pub async fn begin_student(
        &self,
        mailer: &dyn Mailer,
        requester_id: u64,
        student_id: &str,
        cohort: Cohort,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        self.ensure_not_member(requester_id).await?;

        if let Some(pending) = self.pending_within_cooldown(requester_id, now).await? {
            return Ok(ClaimOutcome::AwaitingToken {
                email: pending.email,
            });
        }

        let record = self
            .roster
            .find_by_id(student_id, Some(cohort))
            .ok_or_else(|| {
                BotError::NotFound(format!("Student number `{}` in {}", student_id, cohort))
            })?;

        self.ensure_email_unclaimed(&record.email).await?;

        let claim = pending_claim::ActiveModel {
            requester_id: Set(requester_id as i64),
            email: Set(record.email.clone()),
            kind: Set(MemberKind::Student.as_str().to_string()),
            student_id: Set(Some(record.student_id.clone())),
            cohort: Set(Some(record.cohort.as_str().to_string())),
            track: Set(Some(record.track.as_str().to_string())),
            display_name: Set(None),
            issued_at: Set(now),
        };
        self.replace_claim(requester_id, claim).await?;

        self.issue_and_send(mailer, requester_id, &record.email, now)
            .await?;

        Ok(ClaimOutcome::MailSent {
            email: record.email,
        })
    }

    /// Starts a staff claim for a free-form address on the staff domain.
    pub async fn begin_staff(
        &self,
        mailer: &dyn Mailer,
        requester_id: u64,
        email: &str,
        display_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        self.ensure_not_member(requester_id).await?;

        if let Some(pending) = self.pending_within_cooldown(requester_id, now).await? {
            return Ok(ClaimOutcome::AwaitingToken {
                email: pending.email,
            });
        }

        let email = email.trim().to_lowercase();
        let staff_suffix = format!("@{}", self.config.staff_email_domain);
        if !email.ends_with(&staff_suffix) {
            return Err(BotError::PermissionDenied(format!(
                "claim an address outside {}",
                staff_suffix
            )));
        }

        self.ensure_email_unclaimed(&email).await?;

        let claim = pending_claim::ActiveModel {
            requester_id: Set(requester_id as i64),
            email: Set(email.clone()),
            kind: Set(MemberKind::Staff.as_str().to_string()),
            student_id: Set(None),
            cohort: Set(None),
            track: Set(None),
            display_name: Set(display_name),
            issued_at: Set(now),
        };
        self.replace_claim(requester_id, claim).await?;

        self.issue_and_send(mailer, requester_id, &email, now).await?;

        Ok(ClaimOutcome::MailSent { email })
    }

    /// Verifies a submitted token against the requester's pending claim and,
    /// on success, promotes the claim into a member record and applies the
    /// external grants.
    ///
    /// The claim row is deleted before the member row is written: if two
    /// submissions race, the first delete wins and the second sees the claim
    /// as gone.
    pub async fn complete(
        &self,
        grants: &dyn RoleGrants,
        requester_id: u64,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedProfile> {
        let key = requester_id as i64;
        let claim = pending_claim::Entity::find_by_id(key)
            .one(self.db)
            .await?
            .ok_or_else(|| BotError::NotFound("A pending verification for your account".into()))?;

        // Failure leaves the claim untouched so the requester can retry.
        self.tokens.verify(token, &claim.email, now)?;

        // Someone else may have verified the same address while this claim
        // sat in an inbox. Such a claim can never complete, so drop it.
        if let Err(e) = self.ensure_email_unclaimed(&claim.email).await {
            pending_claim::Entity::delete_by_id(key).exec(self.db).await?;
            return Err(e);
        }

        let deleted = pending_claim::Entity::delete_by_id(key)
            .exec(self.db)
            .await?;
        if deleted.rows_affected == 0 {
            return Err(BotError::NotFound(
                "A pending verification for your account".into(),
            ));
        }

        let kind = MemberKind::parse(&claim.kind).unwrap_or(MemberKind::Student);
        member::ActiveModel {
            requester_id: Set(key),
            email: Set(claim.email.clone()),
            kind: Set(claim.kind.clone()),
            student_id: Set(claim.student_id.clone()),
            cohort: Set(claim.cohort.clone()),
            track: Set(claim.track.clone()),
            display_name: Set(claim.display_name.clone()),
            verified_at: Set(now),
        }
        .insert(self.db)
        .await?;

        let cohort = claim.cohort.as_deref().and_then(Cohort::parse);
        match kind {
            MemberKind::Student => {
                if let Some(cohort) = cohort {
                    grants
                        .grant_role(requester_id, self.config.cohort_role(cohort))
                        .await?;
                }
            }
            MemberKind::Staff => {
                grants
                    .grant_role(requester_id, self.config.staff_role)
                    .await?;
            }
        }

        info!(
            "Verified {} as {} ({})",
            requester_id,
            claim.email,
            kind.as_str()
        );

        Ok(VerifiedProfile {
            email: claim.email,
            kind,
            cohort,
            track: claim.track.as_deref().and_then(Track::parse),
            display_name: claim.display_name,
        })
    }

    /// Drops the member record and revokes every grant that came with it.
    pub async fn deauthenticate(&self, grants: &dyn RoleGrants, requester_id: u64) -> Result<()> {
        let key = requester_id as i64;
        let record = member::Entity::find_by_id(key)
            .one(self.db)
            .await?
            .ok_or_else(|| BotError::NotFound("A verified profile for your account".into()))?;

        match MemberKind::parse(&record.kind) {
            Some(MemberKind::Staff) | None => {
                grants
                    .revoke_role(requester_id, self.config.staff_role)
                    .await?;
            }
            Some(MemberKind::Student) => {
                if let Some(cohort) = record.cohort.as_deref().and_then(Cohort::parse) {
                    grants
                        .revoke_role(requester_id, self.config.cohort_role(cohort))
                        .await?;
                }
            }
        }

        let accesses = member_access::Entity::find()
            .filter(member_access::Column::MemberId.eq(key))
            .all(self.db)
            .await?;
        for access in &accesses {
            grants
                .revoke_channel(requester_id, access.channel_id as u64)
                .await?;
        }
        member_access::Entity::delete_many()
            .filter(member_access::Column::MemberId.eq(key))
            .exec(self.db)
            .await?;

        member::Entity::delete_by_id(key).exec(self.db).await?;

        info!("Deauthenticated {} ({})", requester_id, record.email);
        Ok(())
    }

    /// Grants a staff member access to an extra channel.
    pub async fn add_access(
        &self,
        grants: &dyn RoleGrants,
        requester_id: u64,
        channel_id: u64,
    ) -> Result<()> {
        let record = self.staff_member(requester_id).await?;

        let existing = member_access::Entity::find()
            .filter(member_access::Column::MemberId.eq(record.requester_id))
            .filter(member_access::Column::ChannelId.eq(channel_id as i64))
            .one(self.db)
            .await?;
        if existing.is_some() {
            return Err(BotError::AlreadyExists(
                "That channel access is already granted".into(),
            ));
        }

        member_access::ActiveModel {
            member_id: Set(record.requester_id),
            channel_id: Set(channel_id as i64),
            ..Default::default()
        }
        .insert(self.db)
        .await?;

        grants.grant_channel(requester_id, channel_id).await
    }

    /// Removes a previously granted channel access.
    pub async fn remove_access(
        &self,
        grants: &dyn RoleGrants,
        requester_id: u64,
        channel_id: u64,
    ) -> Result<()> {
        let record = self.staff_member(requester_id).await?;

        let deleted = member_access::Entity::delete_many()
            .filter(member_access::Column::MemberId.eq(record.requester_id))
            .filter(member_access::Column::ChannelId.eq(channel_id as i64))
            .exec(self.db)
            .await?;
        if deleted.rows_affected == 0 {
            return Err(BotError::NotFound(
                "A grant for that channel on this member".into(),
            ));
        }

        grants.revoke_channel(requester_id, channel_id).await
    }

    async fn staff_member(&self, requester_id: u64) -> Result<member::Model> {
        let record = member::Entity::find_by_id(requester_id as i64)
            .one(self.db)
            .await?
            .ok_or_else(|| BotError::NotFound("A verified profile for that account".into()))?;
        if MemberKind::parse(&record.kind) != Some(MemberKind::Staff) {
            return Err(BotError::PermissionDenied(
                "manage channel access for a non-staff member".into(),
            ));
        }
        Ok(record)
    }

    async fn ensure_not_member(&self, requester_id: u64) -> Result<()> {
        let existing = member::Entity::find_by_id(requester_id as i64)
            .one(self.db)
            .await?;
        match existing {
            Some(_) => Err(BotError::AlreadyExists(
                "You are already verified on this server".into(),
            )),
            None => Ok(()),
        }
    }

    /// An address may linger on an abandoned claim, but never on a second
    /// verified member.
    async fn ensure_email_unclaimed(&self, email: &str) -> Result<()> {
        let existing = member::Entity::find()
            .filter(member::Column::Email.eq(email))
            .one(self.db)
            .await?;
        match existing {
            Some(_) => Err(BotError::AlreadyExists(
                "That address is already linked to another account".into(),
            )),
            None => Ok(()),
        }
    }

    async fn pending_within_cooldown(
        &self,
        requester_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<pending_claim::Model>> {
        let pending = pending_claim::Entity::find_by_id(requester_id as i64)
            .one(self.db)
            .await?;
        Ok(pending.filter(|claim| {
            now.signed_duration_since(claim.issued_at) < Duration::seconds(CLAIM_COOLDOWN_SECS)
        }))
    }

    /// Stale claims are replaced wholesale; the cooldown window restarts
    /// from the new claim's issue time.
    async fn replace_claim(
        &self,
        requester_id: u64,
        claim: pending_claim::ActiveModel,
    ) -> Result<()> {
        pending_claim::Entity::delete_by_id(requester_id as i64)
            .exec(self.db)
            .await?;
        claim.insert(self.db).await?;
        Ok(())
    }

    /// Mints the token and mails it. A failed send rolls the claim back so
    /// the requester is not locked out for the whole cooldown window with no
    /// code in hand.
    async fn issue_and_send(
        &self,
        mailer: &dyn Mailer,
        requester_id: u64,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let token = self.tokens.issue(email, now)?;
        let body = verification_body(&token);

        if let Err(e) = mailer.send(VERIFICATION_SUBJECT, &body, email).await {
            pending_claim::Entity::delete_by_id(requester_id as i64)
                .exec(self.db)
                .await?;
            return Err(e);
        }
        Ok(())
    }
}
