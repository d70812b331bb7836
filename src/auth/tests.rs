use super::*;
use crate::testutil::{memory_db, temp_dir, test_config, MockGrants, MockMailer, TempDir};

const LEA: u64 = 1001;
const PAUL: u64 = 1002;
const PROF: u64 = 2001;

struct Fixture {
    db: DatabaseConnection,
    config: Config,
    tokens: TokenService,
    roster: Roster,
    _dir: TempDir,
}

async fn fixture() -> Fixture {
    let dir = temp_dir("auth");
    std::fs::write(
        dir.path.join("m1_initial.csv"),
        "22108121;Martin;Lea\n22108122;Durand;Paul\n",
    )
    .unwrap();

    let config = test_config(dir.path.clone());
    let tokens = TokenService::new(&config.jwt_secret);
    let roster = Roster::new(dir.path.clone(), config.student_email_domain.as_str());

    Fixture {
        db: memory_db().await,
        config,
        tokens,
        roster,
        _dir: dir,
    }
}

impl Fixture {
    fn workflow(&self) -> AuthWorkflow<'_> {
        AuthWorkflow::new(&self.db, &self.roster, &self.tokens, &self.config)
    }

    async fn claim_count(&self) -> usize {
        pending_claim::Entity::find()
            .all(&self.db)
            .await
            .unwrap()
            .len()
    }

    async fn member_count(&self) -> usize {
        member::Entity::find().all(&self.db).await.unwrap().len()
    }
}

#[tokio::test]
async fn student_claim_sends_mail_and_stores_one_claim() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let now = Utc::now();

    let outcome = fx
        .workflow()
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ClaimOutcome::MailSent {
            email: "lea.martin@etu.example.fr".into()
        }
    );
    assert_eq!(mailer.sent_count(), 1);
    assert_eq!(fx.claim_count().await, 1);

    let (subject, _, recipient) = mailer.sent.lock().unwrap()[0].clone();
    assert_eq!(subject, crate::mailer::VERIFICATION_SUBJECT);
    assert_eq!(recipient, "lea.martin@etu.example.fr");
}

#[tokio::test]
async fn unknown_student_id_is_not_found_and_leaves_no_claim() {
    let fx = fixture().await;
    let mailer = MockMailer::default();

    let err = fx
        .workflow()
        .begin_student(&mailer, LEA, "99999999", Cohort::M1, Utc::now())
        .await
        .unwrap_err();

    assert!(matches!(err, BotError::NotFound(_)));
    assert_eq!(mailer.sent_count(), 0);
    assert_eq!(fx.claim_count().await, 0);
}

#[tokio::test]
async fn second_claim_within_cooldown_reprompts_without_resending() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap();

    let later = now + Duration::minutes(30);
    let outcome = workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, later)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ClaimOutcome::AwaitingToken {
            email: "lea.martin@etu.example.fr".into()
        }
    );
    // Still exactly one claim and one mail.
    assert_eq!(fx.claim_count().await, 1);
    assert_eq!(mailer.sent_count(), 1);
}

#[tokio::test]
async fn claim_after_cooldown_reissues_and_resends() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap();

    let later = now + Duration::hours(2);
    let outcome = workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, later)
        .await
        .unwrap();

    assert!(matches!(outcome, ClaimOutcome::MailSent { .. }));
    assert_eq!(fx.claim_count().await, 1);
    assert_eq!(mailer.sent_count(), 2);

    // Cooldown restarts from the fresh claim.
    let claim = pending_claim::Entity::find_by_id(LEA as i64)
        .one(&fx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claim.issued_at.timestamp(), later.timestamp());
}

#[tokio::test]
async fn verification_promotes_claim_to_member_and_grants_role() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let grants = MockGrants::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap();
    let token = mailer.last_token();

    let profile = workflow
        .complete(&grants, LEA, &token, now + Duration::minutes(5))
        .await
        .unwrap();

    assert_eq!(profile.kind, MemberKind::Student);
    assert_eq!(profile.cohort, Some(Cohort::M1));
    assert_eq!(profile.track, Some(Track::Initial));
    assert_eq!(profile.email, "lea.martin@etu.example.fr");

    assert_eq!(fx.member_count().await, 1);
    assert_eq!(fx.claim_count().await, 0);
    assert_eq!(*grants.granted_roles.lock().unwrap(), vec![(LEA, 101)]);
}

#[tokio::test]
async fn wrong_token_is_invalid_and_claim_survives() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let grants = MockGrants::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap();

    let err = workflow
        .complete(&grants, LEA, "not-the-code", now)
        .await
        .unwrap_err();

    assert!(matches!(err, BotError::InvalidToken));
    assert_eq!(fx.claim_count().await, 1);
    assert_eq!(fx.member_count().await, 0);
}

#[tokio::test]
async fn expired_token_is_reported_as_expired() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let grants = MockGrants::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap();
    let token = mailer.last_token();

    let err = workflow
        .complete(&grants, LEA, &token, now + Duration::hours(2))
        .await
        .unwrap_err();

    assert!(matches!(err, BotError::Expired));
    assert_eq!(fx.member_count().await, 0);
}

#[tokio::test]
async fn token_for_someone_elses_claim_does_not_verify() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let grants = MockGrants::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap();
    let lea_token = mailer.last_token();

    workflow
        .begin_student(&mailer, PAUL, "22108122", Cohort::M1, now)
        .await
        .unwrap();

    // Paul submits Lea's code: embedded email does not match his claim.
    let err = workflow
        .complete(&grants, PAUL, &lea_token, now)
        .await
        .unwrap_err();
    assert!(matches!(err, BotError::InvalidToken));
}

#[tokio::test]
async fn complete_without_claim_is_not_found() {
    let fx = fixture().await;
    let grants = MockGrants::default();

    let err = fx
        .workflow()
        .complete(&grants, LEA, "whatever", Utc::now())
        .await
        .unwrap_err();

    assert!(matches!(err, BotError::NotFound(_)));
}

#[tokio::test]
async fn verified_member_cannot_claim_again() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let grants = MockGrants::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap();
    let token = mailer.last_token();
    workflow.complete(&grants, LEA, &token, now).await.unwrap();

    let err = workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap_err();
    assert!(matches!(err, BotError::AlreadyExists(_)));
}

#[tokio::test]
async fn email_bound_to_another_member_is_rejected_before_issuance() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let grants = MockGrants::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap();
    let token = mailer.last_token();
    workflow.complete(&grants, LEA, &token, now).await.unwrap();

    // Paul claims Lea's student number from another Discord account.
    let err = workflow
        .begin_student(&mailer, PAUL, "22108121", Cohort::M1, now)
        .await
        .unwrap_err();

    assert!(matches!(err, BotError::AlreadyExists(_)));
    // Rejected before issuance: only Lea's original mail went out.
    assert_eq!(mailer.sent_count(), 1);
}

#[tokio::test]
async fn racing_claims_for_one_email_resolve_first_wins() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let grants = MockGrants::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    // Two accounts claim the same student number while neither is verified
    // yet; pending claims may share an address.
    workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap();
    let lea_token = mailer.last_token();
    workflow
        .begin_student(&mailer, PAUL, "22108121", Cohort::M1, now)
        .await
        .unwrap();
    let paul_token = mailer.last_token();

    workflow
        .complete(&grants, LEA, &lea_token, now)
        .await
        .unwrap();

    // Paul's code is valid, but the address is taken now.
    let err = workflow
        .complete(&grants, PAUL, &paul_token, now)
        .await
        .unwrap_err();
    assert!(matches!(err, BotError::AlreadyExists(_)));
    assert_eq!(fx.member_count().await, 1);
    // Paul's doomed claim was dropped so he can start over.
    assert_eq!(fx.claim_count().await, 0);
}

#[tokio::test]
async fn failed_send_rolls_the_claim_back() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    mailer.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    let err = workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap_err();
    assert!(matches!(err, BotError::ExternalService(_)));
    assert_eq!(fx.claim_count().await, 0);

    // An immediate retry is not stuck behind the cooldown.
    mailer
        .fail
        .store(false, std::sync::atomic::Ordering::SeqCst);
    let outcome = workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap();
    assert!(matches!(outcome, ClaimOutcome::MailSent { .. }));
}

#[tokio::test]
async fn deauthentication_revokes_and_forgets() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let grants = MockGrants::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap();
    let token = mailer.last_token();
    workflow.complete(&grants, LEA, &token, now).await.unwrap();

    workflow.deauthenticate(&grants, LEA).await.unwrap();

    assert_eq!(fx.member_count().await, 0);
    assert_eq!(*grants.revoked_roles.lock().unwrap(), vec![(LEA, 101)]);

    // Back to unauthenticated: a fresh claim goes through.
    let outcome = workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now + Duration::hours(2))
        .await
        .unwrap();
    assert!(matches!(outcome, ClaimOutcome::MailSent { .. }));
}

#[tokio::test]
async fn staff_claim_requires_the_staff_domain() {
    let fx = fixture().await;
    let mailer = MockMailer::default();

    let err = fx
        .workflow()
        .begin_staff(
            &mailer,
            PROF,
            "prof@gmail.com",
            Some("Dr. Example".into()),
            Utc::now(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BotError::PermissionDenied(_)));
    assert_eq!(mailer.sent_count(), 0);
}

#[tokio::test]
async fn staff_flow_grants_staff_role_and_channel_access() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let grants = MockGrants::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    workflow
        .begin_staff(
            &mailer,
            PROF,
            "Jean.Dupont@example.fr",
            Some("Prof. Dupont".into()),
            now,
        )
        .await
        .unwrap();
    let token = mailer.last_token();

    let profile = workflow.complete(&grants, PROF, &token, now).await.unwrap();
    assert_eq!(profile.kind, MemberKind::Staff);
    // Claimed address was normalized.
    assert_eq!(profile.email, "jean.dupont@example.fr");
    assert_eq!(*grants.granted_roles.lock().unwrap(), vec![(PROF, 200)]);

    workflow.add_access(&grants, PROF, 555).await.unwrap();
    assert_eq!(*grants.granted_channels.lock().unwrap(), vec![(PROF, 555)]);

    let err = workflow.add_access(&grants, PROF, 555).await.unwrap_err();
    assert!(matches!(err, BotError::AlreadyExists(_)));

    workflow.remove_access(&grants, PROF, 555).await.unwrap();
    assert_eq!(*grants.revoked_channels.lock().unwrap(), vec![(PROF, 555)]);

    let err = workflow.remove_access(&grants, PROF, 555).await.unwrap_err();
    assert!(matches!(err, BotError::NotFound(_)));
}

#[tokio::test]
async fn channel_access_is_staff_only() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let grants = MockGrants::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    workflow
        .begin_student(&mailer, LEA, "22108121", Cohort::M1, now)
        .await
        .unwrap();
    let token = mailer.last_token();
    workflow.complete(&grants, LEA, &token, now).await.unwrap();

    let err = workflow.add_access(&grants, LEA, 555).await.unwrap_err();
    assert!(matches!(err, BotError::PermissionDenied(_)));
}

#[tokio::test]
async fn staff_deauthentication_revokes_channel_grants_too() {
    let fx = fixture().await;
    let mailer = MockMailer::default();
    let grants = MockGrants::default();
    let now = Utc::now();
    let workflow = fx.workflow();

    workflow
        .begin_staff(&mailer, PROF, "jean.dupont@example.fr", None, now)
        .await
        .unwrap();
    let token = mailer.last_token();
    workflow.complete(&grants, PROF, &token, now).await.unwrap();
    workflow.add_access(&grants, PROF, 555).await.unwrap();
    workflow.add_access(&grants, PROF, 556).await.unwrap();

    workflow.deauthenticate(&grants, PROF).await.unwrap();

    let mut revoked = grants.revoked_channels.lock().unwrap().clone();
    revoked.sort();
    assert_eq!(revoked, vec![(PROF, 555), (PROF, 556)]);
    assert!(member_access::Entity::find()
        .all(&fx.db)
        .await
        .unwrap()
        .is_empty());
}
