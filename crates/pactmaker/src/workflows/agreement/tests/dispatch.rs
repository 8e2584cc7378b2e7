use super::common::*;
use std::sync::Arc;

use crate::workflows::agreement::dispatch::{Audience, DeliveryError, NotificationDispatcher};
use crate::workflows::agreement::pdf::MaterializedDocument;
use crate::workflows::agreement::service::SignedAgreement;
use crate::workflows::agreement::submission::Submission;

fn signed(submission: Submission) -> SignedAgreement {
    let mut submission = submission;
    submission.stamp_date(signing_date());
    SignedAgreement {
        submission,
        document: MaterializedDocument::from_pdf(b"%PDF-1.4 test".to_vec()),
    }
}

fn dispatcher(
    mailer: Arc<RecordingMailer>,
    internal_recipients: &[&str],
) -> NotificationDispatcher<RecordingMailer> {
    NotificationDispatcher::new(
        mailer,
        templates(),
        FROM_ADDRESS,
        internal_recipients.iter().map(|r| r.to_string()).collect(),
    )
}

#[tokio::test]
async fn fans_out_to_signee_and_each_internal_recipient() {
    let mailer = Arc::new(RecordingMailer::default());
    let dispatcher = dispatcher(mailer.clone(), &["a@x.com", "b@x.com", "c@x.com"]);

    let outcomes = dispatcher.deliver_all(&signed(submission())).await;

    assert_eq!(outcomes.len(), 4);
    assert_eq!(mailer.attempts(), 4);
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| outcome.audience == Audience::Signee)
            .count(),
        1
    );

    let mut recipients: Vec<String> = mailer.messages().into_iter().map(|m| m.to).collect();
    recipients.sort();
    assert_eq!(recipients, vec!["a@x.com", "b@x.com", "c@x.com", SIGNEE_EMAIL]);
    assert!(outcomes.iter().all(|outcome| outcome.is_delivered()));
}

#[tokio::test]
async fn sends_only_to_signee_without_internal_recipients() {
    let mailer = Arc::new(RecordingMailer::default());
    let dispatcher = dispatcher(mailer.clone(), &[]);

    let outcomes = dispatcher.deliver_all(&signed(submission())).await;

    assert_eq!(outcomes.len(), 1);
    let messages = mailer.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].to, SIGNEE_EMAIL);
    assert_eq!(messages[0].from, FROM_ADDRESS);
}

#[tokio::test]
async fn every_message_shares_one_attachment() {
    let mailer = Arc::new(RecordingMailer::default());
    let dispatcher = dispatcher(mailer.clone(), &["a@x.com", "b@x.com"]);
    let signed = signed(submission());

    dispatcher.deliver_all(&signed).await;

    let messages = mailer.messages();
    let first = &messages[0].attachments[0];
    for message in &messages {
        assert_eq!(message.attachments.len(), 1);
        assert!(Arc::ptr_eq(first, &message.attachments[0]));
    }
    assert_eq!(first.filename, "Acme_January 1st, 2024.pdf");
    assert_eq!(first.content, signed.document.base64());
    assert_eq!(first.content_type, "application/pdf");
    assert_eq!(**first, signed.attachment());
}

#[tokio::test]
async fn signee_failure_does_not_block_internal_sends() {
    let mailer = Arc::new(RecordingMailer::failing_for(&[SIGNEE_EMAIL]));
    let dispatcher = dispatcher(mailer.clone(), &["a@x.com", "b@x.com"]);

    let outcomes = dispatcher.deliver_all(&signed(submission())).await;

    assert_eq!(mailer.attempts(), 3);
    for outcome in &outcomes {
        match outcome.audience {
            Audience::Signee => assert!(matches!(outcome.result, Err(DeliveryError::Mailer(_)))),
            Audience::Internal => assert!(outcome.is_delivered()),
        }
    }
}

#[tokio::test]
async fn internal_failure_is_isolated_to_that_recipient() {
    let mailer = Arc::new(RecordingMailer::failing_for(&["b@x.com"]));
    let dispatcher = dispatcher(mailer.clone(), &["a@x.com", "b@x.com", "c@x.com"]);

    let outcomes = dispatcher.deliver_all(&signed(submission())).await;

    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|outcome| !outcome.is_delivered())
        .map(|outcome| outcome.recipient.as_str())
        .collect();
    assert_eq!(failed, vec!["b@x.com"]);
    assert_eq!(outcomes.iter().filter(|o| o.is_delivered()).count(), 3);
}

#[tokio::test]
async fn missing_signee_email_still_notifies_internal_team() {
    let mailer = Arc::new(RecordingMailer::default());
    let dispatcher = dispatcher(mailer.clone(), &["a@x.com"]);
    let mut submission = submission();
    submission.insert("email", "");

    let outcomes = dispatcher.deliver_all(&signed(submission)).await;

    assert_eq!(mailer.attempts(), 1);
    let signee = outcomes
        .iter()
        .find(|outcome| outcome.audience == Audience::Signee)
        .expect("signee outcome reported");
    assert!(matches!(signee.result, Err(DeliveryError::MissingRecipient)));
}

#[tokio::test]
async fn audiences_use_their_own_templates() {
    let mailer = Arc::new(RecordingMailer::default());
    let dispatcher = dispatcher(mailer.clone(), &["ops@x.com"]);

    dispatcher.deliver_all(&signed(submission())).await;

    let messages = mailer.messages();
    let signee = messages
        .iter()
        .find(|m| m.to == SIGNEE_EMAIL)
        .expect("signee message");
    let internal = messages
        .iter()
        .find(|m| m.to == "ops@x.com")
        .expect("internal message");

    assert_eq!(signee.subject, "Your Acme agreement");
    assert_eq!(internal.subject, "Acme signed");
    assert!(signee.html_body.contains("Thank you for signing"));
    assert!(internal.html_body.contains("A new agreement has been signed"));
}

#[tokio::test]
async fn spawned_dispatch_completes_without_being_joined() {
    let mailer = Arc::new(RecordingMailer::default());
    let dispatcher = dispatcher(mailer.clone(), &["a@x.com"]);

    drop(dispatcher.spawn(signed(submission())));
    settle().await;

    assert_eq!(mailer.attempts(), 2);
}
