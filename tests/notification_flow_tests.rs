//! End-to-end notification flow: fan-out, queueing, digest delivery, and
//! push dispatch against fake transports over a temp flat-file tree.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wave_server::models::member::{Member, NotificationPreference, PhoneNumber};
use wave_server::models::notification::{
    EventAction, EventKind, NotificationEvent, NotificationKind,
};
use wave_server::models::subscription::{DeviceSubscription, SubscriptionKeys};
use wave_server::services::push::{PushSendError, PushTransport};
use wave_server::services::queue::Channel;
use wave_server::services::sms::SmsTransport;
use wave_server::{AppState, Config};

#[derive(Default)]
struct FakePush {
    sent: Mutex<Vec<(String, String)>>, // (endpoint, payload)
}

#[async_trait]
impl PushTransport for FakePush {
    async fn send(
        &self,
        subscription: &DeviceSubscription,
        payload: &str,
    ) -> Result<(), PushSendError> {
        self.sent
            .lock()
            .unwrap()
            .push((subscription.endpoint.clone(), payload.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct FakeSms {
    sent: Mutex<Vec<(String, String)>>, // (number, body)
}

#[async_trait]
impl SmsTransport for FakeSms {
    async fn send(&self, to: &str, body: &str) -> wave_server::Result<()> {
        self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    state: AppState,
    push: Arc<FakePush>,
    sms: Arc<FakeSms>,
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

async fn harness() -> Harness {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        client_url: "https://wave.example".to_string(),
        ..Config::default()
    };
    let push = Arc::new(FakePush::default());
    let sms = Arc::new(FakeSms::default());
    let state = AppState::with_transports(config, push.clone(), sms.clone()).unwrap();

    let members = vec![
        member("u1", "Ann", Some(NotificationPreference::Sms), true),
        member("u2", "Ben", Some(NotificationPreference::Sms), true),
        member("u3", "Cleo", Some(NotificationPreference::Push), false),
        member("u4", "Dan", None, false),
        // SMS preference but unverified phone: must be skipped.
        member("u5", "Edie", Some(NotificationPreference::Sms), false),
    ];
    state
        .store
        .write("g1/users/identities.json", &members)
        .await
        .unwrap();

    Harness {
        _dir: dir,
        state,
        push,
        sms,
    }
}

fn member(
    id: &str,
    name: &str,
    preference: Option<NotificationPreference>,
    verified: bool,
) -> Member {
    Member {
        id: id.to_string(),
        name: name.to_string(),
        notification_preference: preference,
        phone_number: Some(PhoneNumber {
            number: format!("+1555000{}", id.trim_start_matches('u')),
            verified,
        }),
    }
}

fn upload_event(item_id: &str, uploader: &str) -> NotificationEvent {
    NotificationEvent {
        action: EventAction::Add,
        group_id: "g1".to_string(),
        item_id: item_id.to_string(),
        owner_id: uploader.to_string(),
        actor_id: uploader.to_string(),
        kind: EventKind::Upload,
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}

#[tokio::test]
async fn upload_fans_out_to_everyone_but_the_uploader() {
    let h = harness().await;

    // u3 has one registered push device.
    h.state
        .push
        .subscribe(
            "g1",
            "u3",
            DeviceSubscription {
                endpoint: "ep-u3".to_string(),
                keys: SubscriptionKeys {
                    p256dh: "p".to_string(),
                    auth: "a".to_string(),
                },
                timestamp: Utc::now(),
                renewal_count: 0,
                last_renewal: None,
            },
        )
        .await
        .unwrap();

    h.state.fanout.process(&upload_event("item1", "u1")).await.unwrap();

    // SMS-pending queue for the other verified SMS user.
    let pending = h
        .state
        .queues
        .pending("g1", "u2", Channel::SmsPending)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, NotificationKind::Upload);
    assert_eq!(pending[0].actor.name, "Ann");

    // Uploader, preference-less, and unverified members get nothing queued.
    for skipped in ["u1", "u4", "u5"] {
        assert!(h
            .state
            .queues
            .pending("g1", skipped, Channel::SmsPending)
            .await
            .unwrap()
            .is_empty());
    }

    // Push user got an immediate fire-and-forget dispatch.
    wait_for(|| !h.push.sent.lock().unwrap().is_empty()).await;
    let sent = h.push.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "ep-u3");
    assert!(sent[0].1.contains("Ann uploaded a new post."));
}

#[tokio::test]
async fn comment_notifies_owner_prior_commenters_and_mentions_once() {
    let h = harness().await;

    // u2 commented earlier on u1's item.
    h.state
        .library
        .add_comment(
            "g1",
            "item1",
            wave_server::models::comment::Comment {
                user_id: "u2".to_string(),
                comment: "first!".to_string(),
                timestamp: None,
                media: None,
            },
        )
        .await
        .unwrap();

    // u3 comments, mentioning Ben (already a prior commenter) and Edie.
    let event = NotificationEvent {
        action: EventAction::Add,
        group_id: "g1".to_string(),
        item_id: "item1".to_string(),
        owner_id: "u1".to_string(),
        actor_id: "u3".to_string(),
        kind: EventKind::Comment {
            comment: "agreed @Ben, also @Edie look at this".to_string(),
            comment_index: Some(1),
        },
    };
    h.state.fanout.process(&event).await.unwrap();

    let owner = h
        .state
        .queues
        .pending("g1", "u1", Channel::SmsPending)
        .await
        .unwrap();
    assert_eq!(owner.len(), 1);
    assert!(matches!(
        owner[0].kind,
        NotificationKind::CommentOnYourPost { .. }
    ));

    // Ben: exactly one notification, as prior commenter, not doubled by the
    // mention.
    let ben = h
        .state
        .queues
        .pending("g1", "u2", Channel::SmsPending)
        .await
        .unwrap();
    assert_eq!(ben.len(), 1);
    assert!(matches!(
        ben[0].kind,
        NotificationKind::CommentOnPostYouCommentedOn { .. }
    ));

    // Edie prefers SMS but is unverified: mention recipient computed, then
    // skipped at delivery.
    assert!(h
        .state
        .queues
        .pending("g1", "u5", Channel::SmsPending)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn reaction_toggle_leaves_no_queue_entry_and_no_stored_reaction() {
    let h = harness().await;

    for _ in 0..2 {
        let (_, action) = h
            .state
            .library
            .toggle_reaction("g1", "item1", "u2", "❤️")
            .await
            .unwrap();
        let event = NotificationEvent {
            action,
            group_id: "g1".to_string(),
            item_id: "item1".to_string(),
            owner_id: "u1".to_string(),
            actor_id: "u2".to_string(),
            kind: EventKind::Reaction {
                reaction: "❤️".to_string(),
            },
        };
        h.state.fanout.process(&event).await.unwrap();
    }

    assert!(h
        .state
        .queues
        .pending("g1", "u1", Channel::SmsPending)
        .await
        .unwrap()
        .is_empty());
    assert!(h.state.library.reactions("g1", "item1").await.unwrap().is_empty());
}

#[tokio::test]
async fn comment_reaction_notifies_only_the_comment_author() {
    let h = harness().await;

    let event = NotificationEvent {
        action: EventAction::Add,
        group_id: "g1".to_string(),
        item_id: "item1".to_string(),
        owner_id: "u2".to_string(), // comment author
        actor_id: "u1".to_string(),
        kind: EventKind::CommentReaction {
            reaction: "🔥".to_string(),
            comment_index: Some(0),
        },
    };
    h.state.fanout.process(&event).await.unwrap();

    let author = h
        .state
        .queues
        .pending("g1", "u2", Channel::SmsPending)
        .await
        .unwrap();
    assert_eq!(author.len(), 1);
    assert!(matches!(
        author[0].kind,
        NotificationKind::ReactionOnYourComment { .. }
    ));

    // Nobody else hears about it.
    assert!(h
        .state
        .queues
        .pending("g1", "u1", Channel::SmsPending)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn digest_flush_delivers_sms_and_clears_the_queue() {
    let h = harness().await;

    h.state.fanout.process(&upload_event("item1", "u1")).await.unwrap();
    h.state.fanout.process(&upload_event("item2", "u1")).await.unwrap();

    let flushed = h.state.digests.flush_group("g1").await.unwrap();
    assert_eq!(flushed, 1); // only u2 had pending notifications

    wait_for(|| !h.sms.sent.lock().unwrap().is_empty()).await;
    let sent = h.sms.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "+15550002");
    assert!(sent[0].1.starts_with("(WAVE)g1: "));
    assert!(sent[0].1.contains("Ann added posts"));
    assert!(sent[0].1.ends_with("https://wave.example/g1/u2"));

    assert!(h
        .state
        .queues
        .pending("g1", "u2", Channel::SmsPending)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unknown_recipient_does_not_abort_the_fanout() {
    let h = harness().await;

    // Owner id that is not in the member directory.
    let event = NotificationEvent {
        action: EventAction::Add,
        group_id: "g1".to_string(),
        item_id: "item1".to_string(),
        owner_id: "ghost".to_string(),
        actor_id: "u2".to_string(),
        kind: EventKind::Reaction {
            reaction: "❤️".to_string(),
        },
    };
    h.state.fanout.process(&event).await.unwrap();

    // Upload from a ghost uploader still notifies real members.
    h.state
        .fanout
        .process(&upload_event("item2", "ghost"))
        .await
        .unwrap();
    let pending = h
        .state
        .queues
        .pending("g1", "u1", Channel::SmsPending)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}
