use super::*;
use crate::chat::registry::SessionHandle;
use crate::test_support::{seeded_db, seeded_shared_db, AGENT, LISTING_ID, OUTSIDER, TENANT};
use lib_core::model::collab::SqlParticipantDirectory;

fn dispatcher(pool: &DbPool, registry: Arc<ConnectionRegistry>, max_len: usize) -> DeliveryDispatcher {
    DeliveryDispatcher::new(
        pool.clone(),
        registry,
        Arc::new(SqlParticipantDirectory::new(pool.clone())),
        max_len,
    )
}

fn text(content: &str) -> OutgoingMessage {
    OutgoingMessage::new(content, None)
}

async fn empty_conversation(pool: &DbPool) -> Conversation {
    let mut conn = pool.acquire().await.unwrap();
    ConversationRepository::find_or_create(&mut conn, TENANT, AGENT, LISTING_ID)
        .await
        .unwrap()
        .0
}

#[tokio::test]
async fn test_start_conversation_counts_unread_for_receiver() {
    let pool = seeded_db().await;
    let dispatcher = dispatcher(&pool, Arc::new(ConnectionRegistry::new()), 500);

    let (conversation, created, delivery) = dispatcher
        .start_conversation(TENANT, AGENT, LISTING_ID, text("Hello"))
        .await
        .unwrap();

    assert!(created);
    assert!(!delivery.pushed);
    assert_eq!(conversation.unread_for(&AGENT), Some(1));
    assert_eq!(conversation.unread_for(&TENANT), Some(0));
    assert_eq!(conversation.last_message.as_ref().map(|m| m.content.as_str()), Some("Hello"));
    assert_eq!(delivery.message.sender.display_name.as_deref(), Some("Tomás Tenant"));
    assert_eq!(delivery.message.receiver, AGENT);
}

#[tokio::test]
async fn test_start_conversation_reuses_pair_in_either_order() {
    let pool = seeded_db().await;
    let dispatcher = dispatcher(&pool, Arc::new(ConnectionRegistry::new()), 500);

    let (first, _, _) = dispatcher
        .start_conversation(TENANT, AGENT, LISTING_ID, text("Hello"))
        .await
        .unwrap();
    let (second, created, _) = dispatcher
        .start_conversation(AGENT, TENANT, LISTING_ID, text("Hi, it is available"))
        .await
        .unwrap();

    assert!(!created);
    assert_eq!(first.id, second.id);
    assert_eq!(second.unread_for(&TENANT), Some(1));
    assert_eq!(second.unread_for(&AGENT), Some(1));
}

#[tokio::test]
async fn test_start_conversation_with_self_is_rejected() {
    let pool = seeded_db().await;
    let dispatcher = dispatcher(&pool, Arc::new(ConnectionRegistry::new()), 500);

    let result = dispatcher.start_conversation(TENANT, TENANT, LISTING_ID, text("me")).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let conversations = ConversationRepository::list_for_participant(&pool, TENANT).await.unwrap();
    assert!(conversations.is_empty());
}

#[tokio::test]
async fn test_online_receiver_gets_new_message() {
    let pool = seeded_db().await;
    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = dispatcher(&pool, registry.clone(), 500);
    let conversation = empty_conversation(&pool).await;

    let (agent_session, mut agent_rx) = SessionHandle::new(AGENT);
    registry.register(agent_session).await;

    let delivery = dispatcher
        .send(conversation.id, TENANT, Some(AGENT), text("Is parking included?"))
        .await
        .unwrap();
    assert!(delivery.pushed);

    match agent_rx.recv().await {
        Some(ServerEvent::NewMessage { conversation_id, message }) => {
            assert_eq!(conversation_id, conversation.id);
            assert_eq!(message.content, "Is parking included?");
            assert_eq!(message.id, delivery.message.id);
            assert!(!message.read);
        }
        other => panic!("expected new_message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_offline_messages_are_pulled_and_marked_read() {
    let pool = seeded_db().await;
    let dispatcher = dispatcher(&pool, Arc::new(ConnectionRegistry::new()), 500);
    let conversation = empty_conversation(&pool).await;

    for content in ["one", "two", "three"] {
        let delivery = dispatcher.send(conversation.id, TENANT, None, text(content)).await.unwrap();
        assert!(!delivery.pushed);
    }
    assert_eq!(ConversationRepository::total_unread(&pool, AGENT).await.unwrap(), 3);

    let history = dispatcher.history(conversation.id, AGENT).await.unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two", "three"]);
    assert!(history.iter().all(|m| m.read));
    assert_eq!(history[0].sender.display_name.as_deref(), Some("Tomás Tenant"));

    assert_eq!(ConversationRepository::total_unread(&pool, AGENT).await.unwrap(), 0);
    assert_eq!(dispatcher.mark_read(conversation.id, AGENT).await.unwrap(), 0);
}

#[tokio::test]
async fn test_mark_read_leaves_other_side_alone() {
    let pool = seeded_db().await;
    let dispatcher = dispatcher(&pool, Arc::new(ConnectionRegistry::new()), 500);
    let conversation = empty_conversation(&pool).await;

    dispatcher.send(conversation.id, TENANT, None, text("to agent")).await.unwrap();
    dispatcher.send(conversation.id, AGENT, None, text("to tenant")).await.unwrap();

    assert_eq!(dispatcher.mark_read(conversation.id, AGENT).await.unwrap(), 1);
    let stored = ConversationRepository::find_by_id(&pool, conversation.id).await.unwrap().unwrap();
    assert_eq!(stored.unread_for(&AGENT), Some(0));
    assert_eq!(stored.unread_for(&TENANT), Some(1));
}

#[tokio::test]
async fn test_failed_write_rolls_back_everything() {
    let pool = seeded_db().await;
    let dispatcher = dispatcher(&pool, Arc::new(ConnectionRegistry::new()), 500);
    let conversation = empty_conversation(&pool).await;

    sqlx::query(
        "CREATE TRIGGER fail_counter BEFORE UPDATE OF a_unread, b_unread ON conversations \
         BEGIN SELECT RAISE(ABORT, 'counter unavailable'); END",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = dispatcher.send(conversation.id, TENANT, None, text("lost")).await;
    assert!(matches!(result, Err(AppError::Persistence(_))));

    let count = MessageRepository::count_for_conversation(&pool, conversation.id).await.unwrap();
    assert_eq!(count, 0);
    let stored = ConversationRepository::find_by_id(&pool, conversation.id).await.unwrap().unwrap();
    assert!(stored.last_message.is_none());
}

#[tokio::test]
async fn test_outsider_cannot_send() {
    let pool = seeded_db().await;
    let dispatcher = dispatcher(&pool, Arc::new(ConnectionRegistry::new()), 500);
    let conversation = empty_conversation(&pool).await;

    let result = dispatcher.send(conversation.id, OUTSIDER, None, text("hi")).await;
    assert!(matches!(result, Err(AppError::Authorization(_))));
}

#[tokio::test]
async fn test_wrong_receiver_is_rejected() {
    let pool = seeded_db().await;
    let dispatcher = dispatcher(&pool, Arc::new(ConnectionRegistry::new()), 500);
    let conversation = empty_conversation(&pool).await;

    let result = dispatcher.send(conversation.id, TENANT, Some(OUTSIDER), text("hi")).await;
    assert!(matches!(result, Err(AppError::Authorization(_))));
    assert_eq!(MessageRepository::count_for_conversation(&pool, conversation.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_body_validation() {
    let pool = seeded_db().await;
    let dispatcher = dispatcher(&pool, Arc::new(ConnectionRegistry::new()), 10);
    let conversation = empty_conversation(&pool).await;

    let empty = dispatcher.send(conversation.id, TENANT, None, text("   ")).await;
    assert!(matches!(empty, Err(AppError::Validation(_))));

    let long = dispatcher.send(conversation.id, TENANT, None, text("eleven chars")).await;
    assert!(matches!(long, Err(AppError::Validation(_))));

    let attachment_only = dispatcher
        .send(
            conversation.id,
            TENANT,
            None,
            OutgoingMessage::new("", Some("uploads/plan.pdf".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(attachment_only.message.attachment.as_deref(), Some("uploads/plan.pdf"));

    let stored = ConversationRepository::find_by_id(&pool, conversation.id).await.unwrap().unwrap();
    assert_eq!(stored.last_message.map(|m| m.content), Some("[attachment]".to_string()));
}

#[tokio::test]
async fn test_unknown_conversation() {
    let pool = seeded_db().await;
    let dispatcher = dispatcher(&pool, Arc::new(ConnectionRegistry::new()), 500);

    let result = dispatcher.send(404, TENANT, None, text("hi")).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_then_send_is_not_found() {
    let pool = seeded_db().await;
    let dispatcher = dispatcher(&pool, Arc::new(ConnectionRegistry::new()), 500);
    let (conversation, _, _) = dispatcher
        .start_conversation(TENANT, AGENT, LISTING_ID, text("Hello"))
        .await
        .unwrap();

    let outsider = dispatcher.delete_conversation(conversation.id, OUTSIDER).await;
    assert!(matches!(outsider, Err(AppError::Authorization(_))));

    assert_eq!(dispatcher.delete_conversation(conversation.id, AGENT).await.unwrap(), 1);
    assert_eq!(MessageRepository::count_for_conversation(&pool, conversation.id).await.unwrap(), 0);

    let result = dispatcher.send(conversation.id, TENANT, None, text("still there?")).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(matches!(
        dispatcher.history(conversation.id, TENANT).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_concurrent_sends_keep_exact_count() {
    let (_dir, pool) = seeded_shared_db().await;
    let dispatcher = Arc::new(dispatcher(&pool, Arc::new(ConnectionRegistry::new()), 500));
    let conversation = empty_conversation(&pool).await;

    let sends = (0..40).map(|i| {
        let dispatcher = dispatcher.clone();
        let (from, to) = if i % 2 == 0 { (TENANT, AGENT) } else { (AGENT, TENANT) };
        tokio::spawn(async move {
            dispatcher
                .send(conversation.id, from, Some(to), text(&format!("message {i}")))
                .await
        })
    });
    for handle in sends.collect::<Vec<_>>() {
        handle.await.unwrap().unwrap();
    }

    let stored = ConversationRepository::find_by_id(&pool, conversation.id).await.unwrap().unwrap();
    assert_eq!(stored.unread_for(&AGENT), Some(20));
    assert_eq!(stored.unread_for(&TENANT), Some(20));
    assert_eq!(MessageRepository::count_for_conversation(&pool, conversation.id).await.unwrap(), 40);
}

/// Errors other than the conversation having gone away.
fn unexpected<T>(result: Result<T>) -> Option<AppError> {
    match result {
        Ok(_) | Err(AppError::NotFound(_)) => None,
        Err(e) => Some(e),
    }
}

#[tokio::test]
async fn test_delete_succeeds_under_concurrent_traffic() {
    let (_dir, pool) = seeded_shared_db().await;
    let dispatcher = Arc::new(dispatcher(&pool, Arc::new(ConnectionRegistry::new()), 500));

    for round in 0..20 {
        let (conversation, _, _) = dispatcher
            .start_conversation(TENANT, AGENT, LISTING_ID, text("Hello"))
            .await
            .unwrap();
        let id = conversation.id;

        let mut traffic = Vec::new();
        for (from, to) in [(TENANT, AGENT), (AGENT, TENANT)] {
            let d = dispatcher.clone();
            traffic.push(tokio::spawn(async move {
                ("send", unexpected(d.send(id, from, Some(to), text("Still there?")).await))
            }));
            let d = dispatcher.clone();
            traffic.push(tokio::spawn(async move { ("mark_read", unexpected(d.mark_read(id, from).await)) }));
            let d = dispatcher.clone();
            traffic.push(tokio::spawn(async move { ("history", unexpected(d.history(id, from).await)) }));
        }
        let d = dispatcher.clone();
        let delete = tokio::spawn(async move { d.delete_conversation(id, AGENT).await });

        let deleted = delete.await.unwrap();
        assert!(deleted.is_ok(), "round {round}: delete failed with {:?}", deleted);
        for task in traffic {
            let (op, err) = task.await.unwrap();
            assert!(err.is_none(), "round {round}: {op} failed with {:?}", err);
        }

        assert!(ConversationRepository::find_by_id(&pool, id).await.unwrap().is_none());
        assert_eq!(MessageRepository::count_for_conversation(&pool, id).await.unwrap(), 0);
    }
}
