use lsp_facilitator::config::DatabaseConfig;
use lsp_facilitator::db::{
    self, Attachment, DuckDbStore, NewImage, NewMessage, Role, SessionStore, StoreError, UserTurn,
};
use lsp_facilitator::phase::Phase;
use uuid::Uuid;

// Fresh in-memory database per test
fn get_test_store() -> DuckDbStore {
    let config = DatabaseConfig {
        path: ":memory:".to_string(),
    };
    DuckDbStore::new(db::get_connection(&config).unwrap())
}

#[test]
fn test_session_lifecycle() {
    let store = get_test_store();

    // 1. Create starts in phase 1
    let session = store.create_session("Equipo logística").unwrap();
    assert_eq!(session.name, "Equipo logística");
    assert_eq!(session.current_phase, Phase::Identification);

    // 2. Get
    let fetched = store.get_session(session.id).unwrap().unwrap();
    assert_eq!(fetched.id, session.id);

    // 3. Rename and phase update
    store.rename_session(session.id, "Visión 2030").unwrap();
    store.set_phase(session.id, Phase::ProtocolDevelopment).unwrap();
    let fetched = store.get_session(session.id).unwrap().unwrap();
    assert_eq!(fetched.name, "Visión 2030");
    assert_eq!(fetched.current_phase, Phase::ProtocolDevelopment);
    assert!(fetched.updated_at >= fetched.created_at);

    // 4. List
    let other = store.create_session("Otra").unwrap();
    let ids: Vec<Uuid> = store.list_sessions().unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&session.id) && ids.contains(&other.id));

    // 5. Delete
    store.delete_session(session.id).unwrap();
    assert!(store.get_session(session.id).unwrap().is_none());
    assert!(matches!(
        store.delete_session(session.id),
        Err(StoreError::SessionNotFound(id)) if id == session.id
    ));
}

#[test]
fn test_unknown_session_is_reported() {
    let store = get_test_store();
    let missing = Uuid::new_v4();

    assert!(matches!(store.rename_session(missing, "x"), Err(StoreError::SessionNotFound(_))));
    assert!(matches!(store.set_phase(missing, Phase::Evaluation), Err(StoreError::SessionNotFound(_))));
    assert!(matches!(
        store.append_message(missing, Role::User, "hola"),
        Err(StoreError::SessionNotFound(_))
    ));
    assert!(matches!(store.get_messages(missing), Err(StoreError::SessionNotFound(_))));
}

#[test]
fn test_messages_keep_insertion_order() {
    let store = get_test_store();
    let session = store.create_session("Orden").unwrap();

    let m0 = store.append_message(session.id, Role::User, "Hola").unwrap();
    let m1 = store.append_message(session.id, Role::Model, "¡Bienvenido!").unwrap();
    let m2 = store.append_message(session.id, Role::User, "Me llamo Ana").unwrap();

    assert_eq!((m0.order_index, m1.order_index, m2.order_index), (0, 1, 2));
    assert_eq!(m1.session_id, session.id);
    assert!(!m1.is_insight);

    let history = store.get_messages(session.id).unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["Hola", "¡Bienvenido!", "Me llamo Ana"]);
    assert_eq!(history[1].role, Role::Model);

    let recent = store.recent_messages(session.id, 2).unwrap();
    let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["¡Bienvenido!", "Me llamo Ana"]);
}

#[test]
fn test_order_index_is_per_session() {
    let store = get_test_store();
    let a = store.create_session("A").unwrap();
    let b = store.create_session("B").unwrap();

    store.append_message(a.id, Role::User, "a0").unwrap();
    store.append_message(a.id, Role::Model, "a1").unwrap();
    let b0 = store.append_message(b.id, Role::User, "b0").unwrap();

    assert_eq!(b0.order_index, 0);
}

fn user_turn(content: &str) -> UserTurn {
    UserTurn {
        content: content.to_string(),
        attachments: Vec::new(),
    }
}

#[test]
fn test_commit_turn_writes_both_messages_and_phase() {
    let store = get_test_store();
    let session = store.create_session("Turno").unwrap();

    let committed = store
        .commit_turn(
            session.id,
            &user_turn("Hola"),
            "Diseñemos tu protocolo.",
            Some(Phase::ProtocolDevelopment),
        )
        .unwrap();
    assert_eq!(committed.user_message.role, Role::User);
    assert_eq!(committed.user_message.order_index, 0);
    assert_eq!(committed.model_message.role, Role::Model);
    assert_eq!(committed.model_message.order_index, 1);
    assert_eq!(
        store.get_session(session.id).unwrap().unwrap().current_phase,
        Phase::ProtocolDevelopment
    );

    store.commit_turn(session.id, &user_turn("Vale"), "Sigamos.", None).unwrap();
    assert_eq!(
        store.get_session(session.id).unwrap().unwrap().current_phase,
        Phase::ProtocolDevelopment
    );
    assert_eq!(store.get_messages(session.id).unwrap().len(), 4);
}

#[test]
fn test_commit_turn_stores_attachments_on_user_message() {
    let store = get_test_store();
    let session = store.create_session("Fotos").unwrap();
    let turn = UserTurn {
        content: "Mira mi torre".to_string(),
        attachments: vec![Attachment {
            title: "torre".to_string(),
            mime_type: "image/png".to_string(),
            data: vec![7, 7, 7],
        }],
    };

    let committed = store.commit_turn(session.id, &turn, "¡Qué torre!", None).unwrap();

    let images = store.list_images(session.id).unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].message_id, Some(committed.user_message.id));
    assert_eq!(images[0].data, vec![7, 7, 7]);
}

#[test]
fn test_commit_turn_rejects_unknown_session() {
    let store = get_test_store();
    let missing = Uuid::new_v4();

    let result = store.commit_turn(missing, &user_turn("hola"), "texto", Some(Phase::ProtocolDevelopment));
    assert!(matches!(result, Err(StoreError::SessionNotFound(_))));
}

#[test]
fn test_failed_commit_leaves_nothing_behind() {
    let pool = db::get_connection(&DatabaseConfig {
        path: ":memory:".to_string(),
    })
    .unwrap();
    let store = DuckDbStore::new(pool.clone());
    let session = store.create_session("Rollback").unwrap();

    // Images are written after the user message, so the turn fails midway.
    pool.lock().unwrap().execute_batch("DROP TABLE images").unwrap();
    let turn = UserTurn {
        content: "Hola".to_string(),
        attachments: vec![Attachment {
            title: "x".to_string(),
            mime_type: "image/png".to_string(),
            data: vec![1],
        }],
    };
    let result = store.commit_turn(session.id, &turn, "respuesta", Some(Phase::ProtocolDevelopment));

    assert!(matches!(result, Err(StoreError::Db(_))));
    assert!(store.get_messages(session.id).unwrap().is_empty());
    assert_eq!(
        store.get_session(session.id).unwrap().unwrap().current_phase,
        Phase::Identification
    );
}

#[test]
fn test_import_session_is_atomic() {
    let store = get_test_store();
    let messages = vec![
        NewMessage {
            role: Role::User,
            content: "Hola".to_string(),
            is_insight: false,
        },
        NewMessage {
            role: Role::Model,
            content: "Mi modelo habla de confianza".to_string(),
            is_insight: true,
        },
    ];

    let session = store
        .import_session("Importada", Some(Phase::Implementation), &messages)
        .unwrap();
    assert_eq!(session.current_phase, Phase::Implementation);
    let stored = store.get_messages(session.id).unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored[1].is_insight);
    assert_eq!(store.list_insights(session.id).unwrap().len(), 1);
}

#[test]
fn test_failed_import_creates_no_session() {
    let pool = db::get_connection(&DatabaseConfig {
        path: ":memory:".to_string(),
    })
    .unwrap();
    let store = DuckDbStore::new(pool.clone());
    pool.lock().unwrap().execute_batch("DROP TABLE messages").unwrap();

    let messages = vec![NewMessage {
        role: Role::User,
        content: "Hola".to_string(),
        is_insight: false,
    }];
    assert!(store.import_session("Rota", None, &messages).is_err());
    assert!(store.list_sessions().unwrap().is_empty());
}

#[test]
fn test_listing_is_not_truncated() {
    let store = get_test_store();
    for i in 0..1001 {
        store.create_session(&format!("Sesión {i}")).unwrap();
    }
    assert_eq!(store.list_sessions().unwrap().len(), 1001);
}

#[test]
fn test_insight_toggle() {
    let store = get_test_store();
    let session = store.create_session("Insights").unwrap();
    store.append_message(session.id, Role::User, "Mi modelo es un puente").unwrap();
    let model = store.append_message(session.id, Role::Model, "¿Qué conecta ese puente?").unwrap();

    let flagged = store.toggle_insight(model.id).unwrap();
    assert!(flagged.is_insight);

    let insights = store.list_insights(session.id).unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].id, model.id);

    let unflagged = store.toggle_insight(model.id).unwrap();
    assert!(!unflagged.is_insight);
    assert!(store.list_insights(session.id).unwrap().is_empty());

    assert!(matches!(
        store.toggle_insight(Uuid::new_v4()),
        Err(StoreError::MessageNotFound(_))
    ));
}

#[test]
fn test_images_attach_and_cascade() {
    let store = get_test_store();
    let session = store.create_session("Galería").unwrap();
    let message = store.append_message(session.id, Role::User, "Aquí está mi torre").unwrap();

    let torre = store
        .add_image(NewImage {
            session_id: session.id,
            message_id: Some(message.id),
            title: "Torre".to_string(),
            mime_type: "image/png".to_string(),
            data: vec![0x89, 0x50, 0x4e, 0x47],
        })
        .unwrap();
    let puente = store
        .add_image(NewImage {
            session_id: session.id,
            message_id: None,
            title: "Puente".to_string(),
            mime_type: "image/jpeg".to_string(),
            data: vec![0xff, 0xd8],
        })
        .unwrap();

    let fetched = store.get_image(torre.id).unwrap().unwrap();
    assert_eq!(fetched.message_id, Some(message.id));
    assert_eq!(fetched.data, vec![0x89, 0x50, 0x4e, 0x47]);

    let titles: Vec<String> = store
        .list_images(session.id)
        .unwrap()
        .into_iter()
        .map(|i| i.title)
        .collect();
    assert_eq!(titles.len(), 2);
    assert!(titles.contains(&"Puente".to_string()));

    store.delete_image(puente.id).unwrap();
    assert!(matches!(store.delete_image(puente.id), Err(StoreError::ImageNotFound(_))));

    // Deleting the session removes what is left
    store.delete_session(session.id).unwrap();
    assert!(store.get_image(torre.id).unwrap().is_none());
}

#[test]
fn test_image_must_reference_message_of_same_session() {
    let store = get_test_store();
    let a = store.create_session("A").unwrap();
    let b = store.create_session("B").unwrap();
    let foreign = store.append_message(b.id, Role::User, "hola").unwrap();

    let result = store.add_image(NewImage {
        session_id: a.id,
        message_id: Some(foreign.id),
        title: "x".to_string(),
        mime_type: "image/png".to_string(),
        data: vec![1],
    });
    assert!(matches!(result, Err(StoreError::MessageNotFound(_))));
}

#[test]
fn test_delete_session_cascades_messages() {
    let store = get_test_store();
    let session = store.create_session("Borrar").unwrap();
    let msg = store.append_message(session.id, Role::User, "Hola").unwrap();
    store.toggle_insight(msg.id).unwrap();

    store.delete_session(session.id).unwrap();

    // The message is gone with its session
    assert!(matches!(store.toggle_insight(msg.id), Err(StoreError::MessageNotFound(_))));
}
