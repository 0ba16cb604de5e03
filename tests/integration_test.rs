use pollroom::protocol::{ClientMessage, ServerMessage};
use pollroom::registry::ConnectionHandle;
use pollroom::state::{AppState, RoomEvent};
use pollroom::storage::MemoryStore;
use pollroom::types::*;
use pollroom::ws::handlers::handle_message;
use pollroom::ws::ConnCtx;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// One simulated connection: context, outbound handle, and the direct
/// channel a real socket task would drain.
struct TestClient {
    ctx: ConnCtx,
    tx: ConnectionHandle,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl TestClient {
    fn new(role: Role) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            ctx: ConnCtx::new(role),
            tx,
            rx,
        }
    }

    async fn send(&mut self, state: &Arc<AppState>, msg: ClientMessage) -> Option<ServerMessage> {
        handle_message(msg, &mut self.ctx, &self.tx, state).await
    }

    fn direct(&mut self) -> ServerMessage {
        self.rx.try_recv().expect("expected a direct message")
    }

    fn no_direct(&mut self) {
        assert!(self.rx.try_recv().is_err(), "unexpected direct message");
    }
}

fn new_state() -> Arc<AppState> {
    AppState::new(Arc::new(MemoryStore::new()))
}

fn next_room(rx: &mut broadcast::Receiver<RoomEvent>) -> RoomEvent {
    rx.try_recv().expect("expected a room event")
}

fn question_spec(time_limit_secs: u32) -> QuestionSpec {
    QuestionSpec {
        kind: QuestionKind::SingleChoice,
        prompt: "Which option?".to_string(),
        options: vec!["A".to_string(), "B".to_string()],
        correct_answer: Some("A".to_string()),
        time_limit_secs,
    }
}

/// End-to-end flow for a complete classroom session
#[tokio::test]
async fn test_full_classroom_flow() {
    let state = new_state();
    let mut room = state.subscribe_room();

    let mut teacher = TestClient::new(Role::Teacher);
    let mut alice = TestClient::new(Role::Student);
    let mut bob = TestClient::new(Role::Student);

    // 1. Teacher claims the session
    let created = teacher
        .send(
            &state,
            ClientMessage::CreateSession {
                teacher_id: "t1".to_string(),
                teacher_name: "Ms. Frizzle".to_string(),
            },
        )
        .await;
    match created {
        Some(ServerMessage::SessionCreated { session, .. }) => {
            assert_eq!(session.id, SESSION_KEY);
            assert!(session.active);
        }
        other => panic!("Expected SessionCreated, got {:?}", other),
    }

    // 2. Students join; each is seeded directly, everyone else gets a notice
    alice
        .send(
            &state,
            ClientMessage::JoinSession {
                student_id: "s1".to_string(),
                student_name: "Alice".to_string(),
            },
        )
        .await;
    match alice.direct() {
        ServerMessage::SessionJoined { session, .. } => {
            assert_eq!(session.participants.len(), 1);
            assert!(session.active_question.is_none());
        }
        other => panic!("Expected SessionJoined, got {:?}", other),
    }
    assert!(matches!(alice.direct(), ServerMessage::ChatHistory { messages } if messages.is_empty()));
    alice.no_direct();

    let joined = next_room(&mut room);
    assert_eq!(joined.except.as_deref(), Some("s1"));
    assert!(matches!(joined.message, ServerMessage::ParticipantJoined { .. }));

    bob.send(
        &state,
        ClientMessage::JoinSession {
            student_id: "s2".to_string(),
            student_name: "Bob".to_string(),
        },
    )
    .await;
    bob.direct();
    bob.direct();
    next_room(&mut room);

    // 3. Teacher starts a question; the room sees the redacted view
    let sent = teacher
        .send(
            &state,
            ClientMessage::StartQuestion {
                question: question_spec(30),
            },
        )
        .await;
    let question_id = match sent {
        Some(ServerMessage::QuestionSent { question, .. }) => {
            assert_eq!(question.correct_answer.as_deref(), Some("A"));
            question.id
        }
        other => panic!("Expected QuestionSent, got {:?}", other),
    };

    let started = next_room(&mut room);
    assert_eq!(started.except.as_deref(), Some("t1"));
    match &started.message {
        ServerMessage::QuestionStarted { question, .. } => {
            assert_eq!(question.id, question_id);
            let json = serde_json::to_string(question).unwrap();
            assert!(!json.contains("correct_answer"));
        }
        other => panic!("Expected QuestionStarted, got {:?}", other),
    }

    // 4. A second question while one is active is refused
    let refused = teacher
        .send(
            &state,
            ClientMessage::StartQuestion {
                question: question_spec(30),
            },
        )
        .await;
    match refused {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "CONFLICT"),
        other => panic!("Expected CONFLICT error, got {:?}", other),
    }

    // 5. Alice answers lowercase; correctness is case-insensitive
    let ack = alice
        .send(
            &state,
            ClientMessage::SubmitAnswer {
                question_id: question_id.clone(),
                answer: AnswerValue::Text("a".to_string()),
            },
        )
        .await;
    match ack {
        Some(ServerMessage::AnswerAck { is_correct, .. }) => {
            assert_eq!(is_correct, Some(true));
        }
        other => panic!("Expected AnswerAck, got {:?}", other),
    }

    // The teacher's connection gets the live tally notice
    match teacher.direct() {
        ServerMessage::AnswerReceived {
            participant_name, ..
        } => assert_eq!(participant_name, "Alice"),
        other => panic!("Expected AnswerReceived, got {:?}", other),
    }

    // 6. A resubmission is rejected and the original answer survives
    let dup = alice
        .send(
            &state,
            ClientMessage::SubmitAnswer {
                question_id: question_id.clone(),
                answer: AnswerValue::Text("B".to_string()),
            },
        )
        .await;
    match dup {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "CONFLICT"),
        other => panic!("Expected CONFLICT error, got {:?}", other),
    }
    teacher.no_direct();

    // 7. Manual end broadcasts results and the end notice to everyone
    let ended = teacher
        .send(
            &state,
            ClientMessage::EndQuestion {
                question_id: question_id.clone(),
            },
        )
        .await;
    assert!(ended.is_none(), "first end answers through the broadcast");

    match next_room(&mut room).message {
        ServerMessage::QuestionResults { results } => {
            assert_eq!(results.total_answers, 1);
            assert_eq!(results.summary.get("a"), Some(&1));
            assert_eq!(results.answers[0].value, AnswerValue::Text("a".to_string()));
        }
        other => panic!("Expected QuestionResults, got {:?}", other),
    }
    match next_room(&mut room).message {
        ServerMessage::QuestionEnded { reason, .. } => assert_eq!(reason, EndReason::Manual),
        other => panic!("Expected QuestionEnded, got {:?}", other),
    }

    // 8. A duplicate end request gets the same results back, no error
    let again = teacher
        .send(
            &state,
            ClientMessage::EndQuestion {
                question_id: question_id.clone(),
            },
        )
        .await;
    match again {
        Some(ServerMessage::QuestionResults { results }) => {
            assert_eq!(results.total_answers, 1);
        }
        other => panic!("Expected QuestionResults, got {:?}", other),
    }

    // 9. History now contains the ended question
    let history = teacher.send(&state, ClientMessage::GetHistory).await;
    match history {
        Some(ServerMessage::History { results }) => {
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].question.id, question_id);
        }
        other => panic!("Expected History, got {:?}", other),
    }
}

#[tokio::test]
async fn test_teacher_only_actions_are_refused_for_students() {
    let state = new_state();
    let mut teacher = TestClient::new(Role::Teacher);
    let mut alice = TestClient::new(Role::Student);

    teacher
        .send(
            &state,
            ClientMessage::CreateSession {
                teacher_id: "t1".to_string(),
                teacher_name: "Teacher".to_string(),
            },
        )
        .await;
    alice
        .send(
            &state,
            ClientMessage::JoinSession {
                student_id: "s1".to_string(),
                student_name: "Alice".to_string(),
            },
        )
        .await;

    for msg in [
        ClientMessage::StartQuestion {
            question: question_spec(30),
        },
        ClientMessage::EndQuestion {
            question_id: "whatever".to_string(),
        },
        ClientMessage::GetResults {
            question_id: "whatever".to_string(),
        },
        ClientMessage::GetRoster,
        ClientMessage::KickStudent {
            student_id: "s2".to_string(),
        },
    ] {
        match alice.send(&state, msg).await {
            Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "UNAUTHORIZED"),
            other => panic!("Expected UNAUTHORIZED error, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_kick_notifies_evicts_and_allows_rejoin() {
    let state = new_state();
    let mut room = state.subscribe_room();

    let mut teacher = TestClient::new(Role::Teacher);
    let mut alice = TestClient::new(Role::Student);
    let mut bob = TestClient::new(Role::Student);

    teacher
        .send(
            &state,
            ClientMessage::CreateSession {
                teacher_id: "t1".to_string(),
                teacher_name: "Teacher".to_string(),
            },
        )
        .await;
    alice
        .send(
            &state,
            ClientMessage::JoinSession {
                student_id: "s1".to_string(),
                student_name: "Alice".to_string(),
            },
        )
        .await;
    bob.send(
        &state,
        ClientMessage::JoinSession {
            student_id: "s2".to_string(),
            student_name: "Bob".to_string(),
        },
    )
    .await;
    while room.try_recv().is_ok() {}
    alice.direct();
    alice.direct();

    let reply = teacher
        .send(
            &state,
            ClientMessage::KickStudent {
                student_id: "s1".to_string(),
            },
        )
        .await;
    assert!(reply.is_none());

    // Alice gets the eviction notice on her own channel
    match alice.direct() {
        ServerMessage::Kicked { reason } => assert!(reason.contains("removed")),
        other => panic!("Expected Kicked, got {:?}", other),
    }

    // Everyone else sees the roster change
    let event = next_room(&mut room);
    assert_eq!(event.except.as_deref(), Some("s1"));
    match event.message {
        ServerMessage::ParticipantKicked { participant_id, .. } => {
            assert_eq!(participant_id, "s1");
        }
        other => panic!("Expected ParticipantKicked, got {:?}", other),
    }

    // Registry binding is gone, roster holds only Bob
    assert!(state.registry.resolve("s1").await.is_none());
    match teacher.send(&state, ClientMessage::GetRoster).await {
        Some(ServerMessage::Roster { participants }) => {
            assert_eq!(participants.len(), 1);
            assert_eq!(participants[0].id, "s2");
        }
        other => panic!("Expected Roster, got {:?}", other),
    }

    // The id is not blacklisted; rejoining creates a fresh roster entry
    let mut alice_again = TestClient::new(Role::Student);
    alice_again
        .send(
            &state,
            ClientMessage::JoinSession {
                student_id: "s1".to_string(),
                student_name: "Alice".to_string(),
            },
        )
        .await;
    match alice_again.direct() {
        ServerMessage::SessionJoined { session, .. } => {
            assert_eq!(session.participants.len(), 2);
        }
        other => panic!("Expected SessionJoined, got {:?}", other),
    }
}

#[tokio::test]
async fn test_late_joiner_is_seeded_with_the_running_question() {
    let state = new_state();
    let mut teacher = TestClient::new(Role::Teacher);

    teacher
        .send(
            &state,
            ClientMessage::CreateSession {
                teacher_id: "t1".to_string(),
                teacher_name: "Teacher".to_string(),
            },
        )
        .await;
    teacher
        .send(
            &state,
            ClientMessage::StartQuestion {
                question: question_spec(60),
            },
        )
        .await;

    let mut cara = TestClient::new(Role::Student);
    cara.send(
        &state,
        ClientMessage::JoinSession {
            student_id: "s3".to_string(),
            student_name: "Cara".to_string(),
        },
    )
    .await;

    // Snapshot first, then chat history, then the in-progress question
    let snapshot = cara.direct();
    match &snapshot {
        ServerMessage::SessionJoined { session, .. } => {
            assert!(session.active_question.is_some());
        }
        other => panic!("Expected SessionJoined, got {:?}", other),
    }
    // No reference answer anywhere in the student-facing snapshot
    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(!json.contains("correct_answer"));

    assert!(matches!(cara.direct(), ServerMessage::ChatHistory { .. }));
    match cara.direct() {
        ServerMessage::QuestionStarted { question, .. } => {
            assert_eq!(question.prompt, "Which option?");
        }
        other => panic!("Expected QuestionStarted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_question_times_out_and_rejects_late_answers() {
    let state = new_state();
    let mut room = state.subscribe_room();

    let mut teacher = TestClient::new(Role::Teacher);
    let mut alice = TestClient::new(Role::Student);

    teacher
        .send(
            &state,
            ClientMessage::CreateSession {
                teacher_id: "t1".to_string(),
                teacher_name: "Teacher".to_string(),
            },
        )
        .await;
    alice
        .send(
            &state,
            ClientMessage::JoinSession {
                student_id: "s1".to_string(),
                student_name: "Alice".to_string(),
            },
        )
        .await;

    let question_id = match teacher
        .send(
            &state,
            ClientMessage::StartQuestion {
                question: question_spec(1),
            },
        )
        .await
    {
        Some(ServerMessage::QuestionSent { question, .. }) => question.id,
        other => panic!("Expected QuestionSent, got {:?}", other),
    };

    // An answer inside the window lands
    alice
        .send(
            &state,
            ClientMessage::SubmitAnswer {
                question_id: question_id.clone(),
                answer: AnswerValue::Text("B".to_string()),
            },
        )
        .await;

    // Let the timer fire on its own
    tokio::time::sleep(std::time::Duration::from_millis(1400)).await;

    let mut saw_timeout_end = false;
    let mut saw_results = false;
    while let Ok(event) = room.try_recv() {
        match event.message {
            ServerMessage::QuestionEnded { reason, .. } => {
                assert_eq!(reason, EndReason::Timeout);
                saw_timeout_end = true;
            }
            ServerMessage::QuestionResults { results } => {
                assert_eq!(results.total_answers, 1);
                saw_results = true;
            }
            _ => {}
        }
    }
    assert!(saw_timeout_end, "timer should have ended the question");
    assert!(saw_results, "results should accompany the end notice");

    // A late answer is rejected now that the question is inactive
    let mut bob = TestClient::new(Role::Student);
    bob.send(
        &state,
        ClientMessage::JoinSession {
            student_id: "s2".to_string(),
            student_name: "Bob".to_string(),
        },
    )
    .await;
    match bob
        .send(
            &state,
            ClientMessage::SubmitAnswer {
                question_id,
                answer: AnswerValue::Text("A".to_string()),
            },
        )
        .await
    {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "NOT_FOUND"),
        other => panic!("Expected NOT_FOUND error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_chat_and_typing_routing() {
    let state = new_state();
    let mut room = state.subscribe_room();

    let mut teacher = TestClient::new(Role::Teacher);
    let mut alice = TestClient::new(Role::Student);

    teacher
        .send(
            &state,
            ClientMessage::CreateSession {
                teacher_id: "t1".to_string(),
                teacher_name: "Teacher".to_string(),
            },
        )
        .await;
    alice
        .send(
            &state,
            ClientMessage::JoinSession {
                student_id: "s1".to_string(),
                student_name: "Alice".to_string(),
            },
        )
        .await;
    while room.try_recv().is_ok() {}

    // A chat message goes to the whole room, sender included
    assert!(alice
        .send(
            &state,
            ClientMessage::ChatSend {
                body: "hello everyone".to_string(),
            },
        )
        .await
        .is_none());
    let event = next_room(&mut room);
    assert!(event.except.is_none());
    match event.message {
        ServerMessage::ChatNew { message } => {
            assert_eq!(message.body, "hello everyone");
            assert_eq!(message.sender_role, Role::Student);
        }
        other => panic!("Expected ChatNew, got {:?}", other),
    }

    // Typing notices skip the sender and are never persisted
    assert!(alice.send(&state, ClientMessage::ChatTyping).await.is_none());
    let event = next_room(&mut room);
    assert_eq!(event.except.as_deref(), Some("s1"));
    assert!(matches!(event.message, ServerMessage::Typing { .. }));

    // A second joiner receives only the real message as history
    let mut bob = TestClient::new(Role::Student);
    bob.send(
        &state,
        ClientMessage::JoinSession {
            student_id: "s2".to_string(),
            student_name: "Bob".to_string(),
        },
    )
    .await;
    bob.direct();
    match bob.direct() {
        ServerMessage::ChatHistory { messages } => {
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].body, "hello everyone");
        }
        other => panic!("Expected ChatHistory, got {:?}", other),
    }

    // An unjoined connection cannot chat
    let mut stranger = TestClient::new(Role::Student);
    match stranger
        .send(
            &state,
            ClientMessage::ChatSend {
                body: "let me in".to_string(),
            },
        )
        .await
    {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "UNAUTHORIZED"),
        other => panic!("Expected UNAUTHORIZED error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_join_before_session_exists_is_not_found() {
    let state = new_state();
    let mut alice = TestClient::new(Role::Student);

    match alice
        .send(
            &state,
            ClientMessage::JoinSession {
                student_id: "s1".to_string(),
                student_name: "Alice".to_string(),
            },
        )
        .await
    {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "NOT_FOUND"),
        other => panic!("Expected NOT_FOUND error, got {:?}", other),
    }
}
