//! Dialog orchestrator: one classified utterance in, one reply out

use accueil_core::config::DialogConfig;
use accueil_core::session::{Role, SessionGuard, SessionStore};
use accueil_core::Result;
use accueil_providers::ResponseBackend;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::context::ContextBuilder;
use crate::fallback::FallbackPolicy;
use crate::turn::{TurnActions, TurnOutcome, TurnReply, TurnRequest};

/// Coordinates the session store, the backend and the fallback table.
///
/// A turn holds its session's lock from the user append to the assistant
/// append, backend call included, so turns on one session are serialized
/// while turns on different sessions run concurrently.
pub struct DialogOrchestrator {
    sessions: Arc<SessionStore>,
    backend: Arc<dyn ResponseBackend>,
    context: ContextBuilder,
    fallback: FallbackPolicy,
    rng: Mutex<StdRng>,
}

impl DialogOrchestrator {
    pub fn new(
        sessions: Arc<SessionStore>,
        backend: Arc<dyn ResponseBackend>,
        config: &DialogConfig,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            sessions,
            backend,
            context: ContextBuilder::from_config(config),
            fallback: FallbackPolicy::from_config(config),
            rng: Mutex::new(rng),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn backend(&self) -> &Arc<dyn ResponseBackend> {
        &self.backend
    }

    /// Run one turn.
    ///
    /// Fails only with `Error::UnknownSession` under the strict policy, before
    /// anything is recorded. Backend and template failures are answered with
    /// fallback text instead of being returned.
    pub async fn handle(&self, request: TurnRequest) -> Result<TurnReply> {
        let span = info_span!(
            "turn",
            session_id = %request.session_id,
            intent = %request.intent
        );
        self.run_turn(request).instrument(span).await
    }

    async fn run_turn(&self, request: TurnRequest) -> Result<TurnReply> {
        let mut session = self.sessions.lock(&request.session_id).await?;
        debug!(
            "Handling turn (confidence {:.2}, {} entities)",
            request.confidence,
            request.entities.len()
        );

        if !request.raw_text.trim().is_empty() {
            session.append(Role::User, request.raw_text.as_str());
        }

        let history = self.context.build_history(session.history());
        let generated = self
            .backend
            .generate(self.context.system_prompt(), &history)
            .await;

        let reply = match generated {
            Ok(text) if !text.trim().is_empty() => TurnReply {
                text: text.trim().to_string(),
                actions: TurnActions::derive(&request.intent, &request.entities),
                outcome: TurnOutcome::Generated,
            },
            Ok(_) => {
                warn!("Backend returned an empty reply, using fallback");
                self.fallback_reply(&request)
            }
            Err(e) => {
                warn!("Backend call failed: {}, using fallback", e);
                self.fallback_reply(&request)
            }
        };

        self.record(&mut session, &request.intent, &reply);
        info!(outcome = ?reply.outcome, "Turn complete");
        Ok(reply)
    }

    fn fallback_reply(&self, request: &TurnRequest) -> TurnReply {
        let rendered = {
            let mut rng = self.rng.lock();
            self.fallback
                .render(&request.intent, &request.entities, &mut *rng)
        };

        let (text, outcome) = match rendered {
            Some(Ok(text)) if !text.trim().is_empty() => (text, TurnOutcome::Fallback),
            Some(Ok(_)) => (self.apology(), TurnOutcome::Apology),
            Some(Err(e)) => {
                warn!("Fallback template for '{}' failed: {}", request.intent, e);
                (self.apology(), TurnOutcome::Apology)
            }
            None => {
                debug!("No fallback rule for intent '{}'", request.intent);
                (self.apology(), TurnOutcome::Apology)
            }
        };

        TurnReply {
            text,
            actions: TurnActions::default(),
            outcome,
        }
    }

    fn apology(&self) -> String {
        self.fallback.generic_apology().to_string()
    }

    fn record(&self, session: &mut SessionGuard, intent: &str, reply: &TurnReply) {
        session.append(Role::Assistant, reply.text.as_str());
        session.record_turn(intent, reply.outcome.fell_back());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accueil_core::config::{SessionPolicy, DEFAULT_GENERIC_APOLOGY};
    use accueil_core::session::Message;
    use accueil_core::{EntityValue, Error};
    use accueil_providers::{BackendError, BackendResult};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Backend replaying queued results, then echoing the last user message
    struct ScriptedBackend {
        script: Mutex<VecDeque<BackendResult<String>>>,
        calls: Mutex<Vec<Vec<Message>>>,
        delay: Duration,
    }

    impl ScriptedBackend {
        fn new(script: Vec<BackendResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            })
        }

        fn echo_with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
                delay,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl ResponseBackend for ScriptedBackend {
        async fn generate(&self, _system_prompt: &str, history: &[Message]) -> BackendResult<String> {
            self.calls.lock().push(history.to_vec());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.script.lock().pop_front();
            match next {
                Some(result) => result,
                None => {
                    let last = history
                        .iter()
                        .rev()
                        .find(|m| m.role == Role::User)
                        .map(|m| m.content.clone())
                        .unwrap_or_default();
                    Ok(format!("re: {}", last))
                }
            }
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn store(policy: SessionPolicy) -> Arc<SessionStore> {
        Arc::new(SessionStore::with_limits(
            20,
            Duration::from_secs(3600),
            policy,
        ))
    }

    fn orchestrator(backend: Arc<ScriptedBackend>) -> DialogOrchestrator {
        let config = DialogConfig {
            rng_seed: Some(7),
            ..DialogConfig::default()
        };
        DialogOrchestrator::new(store(SessionPolicy::Permissive), backend, &config)
    }

    fn timeout() -> BackendResult<String> {
        Err(BackendError::Timeout(30_000))
    }

    #[tokio::test]
    async fn test_generated_reply_has_no_actions() {
        let backend = ScriptedBackend::new(vec![Ok("Bonjour".to_string())]);
        let orch = orchestrator(backend.clone());

        let reply = orch
            .handle(TurnRequest::new("s1", "greeting").with_text("Salut"))
            .await
            .unwrap();

        assert_eq!(reply.text, "Bonjour");
        assert!(reply.actions.is_empty());
        assert_eq!(reply.outcome, TurnOutcome::Generated);

        let session = orch.sessions().peek("s1").await.unwrap();
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[0].role, Role::User);
        assert_eq!(session.history[1].content, "Bonjour");
        assert_eq!(session.last_intent.as_deref(), Some("greeting"));
        assert_eq!(session.fallback_count, 0);
    }

    #[tokio::test]
    async fn test_backend_sees_history_including_new_message() {
        let backend = ScriptedBackend::new(vec![Ok("un".to_string()), Ok("deux".to_string())]);
        let orch = orchestrator(backend.clone());

        orch.handle(TurnRequest::new("s1", "other").with_text("premier"))
            .await
            .unwrap();
        orch.handle(TurnRequest::new("s1", "other").with_text("second"))
            .await
            .unwrap();

        let calls = backend.calls.lock();
        let contents: Vec<&str> = calls[1].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["premier", "un", "second"]);
    }

    #[tokio::test]
    async fn test_greeting_fallback_on_backend_failure() {
        let backend = ScriptedBackend::new(vec![timeout()]);
        let orch = orchestrator(backend);

        let reply = orch
            .handle(TurnRequest::new("s1", "greeting").with_text("Bonjour"))
            .await
            .unwrap();

        let variants = DialogConfig::default().fallback["greeting"].clone();
        assert!(variants.contains(&reply.text), "{}", reply.text);
        assert_eq!(reply.outcome, TurnOutcome::Fallback);
        assert!(reply.actions.is_empty());

        let session = orch.sessions().peek("s1").await.unwrap();
        assert_eq!(session.history[1].content, reply.text);
        assert_eq!(session.fallback_count, 1);
    }

    #[tokio::test]
    async fn test_every_failure_kind_falls_back() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::HttpStatus {
                status: 500,
                body: "boom".to_string(),
            }),
            Err(BackendError::MalformedResponse("no choices".to_string())),
            Err(BackendError::Transport("refused".to_string())),
            Ok("   \n".to_string()),
        ]);
        let orch = orchestrator(backend);

        for _ in 0..4 {
            let reply = orch
                .handle(TurnRequest::new("s1", "ask_hours").with_text("Horaires ?"))
                .await
                .unwrap();
            assert_eq!(reply.outcome, TurnOutcome::Fallback);
            assert!(reply.text.contains("8h à 22h"));
        }
        assert_eq!(orch.sessions().peek("s1").await.unwrap().fallback_count, 4);
    }

    #[tokio::test]
    async fn test_unknown_intent_gets_generic_apology() {
        let orch = orchestrator(ScriptedBackend::new(vec![timeout()]));

        let reply = orch
            .handle(TurnRequest::new("s1", "ask_price").with_text("Combien ?"))
            .await
            .unwrap();

        assert_eq!(reply.text, DEFAULT_GENERIC_APOLOGY);
        assert_eq!(reply.outcome, TurnOutcome::Apology);
        let session = orch.sessions().peek("s1").await.unwrap();
        assert_eq!(session.history.last().unwrap().content, DEFAULT_GENERIC_APOLOGY);
    }

    #[tokio::test]
    async fn test_booking_action_on_success() {
        let orch = orchestrator(ScriptedBackend::new(vec![Ok("C'est noté.".to_string())]));

        let reply = orch
            .handle(
                TurnRequest::new("s1", "book_activity")
                    .with_text("Je veux faire du yoga à 18h")
                    .with_confidence(0.93)
                    .with_entity("activity", "yoga")
                    .with_entity("time", "18:00"),
            )
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&reply.actions).unwrap(),
            serde_json::json!({"booking": {"activity": "yoga", "time": "18:00"}})
        );
    }

    #[tokio::test]
    async fn test_no_booking_without_time() {
        let orch = orchestrator(ScriptedBackend::new(vec![Ok("Quel créneau ?".to_string())]));

        let reply = orch
            .handle(
                TurnRequest::new("s1", "book_activity")
                    .with_text("Je veux faire du yoga")
                    .with_entity("activity", "yoga"),
            )
            .await
            .unwrap();

        assert!(reply.actions.is_empty());
        assert_eq!(serde_json::to_string(&reply.actions).unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_booking_fallback_renders_entities() {
        let orch = orchestrator(ScriptedBackend::new(vec![timeout(), timeout()]));

        let reply = orch
            .handle(
                TurnRequest::new("s1", "book_activity")
                    .with_entity("activity", "tennis")
                    .with_entity("time", EntityValue::List(vec!["10:00".to_string()])),
            )
            .await
            .unwrap();
        assert_eq!(
            reply.text,
            "Je note votre demande de réservation pour tennis à 10:00."
        );
        // Fallback turns never carry actions
        assert!(reply.actions.is_empty());

        // Missing placeholder falls through to the apology
        let reply = orch
            .handle(TurnRequest::new("s2", "book_activity").with_entity("activity", "tennis"))
            .await
            .unwrap();
        assert_eq!(reply.outcome, TurnOutcome::Apology);
        assert_eq!(reply.text, DEFAULT_GENERIC_APOLOGY);
    }

    #[tokio::test]
    async fn test_empty_text_is_not_recorded() {
        let orch = orchestrator(ScriptedBackend::new(vec![Ok("Bonjour".to_string())]));

        orch.handle(TurnRequest::new("s1", "greeting")).await.unwrap();

        let session = orch.sessions().peek("s1").await.unwrap();
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.history[0].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_unknown_session() {
        let backend = ScriptedBackend::new(vec![]);
        let orch = DialogOrchestrator::new(
            store(SessionPolicy::Strict),
            backend.clone(),
            &DialogConfig::default(),
        );

        let err = orch
            .handle(TurnRequest::new("ghost", "greeting").with_text("Bonjour"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnknownSession(id) if id == "ghost"));
        assert!(!orch.sessions().contains("ghost"));
        assert_eq!(backend.call_count(), 0);

        let id = orch.sessions().create();
        let reply = orch
            .handle(TurnRequest::new(id, "greeting").with_text("Bonjour"))
            .await
            .unwrap();
        assert_eq!(reply.text, "re: Bonjour");
    }

    #[tokio::test]
    async fn test_sequential_turns_keep_pairing() {
        let orch = orchestrator(ScriptedBackend::echo_with_delay(Duration::ZERO));

        for text in ["un", "deux", "trois"] {
            orch.handle(TurnRequest::new("s1", "other").with_text(text))
                .await
                .unwrap();
        }

        let history = orch.sessions().peek("s1").await.unwrap().history;
        let flat: Vec<(Role, &str)> = history.iter().map(|m| (m.role, m.content.as_str())).collect();
        assert_eq!(
            flat,
            vec![
                (Role::User, "un"),
                (Role::Assistant, "re: un"),
                (Role::User, "deux"),
                (Role::Assistant, "re: deux"),
                (Role::User, "trois"),
                (Role::Assistant, "re: trois"),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_turns_on_distinct_sessions_do_not_interleave() {
        let orch = Arc::new(orchestrator(ScriptedBackend::echo_with_delay(
            Duration::from_millis(20),
        )));

        let tasks: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|id| {
                let orch = Arc::clone(&orch);
                tokio::spawn(async move {
                    for n in 0..3 {
                        orch.handle(
                            TurnRequest::new(id, "other").with_text(format!("{}-{}", id, n)),
                        )
                        .await
                        .unwrap();
                    }
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        for id in ["a", "b", "c", "d"] {
            let history = orch.sessions().peek(id).await.unwrap().history;
            assert_eq!(history.len(), 6);
            for (n, pair) in history.chunks(2).enumerate() {
                assert_eq!(pair[0].content, format!("{}-{}", id, n));
                assert_eq!(pair[1].content, format!("re: {}-{}", id, n));
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_turns_on_one_session_are_serialized() {
        let orch = Arc::new(orchestrator(ScriptedBackend::echo_with_delay(
            Duration::from_millis(10),
        )));

        let tasks: Vec<_> = (0..5)
            .map(|n| {
                let orch = Arc::clone(&orch);
                tokio::spawn(async move {
                    orch.handle(TurnRequest::new("shared", "other").with_text(format!("m{}", n)))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        let history = orch.sessions().peek("shared").await.unwrap().history;
        assert_eq!(history.len(), 10);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].content, format!("re: {}", pair[0].content));
        }
    }
}
