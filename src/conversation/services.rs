use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::dto::{Completion, ComposerDraft, ConversationMessage, MessageStatus};
use super::log::ConversationLog;
use crate::error::{MealError, Result};
use crate::meals::{editor, AnalyzeRequest, MealType, PendingMeal};
use crate::nutrition::FoodItem;
use crate::state::AppState;

/// Client-local wall clock, falling back to UTC when the offset is unknown.
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// One conversation bound to a backend. The log lock is never held while a
/// request is in flight, so unrelated messages stay editable meanwhile.
#[derive(Clone)]
pub struct Session {
    state: AppState,
    log: Arc<Mutex<ConversationLog>>,
}

impl Session {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            log: Arc::new(Mutex::new(ConversationLog::with_greeting())),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn messages(&self) -> Vec<ConversationMessage> {
        self.log.lock().await.messages().to_vec()
    }

    pub async fn message(&self, id: Uuid) -> Option<ConversationMessage> {
        self.log.lock().await.get(id).cloned()
    }

    pub async fn latest_open(&self) -> Option<ConversationMessage> {
        self.log.lock().await.latest_open().cloned()
    }

    pub async fn review_text(&self, id: Uuid) -> Option<String> {
        self.log.lock().await.review_text(id)
    }

    pub async fn submit_utterance(&self, text: &str, hint: Option<MealType>) -> Result<Uuid> {
        self.log.lock().await.submit_utterance(text, hint)
    }

    pub async fn set_hint(&self, id: Uuid, hint: Option<MealType>) -> Result<()> {
        self.log.lock().await.set_hint(id, hint)
    }

    fn analyze_request(&self, text: String, hint: Option<MealType>) -> AnalyzeRequest {
        AnalyzeRequest {
            text,
            client_local_time: local_now(),
            meal_type_hint: hint,
            persona: Some(self.state.config.api.persona.clone()),
        }
    }

    #[instrument(skip(self))]
    pub async fn request_analysis(&self, id: Uuid) -> Result<Completion> {
        let ticket = self.log.lock().await.begin_analysis(id)?;
        let req = self.analyze_request(ticket.text.clone(), ticket.meal_type_hint);
        let outcome = self.state.gateway.analyze(&req).await;
        self.log
            .lock()
            .await
            .finish_analysis(ticket, outcome, req.client_local_time)
    }

    /// Send-and-analyze in one step.
    pub async fn submit_and_analyze(
        &self,
        text: &str,
        hint: Option<MealType>,
    ) -> Result<(Uuid, Completion)> {
        let id = self.submit_utterance(text, hint).await?;
        let done = self.request_analysis(id).await?;
        Ok((id, done))
    }

    pub async fn edit<F>(&self, id: Uuid, edit: F) -> Result<PendingMeal>
    where
        F: FnOnce(&PendingMeal) -> Result<PendingMeal>,
    {
        self.log.lock().await.edit_pending(id, edit).cloned()
    }

    pub async fn add_item(&self, id: Uuid, item: FoodItem) -> Result<PendingMeal> {
        self.edit(id, |m| editor::add_item(m, item)).await
    }

    pub async fn accept_suggestion(&self, id: Uuid, index: usize) -> Result<PendingMeal> {
        self.edit(id, |m| editor::accept_suggestion(m, index)).await
    }

    pub async fn remove_item(&self, id: Uuid, index: usize) -> Result<PendingMeal> {
        self.edit(id, |m| editor::remove_item(m, index)).await
    }

    pub async fn change_meal_type(&self, id: Uuid, meal_type: MealType) -> Result<PendingMeal> {
        self.edit(id, |m| Ok(editor::change_meal_type(m, meal_type))).await
    }

    pub async fn change_eaten_at(&self, id: Uuid, at: OffsetDateTime) -> Result<PendingMeal> {
        self.edit(id, |m| Ok(editor::change_eaten_at(m, at))).await
    }

    /// Manual entry. Without a positive explicit kcal the analyzer is asked to
    /// estimate `name`; if that fails the item goes in with zero calories.
    #[instrument(skip(self))]
    pub async fn add_manual_item(
        &self,
        id: Uuid,
        name: &str,
        explicit_kcal: Option<f64>,
    ) -> Result<Completion> {
        editor::validate_manual_input(name, explicit_kcal)?;
        let ticket = self.log.lock().await.begin_lookup(id)?;

        let estimate = if editor::needs_estimate(explicit_kcal) {
            let req = self.analyze_request(name.trim().to_string(), Some(ticket.meal_type));
            match self.state.gateway.analyze(&req).await {
                Ok(res) => res.food_items.into_iter().next(),
                Err(e) => {
                    warn!(error = %e, name, "estimate lookup failed; adding with 0 kcal");
                    None
                }
            }
        } else {
            None
        };

        self.log.lock().await.finish_lookup(ticket, |m| {
            editor::add_manual_item(m, name, explicit_kcal, estimate.as_ref())
        })
    }

    #[instrument(skip(self))]
    pub async fn confirm_and_save(&self, id: Uuid) -> Result<Completion> {
        let ticket = self.log.lock().await.begin_save(id)?;
        let outcome = self.state.gateway.create(&ticket.meal).await;
        self.log.lock().await.finish_save(ticket, outcome)
    }

    pub async fn cancel(&self, id: Uuid) -> Result<()> {
        self.log.lock().await.cancel(id)
    }

    pub async fn retry(&self, id: Uuid) -> Result<ComposerDraft> {
        self.log.lock().await.retry(id)
    }
}

#[cfg(test)]
mod session_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::{Date, OffsetDateTime};
    use tokio::sync::Notify;

    use super::*;
    use crate::gateway::MealGateway;
    use crate::meals::{AnalysisResult, CreatedMeal, MealRecord};
    use crate::nutrition::MacroTotals;

    /// Analyzer that answers per text and can hold requests until released.
    #[derive(Default)]
    struct ScriptedGateway {
        gate: Option<Arc<Notify>>,
        fail_create: bool,
        rate_limit: bool,
        analyze_calls: AtomicUsize,
        create_calls: AtomicUsize,
    }

    fn result_for(text: &str) -> AnalysisResult {
        match text {
            "바나나" => AnalysisResult {
                meal_type: MealType::Snack,
                eaten_at: None,
                total_kcal: 105.0,
                macros: None,
                message: String::new(),
                food_items: vec![
                    FoodItem::new("banana", "1 medium", 105.0).with_macros(27.0, 1.3, 0.4)
                ],
                suggestions: None,
                confidence: None,
            },
            _ => AnalysisResult {
                meal_type: MealType::Breakfast,
                eaten_at: None,
                total_kcal: 220.0,
                macros: None,
                message: "좋아요".into(),
                food_items: vec![
                    FoodItem::new("에그 스크램블", "1 plate", 220.0).with_macros(2.0, 14.0, 16.0)
                ],
                suggestions: Some(vec![
                    FoodItem::new("토스트", "1 slice", 150.0).with_macros(28.0, 4.0, 2.0)
                ]),
                confidence: None,
            },
        }
    }

    #[async_trait]
    impl MealGateway for ScriptedGateway {
        async fn analyze(&self, req: &AnalyzeRequest) -> Result<AnalysisResult> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.rate_limit {
                return Err(MealError::RateLimited { cooldown_secs: 60 });
            }
            Ok(result_for(&req.text))
        }
        async fn create(&self, _meal: &PendingMeal) -> Result<CreatedMeal> {
            let n = self.create_calls.fetch_add(1, Ordering::SeqCst) as i64;
            if self.fail_create {
                return Err(MealError::PersistFailed("status 500".into()));
            }
            Ok(CreatedMeal { id: 100 + n, created_at: String::new(), message: "ok".into() })
        }
        async fn list_recent(&self, _limit: u32) -> Result<Vec<MealRecord>> {
            Ok(vec![])
        }
        async fn list_range(&self, _s: Date, _e: Date) -> Result<Vec<MealRecord>> {
            Ok(vec![])
        }
        async fn delete(&self, _id: i64) -> Result<()> {
            Ok(())
        }
        async fn duplicate(&self, id: i64, _at: OffsetDateTime) -> Result<MealRecord> {
            Err(MealError::RequestFailed(format!("meal {} not found", id)))
        }
    }

    fn session_with(gw: ScriptedGateway) -> (Session, Arc<ScriptedGateway>) {
        let gw = Arc::new(gw);
        let base = AppState::fake();
        let state = AppState::from_parts(base.config, gw.clone() as Arc<dyn MealGateway>);
        (Session::new(state), gw)
    }

    async fn pending(session: &Session, id: Uuid) -> PendingMeal {
        session.message(id).await.and_then(|m| m.pending_meal).unwrap()
    }

    #[tokio::test]
    async fn deferred_flow_analyze_edit_and_save() {
        let (session, gw) = session_with(ScriptedGateway::default());
        let id = session.submit_utterance("에그 스크램블", None).await.unwrap();
        assert_eq!(gw.analyze_calls.load(Ordering::SeqCst), 0);

        session.request_analysis(id).await.unwrap();
        let meal = session.accept_suggestion(id, 0).await.unwrap();
        assert_eq!(meal.total_kcal(), 370.0);
        assert_eq!(
            meal.macros(),
            Some(MacroTotals { carbs: 30.0, protein: 18.0, fat: 18.0 })
        );
        assert!(meal.suggestions().is_empty());

        assert_eq!(session.confirm_and_save(id).await.unwrap(), Completion::Applied);
        let msg = session.message(id).await.unwrap();
        assert_eq!(msg.status, MessageStatus::Saved);
        assert_eq!(msg.saved_meal_id, Some(100));
    }

    #[tokio::test]
    async fn rate_limit_reverts_and_keeps_text() {
        let (session, _gw) = session_with(ScriptedGateway { rate_limit: true, ..Default::default() });
        let err = session.submit_and_analyze("라면", None).await.unwrap_err();
        assert!(err.is_rate_limited());
        let open = session.latest_open().await.unwrap();
        assert_eq!(open.status, MessageStatus::Local);
        assert_eq!(open.content, "라면");
        let last = session.messages().await.pop().unwrap();
        assert_eq!(last.status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn failed_save_can_be_retried_without_reanalysis() {
        let (session, gw) = session_with(ScriptedGateway { fail_create: true, ..Default::default() });
        let (id, _) = session.submit_and_analyze("에그 스크램블", None).await.unwrap();
        let err = session.confirm_and_save(id).await.unwrap_err();
        assert!(matches!(err, MealError::PersistFailed(_)));
        assert_eq!(session.message(id).await.unwrap().status, MessageStatus::Analyzed);

        let _ = session.confirm_and_save(id).await;
        assert_eq!(gw.create_calls.load(Ordering::SeqCst), 2);
        assert_eq!(gw.analyze_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_while_in_flight_drops_late_response() {
        let gate = Arc::new(Notify::new());
        let (session, _gw) = session_with(ScriptedGateway {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let id = session.submit_utterance("에그 스크램블", None).await.unwrap();

        let bg = session.clone();
        let in_flight = tokio::spawn(async move { bg.request_analysis(id).await });
        while session.message(id).await.map(|m| m.status) != Some(MessageStatus::Analyzing) {
            tokio::task::yield_now().await;
        }

        let draft = session.retry(id).await.unwrap();
        let again = session.submit_utterance(&draft.text, None).await.unwrap();

        gate.notify_one();
        assert_eq!(in_flight.await.unwrap().unwrap(), Completion::Discarded);
        assert!(session.message(id).await.is_none());
        let msg = session.message(again).await.unwrap();
        assert_eq!(msg.status, MessageStatus::Local);
        assert!(msg.pending_meal.is_none());
    }

    #[tokio::test]
    async fn other_messages_stay_editable_during_analysis() {
        let gate = Arc::new(Notify::new());
        let (session, _gw) = session_with(ScriptedGateway::default());
        let (first, _) = session.submit_and_analyze("에그 스크램블", None).await.unwrap();

        // swap in a gated gateway for the second request
        let gated = Arc::new(ScriptedGateway { gate: Some(gate.clone()), ..Default::default() });
        let slow = Session {
            state: AppState::from_parts(
                session.state.config.clone(),
                gated as Arc<dyn MealGateway>,
            ),
            log: session.log.clone(),
        };
        let second = slow.submit_utterance("라면", None).await.unwrap();
        let bg = slow.clone();
        let in_flight = tokio::spawn(async move { bg.request_analysis(second).await });
        while slow.message(second).await.map(|m| m.status) != Some(MessageStatus::Analyzing) {
            tokio::task::yield_now().await;
        }

        let meal = session.remove_item(first, 0).await.unwrap();
        assert_eq!(meal.total_kcal(), 0.0);
        assert!(session.request_analysis(second).await.is_err());

        gate.notify_one();
        assert_eq!(in_flight.await.unwrap().unwrap(), Completion::Applied);
    }

    #[tokio::test]
    async fn manual_item_uses_estimate_or_explicit_kcal() {
        let (session, gw) = session_with(ScriptedGateway::default());
        let (id, _) = session.submit_and_analyze("에그 스크램블", None).await.unwrap();

        assert_eq!(session.add_manual_item(id, "바나나", None).await.unwrap(), Completion::Applied);
        let meal = pending(&session, id).await;
        let added = meal.food_items().last().unwrap();
        assert_eq!(added.name, "바나나");
        assert_eq!(added.qty, "1 medium");
        assert_eq!(meal.total_kcal(), 325.0);
        assert_eq!(gw.analyze_calls.load(Ordering::SeqCst), 2);

        session.add_manual_item(id, "커피", Some(5.0)).await.unwrap();
        let meal = pending(&session, id).await;
        assert_eq!(meal.total_kcal(), 330.0);
        assert_eq!(gw.analyze_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn manual_item_falls_back_when_lookup_fails() {
        let (session, _gw) = session_with(ScriptedGateway::default());
        let (id, _) = session.submit_and_analyze("에그 스크램블", None).await.unwrap();

        let limited = Session {
            state: AppState::from_parts(
                session.state.config.clone(),
                Arc::new(ScriptedGateway { rate_limit: true, ..Default::default() })
                    as Arc<dyn MealGateway>,
            ),
            log: session.log.clone(),
        };
        limited.add_manual_item(id, "물", None).await.unwrap();
        let meal = pending(&session, id).await;
        let added = meal.food_items().last().unwrap();
        assert_eq!(added.kcal, 0.0);
        assert_eq!(added.qty, editor::DEFAULT_QTY);
        assert_eq!(meal.total_kcal(), 220.0);
    }

    #[tokio::test]
    async fn manual_item_requires_analyzed_message() {
        let (session, gw) = session_with(ScriptedGateway::default());
        let id = session.submit_utterance("라면", None).await.unwrap();
        assert!(session.add_manual_item(id, "김치", None).await.is_err());
        assert_eq!(gw.analyze_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn manual_item_rejects_negative_kcal_without_lookup() {
        let (session, gw) = session_with(ScriptedGateway::default());
        let (id, _) = session.submit_and_analyze("에그 스크램블", None).await.unwrap();
        let err = session.add_manual_item(id, "커피", Some(-5.0)).await.unwrap_err();
        assert!(matches!(err, MealError::ValidationFailed(_)));
        assert!(session.add_manual_item(id, "  ", None).await.is_err());
        assert_eq!(gw.analyze_calls.load(Ordering::SeqCst), 1);
        assert_eq!(pending(&session, id).await.food_items().len(), 1);
    }

    #[tokio::test]
    async fn late_estimate_is_dropped_after_cancel_and_reanalysis() {
        let gate = Arc::new(Notify::new());
        let (session, _gw) = session_with(ScriptedGateway::default());
        let (id, _) = session.submit_and_analyze("에그 스크램블", None).await.unwrap();

        let gated = Arc::new(ScriptedGateway { gate: Some(gate.clone()), ..Default::default() });
        let slow = Session {
            state: AppState::from_parts(
                session.state.config.clone(),
                gated.clone() as Arc<dyn MealGateway>,
            ),
            log: session.log.clone(),
        };
        let bg = slow.clone();
        let lookup = tokio::spawn(async move { bg.add_manual_item(id, "바나나", None).await });
        while gated.analyze_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        session.cancel(id).await.unwrap();
        assert_eq!(session.request_analysis(id).await.unwrap(), Completion::Applied);

        gate.notify_one();
        assert_eq!(lookup.await.unwrap().unwrap(), Completion::Discarded);
        let meal = pending(&session, id).await;
        assert_eq!(meal.food_items().len(), 1);
        assert_eq!(meal.total_kcal(), 220.0);
    }

    #[tokio::test]
    async fn edits_during_lookup_keep_the_estimate() {
        let gate = Arc::new(Notify::new());
        let (session, _gw) = session_with(ScriptedGateway::default());
        let (id, _) = session.submit_and_analyze("에그 스크램블", None).await.unwrap();

        let gated = Arc::new(ScriptedGateway { gate: Some(gate.clone()), ..Default::default() });
        let slow = Session {
            state: AppState::from_parts(
                session.state.config.clone(),
                gated.clone() as Arc<dyn MealGateway>,
            ),
            log: session.log.clone(),
        };
        let bg = slow.clone();
        let lookup = tokio::spawn(async move { bg.add_manual_item(id, "바나나", None).await });
        while gated.analyze_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        session.change_meal_type(id, MealType::Lunch).await.unwrap();
        gate.notify_one();
        assert_eq!(lookup.await.unwrap().unwrap(), Completion::Applied);
        let meal = pending(&session, id).await;
        assert_eq!(meal.meal_type(), MealType::Lunch);
        assert_eq!(meal.total_kcal(), 325.0);
    }

    #[tokio::test]
    async fn fake_state_round_trip_with_memory_backend() {
        let session = Session::new(AppState::fake());
        let (id, _) = session.submit_and_analyze("김밥, 라면", Some(MealType::Lunch)).await.unwrap();
        let meal = session.message(id).await.unwrap().pending_meal.unwrap();
        assert_eq!(meal.meal_type(), MealType::Lunch);
        assert_eq!(meal.total_kcal(), 200.0);
        session.confirm_and_save(id).await.unwrap();
        let saved = session.state().gateway.list_recent(10).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].raw_text, "김밥, 라면");
    }
}
