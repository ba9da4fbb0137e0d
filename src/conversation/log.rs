use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dto::{Completion, ComposerDraft, ConversationMessage, MessageStatus, Role};
use super::format::{format_analysis, format_saved};
use crate::error::{MealError, Result};
use crate::meals::{AnalysisResult, CreatedMeal, MealType, PendingMeal};

pub const GREETING: &str = "Tell me what you ate, in as much detail as you like.\n\n\
Example: \"For breakfast I had a chicken breast salad and an apple.\"";
pub const CANCELLED: &str = "Cancelled. Tell me again whenever you are ready.";

/// Handed out when an analysis is dispatched; the answer is applied only if
/// the message still carries the same token.
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    pub message_id: Uuid,
    pub token: u64,
    pub text: String,
    pub meal_type_hint: Option<MealType>,
}

#[derive(Debug, Clone)]
pub struct SaveTicket {
    pub message_id: Uuid,
    pub token: u64,
    pub meal: PendingMeal,
}

/// Taken before the estimate lookup for a hand-added item. The item lands
/// only if the pending meal was not replaced while the lookup ran.
#[derive(Debug, Clone)]
pub struct LookupTicket {
    pub message_id: Uuid,
    pub token: u64,
    pub meal_type: MealType,
}

/// Ordered message history plus the per-message state machine.
#[derive(Debug, Default)]
pub struct ConversationLog {
    messages: Vec<ConversationMessage>,
    next_token: u64,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_greeting() -> Self {
        let mut log = Self::new();
        log.push_assistant(GREETING, MessageStatus::Local);
        log
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn get(&self, id: Uuid) -> Option<&ConversationMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn pending_meal(&self, id: Uuid) -> Option<&PendingMeal> {
        self.get(id).and_then(|m| m.pending_meal.as_ref())
    }

    /// Most recent user message that still has work left (not saved).
    pub fn latest_open(&self) -> Option<&ConversationMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User && m.status != MessageStatus::Saved)
    }

    fn get_mut(&mut self, id: Uuid) -> Result<&mut ConversationMessage> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MealError::validation(format!("message {} not found", id)))
    }

    fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn push_assistant(&mut self, content: impl Into<String>, status: MessageStatus) -> Uuid {
        let msg = ConversationMessage::new(Role::Assistant, content, status);
        let id = msg.id;
        self.messages.push(msg);
        id
    }

    /// Appends a `local` user message. Nothing is sent yet.
    pub fn submit_utterance(&mut self, text: &str, hint: Option<MealType>) -> Result<Uuid> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MealError::validation("message is empty"));
        }
        let mut msg = ConversationMessage::new(Role::User, text, MessageStatus::Local);
        msg.meal_type_hint = hint;
        let id = msg.id;
        self.messages.push(msg);
        debug!(%id, "utterance submitted");
        Ok(id)
    }

    pub fn set_hint(&mut self, id: Uuid, hint: Option<MealType>) -> Result<()> {
        let msg = self.get_mut(id)?;
        if msg.status != MessageStatus::Local {
            return Err(MealError::validation("hint can only change before analysis"));
        }
        msg.meal_type_hint = hint;
        Ok(())
    }

    /// `local -> analyzing`.
    pub fn begin_analysis(&mut self, id: Uuid) -> Result<AnalysisTicket> {
        let token = self.issue_token();
        let msg = self.get_mut(id)?;
        if msg.role != Role::User {
            return Err(MealError::validation("only user messages can be analyzed"));
        }
        match msg.status {
            MessageStatus::Local => {}
            MessageStatus::Analyzing => {
                return Err(MealError::validation("analysis already in progress"))
            }
            _ => return Err(MealError::validation("message was already analyzed")),
        }
        msg.status = MessageStatus::Analyzing;
        msg.token = token;
        Ok(AnalysisTicket {
            message_id: id,
            token,
            text: msg.content.clone(),
            meal_type_hint: msg.meal_type_hint,
        })
    }

    fn is_current(&self, id: Uuid, token: u64) -> bool {
        self.get(id).map(|m| m.token == token).unwrap_or(false)
    }

    /// Applies an analysis answer. Errors are recorded in the log (status back
    /// to `local` plus a `failed` assistant note) and then returned.
    pub fn finish_analysis(
        &mut self,
        ticket: AnalysisTicket,
        outcome: Result<AnalysisResult>,
        now: OffsetDateTime,
    ) -> Result<Completion> {
        if !self.is_current(ticket.message_id, ticket.token) {
            warn!(id = %ticket.message_id, "dropping stale analysis response");
            return Ok(Completion::Discarded);
        }
        let msg = self.get_mut(ticket.message_id)?;
        match outcome {
            Ok(result) => {
                msg.pending_meal = Some(PendingMeal::from_analysis(ticket.text, result, now));
                msg.status = MessageStatus::Analyzed;
                info!(id = %ticket.message_id, "meal analyzed");
                Ok(Completion::Applied)
            }
            Err(e) => {
                msg.status = MessageStatus::Local;
                warn!(id = %ticket.message_id, error = %e, "analysis failed");
                self.push_assistant(e.user_message(), MessageStatus::Failed);
                Err(e)
            }
        }
    }

    /// Runs an editor function against the latest pending meal of `id`.
    pub fn edit_pending<F>(&mut self, id: Uuid, edit: F) -> Result<&PendingMeal>
    where
        F: FnOnce(&PendingMeal) -> Result<PendingMeal>,
    {
        let msg = self.get_mut(id)?;
        if msg.status != MessageStatus::Analyzed {
            return Err(MealError::validation("no analyzed meal to edit"));
        }
        if msg.saving {
            return Err(MealError::validation("meal is being saved"));
        }
        let current = msg
            .pending_meal
            .as_ref()
            .ok_or_else(|| MealError::validation("no analyzed meal to edit"))?;
        let next = edit(current)?;
        Ok(msg.pending_meal.insert(next))
    }

    /// Edits do not reissue the token, so only cancel, re-analysis, save or
    /// retry make the ticket stale.
    pub fn begin_lookup(&self, id: Uuid) -> Result<LookupTicket> {
        let msg = self
            .get(id)
            .ok_or_else(|| MealError::validation(format!("message {} not found", id)))?;
        if msg.status != MessageStatus::Analyzed || msg.saving {
            return Err(MealError::validation("no analyzed meal to edit"));
        }
        let meal = msg
            .pending_meal
            .as_ref()
            .ok_or_else(|| MealError::validation("no analyzed meal to edit"))?;
        Ok(LookupTicket {
            message_id: id,
            token: msg.token,
            meal_type: meal.meal_type(),
        })
    }

    pub fn finish_lookup<F>(&mut self, ticket: LookupTicket, edit: F) -> Result<Completion>
    where
        F: FnOnce(&PendingMeal) -> Result<PendingMeal>,
    {
        if !self.is_current(ticket.message_id, ticket.token) {
            warn!(id = %ticket.message_id, "dropping stale item estimate");
            return Ok(Completion::Discarded);
        }
        self.edit_pending(ticket.message_id, edit)?;
        Ok(Completion::Applied)
    }

    /// Marks the meal as being saved and hands out a snapshot to send.
    pub fn begin_save(&mut self, id: Uuid) -> Result<SaveTicket> {
        let token = self.issue_token();
        let msg = self.get_mut(id)?;
        if msg.status != MessageStatus::Analyzed {
            return Err(MealError::validation("only analyzed meals can be saved"));
        }
        if msg.saving {
            return Err(MealError::validation("meal is already being saved"));
        }
        let meal = msg
            .pending_meal
            .clone()
            .ok_or_else(|| MealError::validation("only analyzed meals can be saved"))?;
        msg.saving = true;
        msg.token = token;
        Ok(SaveTicket {
            message_id: id,
            token,
            meal,
        })
    }

    /// On failure the message stays `analyzed` so saving can be retried.
    pub fn finish_save(
        &mut self,
        ticket: SaveTicket,
        outcome: Result<CreatedMeal>,
    ) -> Result<Completion> {
        if !self.is_current(ticket.message_id, ticket.token) {
            warn!(id = %ticket.message_id, "dropping stale save response");
            return Ok(Completion::Discarded);
        }
        let msg = self.get_mut(ticket.message_id)?;
        msg.saving = false;
        match outcome {
            Ok(created) => {
                msg.status = MessageStatus::Saved;
                msg.saved_meal_id = Some(created.id);
                info!(id = %ticket.message_id, meal_id = created.id, "meal saved");
                self.push_assistant(format_saved(&ticket.meal, &created), MessageStatus::Saved);
                Ok(Completion::Applied)
            }
            Err(e) => {
                warn!(id = %ticket.message_id, error = %e, "save failed");
                Err(e)
            }
        }
    }

    /// Drops the pending meal; the utterance stays and can be analyzed again.
    pub fn cancel(&mut self, id: Uuid) -> Result<()> {
        let token = self.issue_token();
        let msg = self.get_mut(id)?;
        if msg.status != MessageStatus::Analyzed || msg.saving {
            return Err(MealError::validation("nothing to cancel"));
        }
        msg.pending_meal = None;
        msg.status = MessageStatus::Local;
        msg.token = token;
        self.push_assistant(CANCELLED, MessageStatus::Local);
        Ok(())
    }

    /// Removes the message and gives its text back for editing. Any request
    /// still in flight for it will be discarded on arrival.
    pub fn retry(&mut self, id: Uuid) -> Result<ComposerDraft> {
        let pos = self
            .messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| MealError::validation(format!("message {} not found", id)))?;
        let msg = &self.messages[pos];
        if msg.role != Role::User {
            return Err(MealError::validation("only user messages can be retried"));
        }
        if msg.status == MessageStatus::Saved {
            return Err(MealError::validation("meal is already saved"));
        }
        let msg = self.messages.remove(pos);
        debug!(%id, "message returned to composer");
        Ok(ComposerDraft {
            text: msg.content,
            meal_type_hint: msg.meal_type_hint,
        })
    }

    /// Text for the assistant bubble that accompanies an analyzed message.
    pub fn review_text(&self, id: Uuid) -> Option<String> {
        self.pending_meal(id).map(format_analysis)
    }
}

#[cfg(test)]
mod log_tests {
    use super::*;
    use crate::meals::editor;
    use crate::nutrition::{FoodItem, MacroTotals};
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-10-19 08:30 UTC);

    fn scramble_result() -> AnalysisResult {
        AnalysisResult {
            meal_type: MealType::Breakfast,
            eaten_at: None,
            total_kcal: 220.0,
            macros: Some(MacroTotals { carbs: 2.0, protein: 14.0, fat: 16.0 }),
            message: "좋아요".into(),
            food_items: vec![
                FoodItem::new("에그 스크램블", "1 plate", 220.0).with_macros(2.0, 14.0, 16.0)
            ],
            suggestions: Some(vec![
                FoodItem::new("토스트", "1 slice", 150.0).with_macros(28.0, 4.0, 2.0)
            ]),
            confidence: None,
        }
    }

    fn created(id: i64) -> CreatedMeal {
        CreatedMeal { id, created_at: String::new(), message: "ok".into() }
    }

    fn analyzed(log: &mut ConversationLog) -> Uuid {
        let id = log.submit_utterance("에그 스크램블", None).unwrap();
        let ticket = log.begin_analysis(id).unwrap();
        log.finish_analysis(ticket, Ok(scramble_result()), NOW).unwrap();
        id
    }

    #[test]
    fn submit_keeps_message_local() {
        let mut log = ConversationLog::with_greeting();
        let id = log.submit_utterance("  라면  ", Some(MealType::Dinner)).unwrap();
        let msg = log.get(id).unwrap();
        assert_eq!(msg.status, MessageStatus::Local);
        assert_eq!(msg.content, "라면");
        assert_eq!(msg.meal_type_hint, Some(MealType::Dinner));
        assert_eq!(log.messages().len(), 2);
        assert!(log.submit_utterance("   ", None).is_err());
    }

    #[test]
    fn analysis_success_attaches_pending_meal() {
        let mut log = ConversationLog::new();
        let id = log.submit_utterance("에그 스크램블", Some(MealType::Snack)).unwrap();
        let ticket = log.begin_analysis(id).unwrap();
        assert_eq!(ticket.meal_type_hint, Some(MealType::Snack));
        assert_eq!(log.get(id).unwrap().status, MessageStatus::Analyzing);
        assert!(log.begin_analysis(id).is_err());

        let done = log.finish_analysis(ticket, Ok(scramble_result()), NOW).unwrap();
        assert_eq!(done, Completion::Applied);
        let msg = log.get(id).unwrap();
        assert_eq!(msg.status, MessageStatus::Analyzed);
        let meal = msg.pending_meal.as_ref().unwrap();
        assert_eq!(meal.raw_text(), "에그 스크램블");
        assert_eq!(meal.eaten_at(), NOW);
        assert!(log.review_text(id).unwrap().contains("220kcal"));
    }

    #[test]
    fn analysis_failure_reverts_and_appends_failed_note() {
        let mut log = ConversationLog::new();
        let id = log.submit_utterance("라면", None).unwrap();
        let ticket = log.begin_analysis(id).unwrap();
        let err = log
            .finish_analysis(ticket, Err(MealError::RateLimited { cooldown_secs: 60 }), NOW)
            .unwrap_err();
        assert!(err.is_rate_limited());

        assert_eq!(log.get(id).unwrap().status, MessageStatus::Local);
        assert_eq!(log.get(id).unwrap().content, "라면");
        let note = log.messages().last().unwrap();
        assert_eq!(note.role, Role::Assistant);
        assert_eq!(note.status, MessageStatus::Failed);
        assert!(note.content.contains("60 seconds"));

        // can be sent again without losing the text
        let again = log.begin_analysis(id).unwrap();
        assert_eq!(again.text, "라면");
    }

    #[test]
    fn stale_analysis_after_retry_is_dropped() {
        let mut log = ConversationLog::new();
        let id = log.submit_utterance("라면", Some(MealType::Lunch)).unwrap();
        let ticket = log.begin_analysis(id).unwrap();

        let draft = log.retry(id).unwrap();
        assert_eq!(draft.text, "라면");
        assert_eq!(draft.meal_type_hint, Some(MealType::Lunch));
        assert!(log.get(id).is_none());

        let other = log.submit_utterance(&draft.text, draft.meal_type_hint).unwrap();
        let done = log.finish_analysis(ticket, Ok(scramble_result()), NOW).unwrap();
        assert_eq!(done, Completion::Discarded);
        assert_eq!(log.get(other).unwrap().status, MessageStatus::Local);
        assert!(log.get(other).unwrap().pending_meal.is_none());
    }

    #[test]
    fn stale_failure_does_not_append_note() {
        let mut log = ConversationLog::new();
        let id = log.submit_utterance("라면", None).unwrap();
        let ticket = log.begin_analysis(id).unwrap();
        log.retry(id).unwrap();
        let done = log
            .finish_analysis(ticket, Err(MealError::AnalysisFailed("x".into())), NOW)
            .unwrap();
        assert_eq!(done, Completion::Discarded);
        assert!(log.messages().is_empty());
    }

    #[test]
    fn edits_go_through_editor_on_latest_state() {
        let mut log = ConversationLog::new();
        let id = analyzed(&mut log);
        log.edit_pending(id, |m| editor::accept_suggestion(m, 0)).unwrap();
        let meal = log.edit_pending(id, |m| editor::remove_item(m, 0)).unwrap();
        assert_eq!(meal.total_kcal(), 150.0);
        assert!(log.edit_pending(id, |m| editor::remove_item(m, 5)).is_err());
        assert_eq!(log.pending_meal(id).unwrap().food_items().len(), 1);
    }

    #[test]
    fn save_success_marks_saved_and_acknowledges() {
        let mut log = ConversationLog::new();
        let id = analyzed(&mut log);
        let ticket = log.begin_save(id).unwrap();
        assert!(log.get(id).unwrap().is_busy());
        assert!(log.begin_save(id).is_err());
        assert!(log.edit_pending(id, |m| editor::remove_item(m, 0)).is_err());

        log.finish_save(ticket, Ok(created(42))).unwrap();
        let msg = log.get(id).unwrap();
        assert_eq!(msg.status, MessageStatus::Saved);
        assert_eq!(msg.saved_meal_id, Some(42));
        assert!(!msg.saving);
        assert!(log.messages().last().unwrap().content.contains("#42"));
        assert!(log.retry(id).is_err());
    }

    #[test]
    fn save_failure_stays_analyzed_for_retry() {
        let mut log = ConversationLog::new();
        let id = analyzed(&mut log);
        let count = log.messages().len();
        let ticket = log.begin_save(id).unwrap();
        let err = log
            .finish_save(ticket, Err(MealError::PersistFailed("500".into())))
            .unwrap_err();
        assert!(matches!(err, MealError::PersistFailed(_)));

        let msg = log.get(id).unwrap();
        assert_eq!(msg.status, MessageStatus::Analyzed);
        assert!(!msg.saving);
        assert!(msg.pending_meal.is_some());
        assert_eq!(log.messages().len(), count);
        assert!(log.begin_save(id).is_ok());
    }

    #[test]
    fn save_requires_analysis() {
        let mut log = ConversationLog::new();
        let id = log.submit_utterance("라면", None).unwrap();
        assert!(matches!(log.begin_save(id), Err(MealError::ValidationFailed(_))));
    }

    #[test]
    fn cancel_discards_pending_meal() {
        let mut log = ConversationLog::new();
        let id = analyzed(&mut log);
        log.cancel(id).unwrap();
        let msg = log.get(id).unwrap();
        assert_eq!(msg.status, MessageStatus::Local);
        assert!(msg.pending_meal.is_none());
        assert_eq!(log.messages().last().unwrap().content, CANCELLED);
        assert!(log.cancel(id).is_err());
    }

    #[test]
    fn latest_open_skips_saved_messages() {
        let mut log = ConversationLog::with_greeting();
        let first = analyzed(&mut log);
        let ticket = log.begin_save(first).unwrap();
        log.finish_save(ticket, Ok(created(1))).unwrap();
        assert!(log.latest_open().is_none());
        let second = log.submit_utterance("사과", None).unwrap();
        assert_eq!(log.latest_open().unwrap().id, second);
    }
}
