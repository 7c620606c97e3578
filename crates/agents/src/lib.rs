use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{Duration, Utc};
use midc_core::{
    dialogue, ChatInput, ChatReply, ConversationSession, DialogueState, PlaceKey, RateType,
    RateValue,
};
use midc_dataset::{DatasetStats, RateTable};
use midc_observability::AppMetrics;
use midc_storage::SessionRepository;
use tracing::{info, instrument};
use uuid::Uuid;

const SESSION_TTL_HOURS: i64 = 24;

/// Drives one dialogue turn per request: load the session, advance the state
/// machine, persist, count. The rate table is shared read-only; all mutable
/// state lives in the per-session value.
#[derive(Clone)]
pub struct RateAgent<S>
where
    S: SessionRepository,
{
    table: Arc<RateTable>,
    store: Arc<S>,
    metrics: Arc<AppMetrics>,
}

impl<S> RateAgent<S>
where
    S: SessionRepository,
{
    pub fn new(table: Arc<RateTable>, store: Arc<S>, metrics: Arc<AppMetrics>) -> Self {
        Self {
            table,
            store,
            metrics,
        }
    }

    #[instrument(skip(self, input))]
    pub async fn handle_chat(&self, input: ChatInput) -> Result<ChatReply> {
        let started = Instant::now();
        self.metrics.inc_request();

        let session_id = input
            .session_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut session = self
            .store
            .load_session(&session_id)
            .await?
            .unwrap_or_else(|| {
                ConversationSession::new(
                    session_id.clone(),
                    Utc::now() + Duration::hours(SESSION_TTL_HOURS),
                )
            });

        let state_before = session.state;
        let reply_text = dialogue::submit(
            &mut session,
            &input.text,
            self.table.records(),
            self.table.index(),
        );
        self.count_transition(state_before, &session, &reply_text);

        session.expires_at = Utc::now() + Duration::hours(SESSION_TTL_HOURS);
        self.store.upsert_session(&session).await?;

        self.metrics.observe_latency(started.elapsed());
        info!(
            session_id = %session_id,
            state_before = ?state_before,
            state_after = ?session.state,
            "chat turn handled"
        );

        Ok(ChatReply {
            session_id,
            reply_text,
            state: session.state,
            resolved: session.resolved,
        })
    }

    /// Explicit reset: back to the initial state, triple and chat log cleared.
    #[instrument(skip(self))]
    pub async fn reset(&self, session_id: &str) -> Result<ChatReply> {
        let mut session = self
            .store
            .load_session(session_id)
            .await?
            .unwrap_or_else(|| {
                ConversationSession::new(
                    session_id.to_string(),
                    Utc::now() + Duration::hours(SESSION_TTL_HOURS),
                )
            });

        dialogue::reset(&mut session);
        session.expires_at = Utc::now() + Duration::hours(SESSION_TTL_HOURS);
        self.store.upsert_session(&session).await?;

        info!(session_id = %session_id, "session reset");

        Ok(ChatReply {
            session_id: session_id.to_string(),
            reply_text: dialogue::ASK_LOCATION.to_string(),
            state: DialogueState::AwaitingLocation,
            resolved: None,
        })
    }

    pub fn resolve(&self, text: &str) -> Option<PlaceKey> {
        self.metrics.inc_request();
        let place = self.table.resolve(text);
        match place {
            Some(_) => self.metrics.inc_resolver_hit(),
            None => self.metrics.inc_resolver_miss(),
        }
        place
    }

    pub fn rate(
        &self,
        district: &str,
        taluka: &str,
        location: &str,
        rate_type: RateType,
    ) -> Option<RateValue> {
        self.metrics.inc_request();
        let rate = self
            .table
            .get_rate(district, taluka, location, rate_type)
            .cloned();
        if rate.is_none() {
            self.metrics.inc_lookup_miss();
        }
        rate
    }

    pub fn districts(&self) -> Vec<String> {
        self.table.districts()
    }

    pub fn talukas(&self, district: &str) -> Vec<String> {
        self.table.talukas(district)
    }

    pub fn locations(&self, district: &str, taluka: &str) -> Vec<String> {
        self.table.locations(district, taluka)
    }

    pub fn dataset_stats(&self) -> DatasetStats {
        self.table.stats()
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64> {
        self.store.purge_expired(Utc::now()).await
    }

    fn count_transition(
        &self,
        state_before: DialogueState,
        session: &ConversationSession,
        reply_text: &str,
    ) {
        match (state_before, session.state) {
            (DialogueState::AwaitingLocation, DialogueState::AwaitingRateType) => {
                self.metrics.inc_resolver_hit();
            }
            (DialogueState::AwaitingLocation, DialogueState::AwaitingLocation) => {
                self.metrics.inc_resolver_miss();
            }
            (DialogueState::AwaitingRateType, DialogueState::Done) => {
                if reply_text.starts_with("No ") {
                    self.metrics.inc_lookup_miss();
                }
            }
            _ => {}
        }
    }
}
