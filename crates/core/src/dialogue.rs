use chrono::Utc;

use crate::lookup::get_rate;
use crate::models::{ConversationSession, ConversationTurn, DialogueState, RateRecord, RateType};
use crate::resolver::{resolve, LocationIndex};

/// Chat log cap per session; older turns are dropped first.
const MAX_TURNS: usize = 40;

pub const ASK_LOCATION: &str =
    "Sure! Where do you want to buy property? Please provide a valid location, taluka, or district.";
pub const ASK_RATE_TYPE: &str =
    "Got it! What type of property are you interested in - Industrial, Commercial, or Residential?";
pub const ASK_RATE_TYPE_RETRY: &str =
    "Please specify the type: Industrial, Commercial, or Residential.";
pub const NEW_QUERY_PROMPT: &str = "Would you like to check another property rate?";

/// Advances the conversation by one user turn and returns the assistant
/// reply. Synchronous and deterministic given (state, resolved, text).
pub fn submit(
    session: &mut ConversationSession,
    text: &str,
    records: &[RateRecord],
    index: &LocationIndex,
) -> String {
    let reply = advance(session, text, records, index);

    session.turns.push(ConversationTurn {
        at: Utc::now(),
        user_text: text.to_string(),
        assistant_text: reply.clone(),
        state_after: session.state,
    });
    if session.turns.len() > MAX_TURNS {
        let keep_from = session.turns.len() - MAX_TURNS;
        session.turns.drain(..keep_from);
    }

    reply
}

/// Returns the session to its initial state and clears the chat log.
pub fn reset(session: &mut ConversationSession) {
    session.state = DialogueState::AwaitingLocation;
    session.resolved = None;
    session.turns.clear();
}

fn advance(
    session: &mut ConversationSession,
    text: &str,
    records: &[RateRecord],
    index: &LocationIndex,
) -> String {
    match session.state {
        DialogueState::AwaitingLocation => match resolve(text, records, index) {
            Some(place) => {
                session.resolved = Some(place);
                session.state = DialogueState::AwaitingRateType;
                ASK_RATE_TYPE.to_string()
            }
            None => ASK_LOCATION.to_string(),
        },
        DialogueState::AwaitingRateType => {
            let Some(place) = session.resolved.clone() else {
                // Invariant slipped (state without a triple): start over.
                session.state = DialogueState::AwaitingLocation;
                return ASK_LOCATION.to_string();
            };

            match RateType::from_keywords(text) {
                Some(rate_type) => {
                    session.state = DialogueState::Done;
                    match get_rate(
                        records,
                        &place.district,
                        &place.taluka,
                        &place.location,
                        rate_type,
                    ) {
                        Some(value) => format!("The {} in {} is {}.", rate_type.label(), place, value),
                        None => format!("No {} available in {}.", rate_type.label(), place),
                    }
                }
                None if resolve(text, records, index).is_some() => format!(
                    "I already have {} noted. Which rate do you need - Industrial, Commercial, or Residential?",
                    place
                ),
                None => ASK_RATE_TYPE_RETRY.to_string(),
            }
        }
        DialogueState::Done => {
            session.resolved = None;
            session.state = DialogueState::AwaitingLocation;
            NEW_QUERY_PROMPT.to_string()
        }
    }
}
