//! Battle record normalization.
//!
//! Pure conversion from the raw wire payload into the canonical
//! `BattleRecord`. Optional data (decks, crowns, trophies) may be absent;
//! a record is rejected only when the timestamp, mode, or opponent
//! identity cannot be established.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::api::types::{RawBattle, RawParticipant};
use crate::domain::battle::{categorize_game_mode, derive_battle_id, BattleOutcome, BattleRecord};
use crate::domain::subject::normalize_tag;
use crate::error::{Result, WatchError};

/// Upstream compact timestamp format, e.g. `20250601T123000.000Z`.
const BATTLE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S%.fZ";

/// Convert one raw battle entry into a canonical record for `subject_tag`
/// (normalized form).
pub fn normalize(subject_tag: &str, raw: &RawBattle) -> Result<BattleRecord> {
    let battle_time = parse_battle_time(&raw.battle_time)?;

    let (own, enemy) = split_sides(subject_tag, raw)?;

    let opponent_tag = enemy
        .tag
        .as_deref()
        .map(normalize_tag)
        .transpose()
        .ok()
        .flatten()
        .ok_or_else(|| {
            WatchError::MalformedRecord(format!(
                "battle at {} has no opponent tag",
                raw.battle_time
            ))
        })?;
    let opponent_name = enemy
        .name
        .clone()
        .unwrap_or_else(|| "Unknown".to_string());

    let mode_name = raw
        .game_mode
        .as_ref()
        .and_then(|m| m.name.clone())
        .unwrap_or_default();
    if mode_name.is_empty() && raw.battle_type.is_empty() {
        return Err(WatchError::MalformedRecord(format!(
            "battle at {} has no game mode",
            raw.battle_time
        )));
    }
    let mode_category = categorize_game_mode(&raw.battle_type, &mode_name);
    let game_mode = if mode_name.is_empty() {
        mode_category.clone()
    } else {
        mode_name
    };

    // Missing crowns count as zero, matching how the upstream reports
    // incomplete entries.
    let outcome = BattleOutcome::from_crowns(
        own.crowns.unwrap_or(0),
        enemy.crowns.unwrap_or(0),
    );

    Ok(BattleRecord {
        id: derive_battle_id(subject_tag, &opponent_tag, battle_time, &game_mode),
        battle_time,
        game_mode,
        mode_category,
        outcome,
        opponent_tag,
        opponent_name,
        deck: deck_snapshot(own),
        opponent_deck: deck_snapshot(enemy),
        own_crowns: own.crowns,
        enemy_crowns: enemy.crowns,
        starting_trophies: own.starting_trophies,
        trophy_change: own.trophy_change,
    })
}

fn parse_battle_time(raw: &str) -> Result<DateTime<Utc>> {
    if raw.is_empty() {
        return Err(WatchError::MalformedRecord(
            "battle entry has no timestamp".to_string(),
        ));
    }
    NaiveDateTime::parse_from_str(raw, BATTLE_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| WatchError::MalformedRecord(format!("unparsable battle time {raw}: {e}")))
}

/// Locate the subject's participant entry and the opposing one.
///
/// The subject usually sits in `team`, but 2v2 payloads can place it in
/// `opponent`; when the tag matches neither side, fall back to treating the
/// first team entry as the subject.
fn split_sides<'a>(
    subject_tag: &str,
    raw: &'a RawBattle,
) -> Result<(&'a RawParticipant, &'a RawParticipant)> {
    let matches_subject = |p: &RawParticipant| {
        p.tag
            .as_deref()
            .and_then(|t| normalize_tag(t).ok())
            .is_some_and(|t| t == subject_tag)
    };

    if let Some(own) = raw.team.iter().find(|p| matches_subject(p)) {
        if let Some(enemy) = raw.opponent.first() {
            return Ok((own, enemy));
        }
    } else if let Some(own) = raw.opponent.iter().find(|p| matches_subject(p)) {
        if let Some(enemy) = raw.team.first() {
            return Ok((own, enemy));
        }
    } else if let (Some(own), Some(enemy)) = (raw.team.first(), raw.opponent.first()) {
        return Ok((own, enemy));
    }

    Err(WatchError::MalformedRecord(format!(
        "battle at {} has no usable participants",
        raw.battle_time
    )))
}

fn deck_snapshot(participant: &RawParticipant) -> Vec<String> {
    participant
        .cards
        .iter()
        .take(8)
        .map(|c| c.name.clone().unwrap_or_else(|| "?".to_string()))
        .collect()
}
