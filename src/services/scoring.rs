//! Pure scoring and identity helpers for game aggregates.
//!
//! Everything here is deterministic arithmetic on plain values so the
//! heuristics can be swapped or tuned without touching tracking logic.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::dao::models::{GameAggregateEntity, GameCategory};

/// Weights for the game popularity score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PopularityWeights {
    /// Points per completed session.
    pub session: i64,
    /// Points per distinct daily player.
    pub unique_player: i64,
    /// Flat bonus when the game was played recently.
    pub recency_bonus: i64,
    /// Days a game counts as recently played.
    pub recency_window_days: u64,
    /// Points per member playing right now.
    pub live_player: i64,
}

impl Default for PopularityWeights {
    fn default() -> Self {
        Self {
            session: 2,
            unique_player: 5,
            recency_bonus: 10,
            recency_window_days: 7,
            live_player: 20,
        }
    }
}

/// Popularity score for one game aggregate at the given instant.
pub fn popularity_score(
    aggregate: &GameAggregateEntity,
    weights: &PopularityWeights,
    now: SystemTime,
) -> i64 {
    let mut score = weights
        .session
        .saturating_mul(aggregate.total_sessions as i64)
        .saturating_add(
            weights
                .unique_player
                .saturating_mul(aggregate.unique_players as i64),
        );

    let window = Duration::from_secs(weights.recency_window_days.saturating_mul(86_400));
    let idle = now
        .duration_since(aggregate.last_seen)
        .unwrap_or_default();
    if idle <= window {
        score = score.saturating_add(weights.recency_bonus);
    }

    score.saturating_add(
        weights
            .live_player
            .saturating_mul(aggregate.current_player_count as i64),
    )
}

/// Derive the stable identifier for a game from its display name.
///
/// Lowercases, splits on anything that is not alphanumeric (apostrophes are
/// dropped without splitting), joins with underscores, and strips one leading
/// article. Every spelling of the same title maps to the same identifier, so
/// "The Witcher 3" and "Witcher 3" share an aggregate.
pub fn normalize_game_name(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for c in name.chars() {
        if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if c == '\'' || c == '\u{2019}' {
            continue;
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    if words.len() > 1 && matches!(words[0].as_str(), "the" | "a" | "an") {
        words.remove(0);
    }

    words.join("_")
}

/// Keyword table mapping normalized identifiers to genre buckets. First
/// matching substring wins.
const CATEGORY_KEYWORDS: &[(&str, GameCategory)] = &[
    ("counter_strike", GameCategory::Shooter),
    ("valorant", GameCategory::Shooter),
    ("overwatch", GameCategory::Shooter),
    ("apex", GameCategory::Shooter),
    ("call_of_duty", GameCategory::Shooter),
    ("warzone", GameCategory::Shooter),
    ("battlefield", GameCategory::Shooter),
    ("destiny", GameCategory::Shooter),
    ("halo", GameCategory::Shooter),
    ("doom", GameCategory::Shooter),
    ("rainbow_six", GameCategory::Shooter),
    ("fortnite", GameCategory::Shooter),
    ("league_of_legends", GameCategory::Moba),
    ("dota", GameCategory::Moba),
    ("smite", GameCategory::Moba),
    ("heroes_of_the_storm", GameCategory::Moba),
    ("witcher", GameCategory::Rpg),
    ("elden_ring", GameCategory::Rpg),
    ("skyrim", GameCategory::Rpg),
    ("fallout", GameCategory::Rpg),
    ("baldur", GameCategory::Rpg),
    ("diablo", GameCategory::Rpg),
    ("cyberpunk", GameCategory::Rpg),
    ("final_fantasy", GameCategory::Rpg),
    ("dark_souls", GameCategory::Rpg),
    ("genshin", GameCategory::Rpg),
    ("civilization", GameCategory::Strategy),
    ("starcraft", GameCategory::Strategy),
    ("age_of_empires", GameCategory::Strategy),
    ("total_war", GameCategory::Strategy),
    ("crusader_kings", GameCategory::Strategy),
    ("stellaris", GameCategory::Strategy),
    ("factorio", GameCategory::Strategy),
    ("minecraft", GameCategory::Sandbox),
    ("terraria", GameCategory::Sandbox),
    ("roblox", GameCategory::Sandbox),
    ("valheim", GameCategory::Sandbox),
    ("ark", GameCategory::Sandbox),
    ("satisfactory", GameCategory::Sandbox),
    ("no_mans_sky", GameCategory::Sandbox),
    ("rocket_league", GameCategory::Sports),
    ("fifa", GameCategory::Sports),
    ("nba", GameCategory::Sports),
    ("madden", GameCategory::Sports),
    ("forza", GameCategory::Sports),
    ("gran_turismo", GameCategory::Sports),
    ("among_us", GameCategory::Party),
    ("fall_guys", GameCategory::Party),
    ("jackbox", GameCategory::Party),
    ("mario_kart", GameCategory::Party),
    ("mario_party", GameCategory::Party),
];

/// Infer the genre bucket for a normalized game identifier.
pub fn infer_category(game_id: &str) -> GameCategory {
    for (keyword, category) in CATEGORY_KEYWORDS {
        if game_id.contains(keyword) {
            return *category;
        }
    }
    GameCategory::General
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spellings_of_one_title_share_an_identifier() {
        assert_eq!(normalize_game_name("The Witcher 3"), "witcher_3");
        assert_eq!(normalize_game_name("Witcher 3"), "witcher_3");
        assert_eq!(normalize_game_name("the  WITCHER 3!"), "witcher_3");
    }

    #[test]
    fn normalization_splits_on_punctuation_but_not_apostrophes() {
        assert_eq!(normalize_game_name("Counter-Strike 2"), "counter_strike_2");
        assert_eq!(normalize_game_name("No Man's Sky"), "no_mans_sky");
        assert_eq!(normalize_game_name("A Way Out"), "way_out");
    }

    #[test]
    fn lone_article_and_empty_names_stay_as_is() {
        assert_eq!(normalize_game_name("The"), "the");
        assert_eq!(normalize_game_name("!!!"), "");
    }

    #[test]
    fn keyword_table_buckets_known_titles() {
        assert_eq!(infer_category("witcher_3"), GameCategory::Rpg);
        assert_eq!(infer_category("valorant"), GameCategory::Shooter);
        assert_eq!(infer_category("rocket_league"), GameCategory::Sports);
        assert_eq!(infer_category("obscure_indie_title"), GameCategory::General);
    }

    #[test]
    fn popularity_rewards_recency_and_live_players() {
        let now = SystemTime::now();
        let mut aggregate = GameAggregateEntity::new(
            "witcher_3".into(),
            "The Witcher 3".into(),
            GameCategory::Rpg,
            now,
            now,
        );
        aggregate.total_sessions = 10;
        aggregate.unique_players = 4;
        aggregate.current_player_count = 2;
        aggregate.last_seen = now;

        let weights = PopularityWeights::default();
        assert_eq!(
            popularity_score(&aggregate, &weights, now),
            2 * 10 + 5 * 4 + 10 + 20 * 2
        );

        aggregate.last_seen = now - Duration::from_secs(30 * 86_400);
        aggregate.current_player_count = 0;
        assert_eq!(
            popularity_score(&aggregate, &weights, now),
            2 * 10 + 5 * 4
        );
    }
}
