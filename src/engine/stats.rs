// Copyright 2024-2026 the chalk-engine authors.
// This file is part of chalk-engine.

// chalk-engine is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// chalk-engine is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with chalk-engine.  If not, see <http://www.gnu.org/licenses/>.

//! Per-session stats, king-of-table, and the lifetime per-user aggregate.

use std::cmp::Ordering;
use std::collections::HashMap;

use hashbrown::HashSet;

use crate::types::{
	CurrentGame, GameMode, GameResult, KingOfTable, LifetimeStats, PlayerStats, SessionStats, Side, UserResult,
};

/// Streak length at which a player can take the crown.
const KING_MIN_STREAK: u32 = 3;

/// Fold one singles/doubles/challenge result into the session stats.
pub fn update_stats_after_game(stats: &mut SessionStats, game: &CurrentGame, result: &GameResult, now: i64) {
	let winners = game.side_names(result.winning_side);
	let losers = game.side_names(opposite(result.winning_side));
	record_outcome(stats, &winners, &losers);

	let consecutive_wins = if result.winning_side == Side::Holder { game.consecutive_wins + 1 } else { 1 };
	let takes_crown = match &stats.king_of_table {
		None => consecutive_wins >= KING_MIN_STREAK,
		// ties keep the sitting king
		Some(king) => consecutive_wins >= KING_MIN_STREAK && consecutive_wins > king.consecutive_wins,
	};
	if takes_crown {
		let name = result.winner_names.first().cloned().or_else(|| winners.first().cloned());
		if let Some(name) = name {
			stats.king_of_table = Some(KingOfTable { name, consecutive_wins, crowned_at: now });
		}
	}
}

/// Fold a finished killer game into the session stats. The king of the table
/// is unchanged; killer streaks do not crown.
pub fn update_stats_after_killer_game(stats: &mut SessionStats, participants: &[String], winner: &str) {
	let winners = vec![winner.to_string()];
	let losers: Vec<String> = participants.iter().filter(|n| n.as_str() != winner).cloned().collect();
	record_outcome(stats, &winners, &losers);
}

fn record_outcome(stats: &mut SessionStats, winners: &[String], losers: &[String]) {
	for name in winners {
		let entry = stats.player_stats.entry(name.clone()).or_insert_with(PlayerStats::default);
		entry.wins += 1;
		entry.games_played += 1;
		entry.current_streak += 1;
		entry.best_streak = entry.best_streak.max(entry.current_streak);
	}
	for name in losers {
		let entry = stats.player_stats.entry(name.clone()).or_insert_with(PlayerStats::default);
		entry.losses += 1;
		entry.games_played += 1;
		entry.current_streak = 0;
	}
	stats.games_played += 1;
}

fn opposite(side: Side) -> Side {
	match side {
		Side::Holder => Side::Challenger,
		Side::Challenger => Side::Holder,
	}
}

/// Session leaderboard: wins desc, win rate desc, games played desc.
pub fn leaderboard(stats: &SessionStats) -> Vec<(String, PlayerStats)> {
	let mut rows: Vec<(String, PlayerStats)> =
		stats.player_stats.iter().map(|(name, s)| (name.clone(), s.clone())).collect();
	rows.sort_by(|(a_name, a), (b_name, b)| {
		b.wins
			.cmp(&a.wins)
			.then_with(|| b.win_rate().partial_cmp(&a.win_rate()).unwrap_or(Ordering::Equal))
			.then_with(|| b.games_played.cmp(&a.games_played))
			.then_with(|| a_name.cmp(b_name))
	});
	rows
}

/// Build the post-commit lifetime batch for one game. A player appears at
/// most once per game; later duplicates of a uid are dropped.
pub fn lifetime_results(
	winners: &[String],
	losers: &[String],
	user_ids: &HashMap<String, String>,
	mode: GameMode,
) -> Vec<UserResult> {
	let mut seen: HashSet<String> = HashSet::new();
	let mut results = Vec::new();
	for (names, won) in [(winners, true), (losers, false)] {
		for name in names {
			if let Some(uid) = user_ids.get(name) {
				if seen.insert(uid.clone()) {
					results.push(UserResult { user_id: uid.clone(), won, mode });
				}
			}
		}
	}
	results
}

/// Fold one result into a user's lifetime aggregate. Shared by the storage
/// adapters executing the post-commit batch.
pub fn apply_lifetime_result(stats: &mut LifetimeStats, won: bool, mode: GameMode, now: i64) {
	stats.games_played += 1;
	if won {
		stats.wins += 1;
		stats.current_streak += 1;
		stats.best_streak = stats.best_streak.max(stats.current_streak);
	} else {
		stats.losses += 1;
		stats.current_streak = 0;
	}
	stats.last_game_at = Some(now);

	let by_mode = stats.by_mode.entry(mode).or_default();
	by_mode.games_played += 1;
	if won {
		by_mode.wins += 1;
	} else {
		by_mode.losses += 1;
	}
}
