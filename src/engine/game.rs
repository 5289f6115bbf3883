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

//! Game lifecycle: starting the next game off the queue, killer mode,
//! result reporting with the win limit, cancellation, no-show resolution,
//! and the table-side tournament lifecycle.

use std::collections::HashMap;

use hashbrown::HashSet;

use crate::{
	engine::{queue, stats, tournament},
	error::{ChalkError, Result},
	types::{
		fresh_id, BreakRule, CurrentGame, GameHistoryRecord, GameMode, GamePlayer, GameResult, KillerPlayer,
		KillerState, QueueEntry, QueueStatus, Side, Table, TournamentFormat, TournamentStage, UserResult,
		KILLER_DEFAULT_LIVES, KILLER_MAX_PLAYERS, KILLER_MIN_PLAYERS,
	},
};

/// Everything the coordinator needs after a game commits: the append-only
/// history record and the deduplicated lifetime batch.
#[derive(Clone, Debug)]
pub struct FinishedGame {
	pub record: GameHistoryRecord,
	pub user_results: Vec<UserResult>,
}

/// Start the next game off the queue.
///
/// Lapsed holds are expired first; the pairing then follows the waiting
/// order, with killer and challenge entries changing the shape of the draw.
pub fn start_next_game(table: &mut Table, now: i64) -> Result<()> {
	if table.current_game.is_some() {
		return Err(ChalkError::GameInProgress);
	}
	queue::expire_held_entries(table, now);

	let waiting: Vec<String> = table.waiting().map(|e| e.id.clone()).collect();
	if table.waiting().any(|e| e.game_mode == GameMode::Killer) {
		let picked: Vec<String> = waiting.into_iter().take(KILLER_MAX_PLAYERS).collect();
		return start_killer(table, picked, now);
	}

	if waiting.len() < 2 {
		return Err(ChalkError::InsufficientPlayers);
	}

	let (holder_id, challenger_id) = match table.waiting().find(|e| e.game_mode == GameMode::Challenge) {
		Some(challenge) => {
			// the challenge entry skips ahead to face the front of the queue
			let challenger = challenge.id.clone();
			let holder = table
				.waiting()
				.find(|e| e.id != challenger)
				.map(|e| e.id.clone())
				.unwrap_or_else(|| waiting[0].clone());
			(holder, challenger)
		}
		None => (waiting[0].clone(), waiting[1].clone()),
	};

	let holder = table.entry(&holder_id).expect("holder entry came from the queue").clone();
	let challenger = table.entry(&challenger_id).expect("challenger entry came from the queue").clone();
	let mode = pair_mode(&holder, &challenger)?;

	let mut players: Vec<GamePlayer> = holder
		.player_names
		.iter()
		.map(|n| GamePlayer { name: n.clone(), side: Side::Holder, queue_entry_id: holder.id.clone() })
		.collect();
	players.extend(
		challenger
			.player_names
			.iter()
			.map(|n| GamePlayer { name: n.clone(), side: Side::Challenger, queue_entry_id: challenger.id.clone() }),
	);

	// a holder left at the front of the queue is the previous winner and
	// carries their streak in
	let consecutive_wins = if table.queue.first().map(|e| e.id.as_str()) == Some(holder.id.as_str()) {
		table
			.session_stats
			.player_stats
			.get(&holder.player_names[0])
			.map(|s| s.current_streak)
			.unwrap_or(0)
	} else {
		0
	};

	let breaking_player = match table.settings.house_rules.break_rule {
		BreakRule::WinnerBreaks => holder.player_names[0].clone(),
		BreakRule::LoserBreaks | BreakRule::Alternate => challenger.player_names[0].clone(),
	};

	call_entries(table, &[holder.id.clone(), challenger.id.clone()], now);
	table.current_game = Some(CurrentGame {
		id: fresh_id(),
		mode,
		started_at: now,
		players,
		killer_state: None,
		tournament_state: None,
		consecutive_wins,
		breaking_player,
	});
	Ok(())
}

fn pair_mode(holder: &QueueEntry, challenger: &QueueEntry) -> Result<GameMode> {
	if challenger.game_mode == GameMode::Challenge || holder.game_mode == GameMode::Challenge {
		// a doubles pair cannot meet a lone challenger
		if holder.player_names.len() != challenger.player_names.len() {
			return Err(ChalkError::InvalidDoublesComposition);
		}
		return Ok(GameMode::Challenge);
	}
	let holder_doubles = holder.game_mode == GameMode::Doubles;
	let challenger_doubles = challenger.game_mode == GameMode::Doubles;
	match (holder_doubles, challenger_doubles) {
		(true, true) => {
			if holder.player_names.len() == 2 && challenger.player_names.len() == 2 {
				Ok(GameMode::Doubles)
			} else {
				Err(ChalkError::InvalidDoublesComposition)
			}
		}
		(false, false) => Ok(GameMode::Singles),
		_ => Err(ChalkError::InvalidDoublesComposition),
	}
}

fn call_entries(table: &mut Table, entry_ids: &[String], now: i64) {
	let deadline = now + i64::from(table.settings.no_show_timeout_seconds) * 1_000;
	for id in entry_ids {
		if let Some(entry) = table.entry_mut(id) {
			entry.status = QueueStatus::Called;
			entry.no_show_deadline = Some(deadline);
			entry.hold_until = None;
		}
	}
}

fn start_killer(table: &mut Table, entry_ids: Vec<String>, now: i64) -> Result<()> {
	if entry_ids.len() < KILLER_MIN_PLAYERS {
		return Err(ChalkError::InsufficientPlayers);
	}

	let mut players = Vec::new();
	let mut killer_players = Vec::new();
	for id in &entry_ids {
		let entry = table.entry(id).ok_or_else(|| ChalkError::NotFound(format!("queue entry {}", id)))?;
		for name in &entry.player_names {
			players.push(GamePlayer { name: name.clone(), side: Side::Challenger, queue_entry_id: id.clone() });
			killer_players.push(KillerPlayer { name: name.clone(), lives: KILLER_DEFAULT_LIVES, is_eliminated: false });
		}
	}

	let breaking_player = killer_players[0].name.clone();
	call_entries(table, &entry_ids, now);
	table.current_game = Some(CurrentGame {
		id: fresh_id(),
		mode: GameMode::Killer,
		started_at: now,
		players,
		killer_state: Some(KillerState { players: killer_players, round: 1 }),
		tournament_state: None,
		consecutive_wins: 0,
		breaking_player,
	});
	Ok(())
}

/// Start killer for named players directly, reusing waiting entries where
/// the player is already queued and creating fresh entries otherwise.
pub fn start_killer_direct(table: &mut Table, player_names: Vec<String>, now: i64) -> Result<()> {
	if table.current_game.is_some() {
		return Err(ChalkError::GameInProgress);
	}
	if player_names.len() < KILLER_MIN_PLAYERS || player_names.len() > KILLER_MAX_PLAYERS {
		return Err(ChalkError::InsufficientPlayers);
	}
	let unique: HashSet<&str> = player_names.iter().map(String::as_str).collect();
	if unique.len() != player_names.len() {
		return Err(ChalkError::InvalidInput("duplicate killer player".into()));
	}

	let mut entry_ids = Vec::with_capacity(player_names.len());
	for name in &player_names {
		let existing = table
			.queue
			.iter()
			.find(|e| e.is_waiting() && e.player_names.len() == 1 && e.player_names[0] == *name)
			.map(|e| e.id.clone());
		match existing {
			Some(id) => entry_ids.push(id),
			None => {
				let entry = QueueEntry::new(vec![name.clone()], GameMode::Killer, HashMap::new(), now);
				entry_ids.push(entry.id.clone());
				table.queue.push(entry);
			}
		}
	}
	start_killer(table, entry_ids, now)
}

/// One lost frame: take a life, eliminate at zero, advance the round.
/// The queue is untouched.
pub fn eliminate_killer_player(table: &mut Table, name: &str) -> Result<()> {
	let game = table.current_game.as_mut().ok_or(ChalkError::NoActiveGame)?;
	let killer = game.killer_state.as_mut().ok_or(ChalkError::NoActiveGame)?;
	let player = killer
		.players
		.iter_mut()
		.find(|p| p.name == name)
		.ok_or_else(|| ChalkError::InvalidInput(format!("{} is not in this killer game", name)))?;
	if player.is_eliminated {
		return Err(ChalkError::InvalidInput(format!("{} is already eliminated", name)));
	}
	player.lives = player.lives.saturating_sub(1);
	if player.lives == 0 {
		player.is_eliminated = true;
	}
	killer.round += 1;
	Ok(())
}

pub fn killer_survivors(killer: &KillerState) -> Vec<&KillerPlayer> {
	killer.players.iter().filter(|p| !p.is_eliminated).collect()
}

pub fn is_killer_game_over(killer: &KillerState) -> bool {
	killer_survivors(killer).len() <= 1
}

pub fn killer_winner(killer: &KillerState) -> Option<&str> {
	let survivors = killer_survivors(killer);
	match survivors.as_slice() {
		[sole] => Some(sole.name.as_str()),
		_ => None,
	}
}

/// Report a singles/doubles/challenge result: the loser leaves the queue,
/// the winner stays on (or rotates to the back once the win limit is hit),
/// stats fold in, and the game slot clears. The next game does not start
/// automatically.
pub fn process_result(table: &mut Table, result: GameResult, now: i64) -> Result<FinishedGame> {
	let mode = table.current_game.as_ref().map(|g| g.mode).ok_or(ChalkError::NoActiveGame)?;
	if matches!(mode, GameMode::Killer | GameMode::Tournament) {
		return Err(ChalkError::InvalidInput("this game is not scored by side".into()));
	}
	let game = table.current_game.take().ok_or(ChalkError::NoActiveGame)?;

	let winner_entry_id = game
		.entry_id_for_side(result.winning_side)
		.ok_or_else(|| ChalkError::InvalidInput("winning side has no players".into()))?
		.to_string();
	let loser_entry_id = game
		.entry_id_for_side(opposite(result.winning_side))
		.ok_or_else(|| ChalkError::InvalidInput("losing side has no players".into()))?
		.to_string();

	let new_consecutive_wins =
		if result.winning_side == Side::Holder { game.consecutive_wins + 1 } else { 1 };
	let win_limit_reached =
		table.settings.win_limit_enabled && new_consecutive_wins >= table.settings.win_limit_count;

	// gather uid attribution before entries leave the queue
	let user_ids = participant_uids(table, &game);

	stats::update_stats_after_game(&mut table.session_stats, &game, &result, now);

	queue::remove_from_queue(table, &loser_entry_id);
	if win_limit_reached {
		queue::move_to_back(&mut table.queue, &winner_entry_id);
	} else if let Some(entry) = table.entry_mut(&winner_entry_id) {
		entry.status = QueueStatus::Waiting;
		entry.no_show_deadline = None;
		entry.hold_until = None;
	}

	let winners = game.side_names(result.winning_side);
	let losers = game.side_names(opposite(result.winning_side));
	let record = history_record(table, &game, winners.clone(), Some(result.winning_side), new_consecutive_wins, &user_ids, now);
	let user_results = stats::lifetime_results(&winners, &losers, &user_ids, game.mode);
	Ok(FinishedGame { record, user_results })
}

/// Close out a killer game: every participant's entry leaves the queue and
/// the winner's original entry returns to the front as waiting.
pub fn finish_killer_game(table: &mut Table, winner: &str, now: i64) -> Result<FinishedGame> {
	match table.current_game.as_ref() {
		Some(game) => match &game.killer_state {
			Some(killer) if killer.players.iter().any(|p| p.name == winner) => {}
			Some(_) => return Err(ChalkError::InvalidInput(format!("{} is not in this killer game", winner))),
			None => return Err(ChalkError::InvalidInput("current game is not killer".into())),
		},
		None => return Err(ChalkError::NoActiveGame),
	}
	let game = table.current_game.take().ok_or(ChalkError::NoActiveGame)?;
	let killer = game.killer_state.clone().ok_or(ChalkError::NoActiveGame)?;

	let user_ids = participant_uids(table, &game);

	let participant_entries: HashSet<&str> = game.players.iter().map(|p| p.queue_entry_id.as_str()).collect();
	let winner_entry_id = game
		.players
		.iter()
		.find(|p| p.name == winner)
		.map(|p| p.queue_entry_id.clone())
		.expect("winner is a participant");

	let mut winner_entry = None;
	table.queue.retain(|e| {
		if e.id == winner_entry_id {
			winner_entry = Some(e.clone());
		}
		!participant_entries.contains(e.id.as_str())
	});
	if let Some(mut entry) = winner_entry {
		entry.status = QueueStatus::Waiting;
		entry.no_show_deadline = None;
		entry.hold_until = None;
		table.queue.insert(0, entry);
	}

	let participants: Vec<String> = killer.players.iter().map(|p| p.name.clone()).collect();
	stats::update_stats_after_killer_game(&mut table.session_stats, &participants, winner);

	let losers: Vec<String> = participants.iter().filter(|n| n.as_str() != winner).cloned().collect();
	let record = history_record(table, &game, vec![winner.to_string()], None, 0, &user_ids, now);
	let user_results = stats::lifetime_results(&[winner.to_string()], &losers, &user_ids, GameMode::Killer);
	Ok(FinishedGame { record, user_results })
}

/// Abandon the current game. Called entries re-seat as waiting; stats are
/// untouched.
pub fn cancel_current_game(table: &mut Table) -> Result<()> {
	let game = table.current_game.take().ok_or(ChalkError::NoActiveGame)?;
	reseat_called(table, &game, &[]);
	Ok(())
}

/// Clear the no-show warning: deadlines drop but everyone stays called.
pub fn dismiss_no_show(table: &mut Table) {
	for entry in table.queue.iter_mut() {
		if entry.status == QueueStatus::Called {
			entry.no_show_deadline = None;
		}
	}
}

/// Forfeit the listed no-show entries, cancel the game, and re-seat the
/// remaining called players.
pub fn resolve_no_shows(table: &mut Table, no_show_entry_ids: &[String]) -> Result<()> {
	let game = table.current_game.take().ok_or(ChalkError::NoActiveGame)?;
	table.queue.retain(|e| !(no_show_entry_ids.contains(&e.id) && e.status == QueueStatus::Called));
	reseat_called(table, &game, no_show_entry_ids);
	Ok(())
}

fn reseat_called(table: &mut Table, game: &CurrentGame, dropped: &[String]) {
	let game_entries: HashSet<&str> = game.players.iter().map(|p| p.queue_entry_id.as_str()).collect();
	for entry in table.queue.iter_mut() {
		if entry.status == QueueStatus::Called
			&& game_entries.contains(entry.id.as_str())
			&& !dropped.contains(&entry.id)
		{
			entry.status = QueueStatus::Waiting;
			entry.no_show_deadline = None;
		}
	}
}

/// Record a game already underway at the table (e.g. walked-up players the
/// kiosk is legitimizing). Fresh entries are seated at the front so result
/// reporting behaves exactly as for a queue-started game.
pub fn register_current_game(
	table: &mut Table,
	holder_names: Vec<String>,
	challenger_names: Vec<String>,
	mode: GameMode,
	now: i64,
) -> Result<()> {
	if table.current_game.is_some() {
		return Err(ChalkError::GameInProgress);
	}
	if holder_names.is_empty() || challenger_names.is_empty() {
		return Err(ChalkError::InsufficientPlayers);
	}
	if matches!(mode, GameMode::Killer | GameMode::Tournament) {
		return Err(ChalkError::InvalidInput("killer and tournaments start through their own commands".into()));
	}
	let expected = if mode == GameMode::Doubles { 2 } else { 1 };
	if holder_names.len() != expected || challenger_names.len() != expected {
		return Err(if mode == GameMode::Doubles {
			ChalkError::InvalidDoublesComposition
		} else {
			ChalkError::InvalidInput("one name per side".into())
		});
	}

	let entry_mode = if mode == GameMode::Doubles { GameMode::Doubles } else { GameMode::Singles };
	let mut holder_entry = QueueEntry::new(holder_names.clone(), entry_mode, HashMap::new(), now);
	let mut challenger_entry = QueueEntry::new(challenger_names.clone(), entry_mode, HashMap::new(), now);
	// players are at the table, so called without a no-show deadline
	holder_entry.status = QueueStatus::Called;
	challenger_entry.status = QueueStatus::Called;

	let mut players: Vec<GamePlayer> = holder_names
		.iter()
		.map(|n| GamePlayer { name: n.clone(), side: Side::Holder, queue_entry_id: holder_entry.id.clone() })
		.collect();
	players.extend(challenger_names.iter().map(|n| GamePlayer {
		name: n.clone(),
		side: Side::Challenger,
		queue_entry_id: challenger_entry.id.clone(),
	}));

	let breaking_player = match table.settings.house_rules.break_rule {
		BreakRule::WinnerBreaks => holder_names[0].clone(),
		BreakRule::LoserBreaks | BreakRule::Alternate => challenger_names[0].clone(),
	};

	table.queue.insert(0, challenger_entry);
	table.queue.insert(0, holder_entry);
	let mut all_names = holder_names;
	all_names.extend(challenger_names);
	queue::remember_names(&mut table.recent_names, &all_names);
	table.current_game = Some(CurrentGame {
		id: fresh_id(),
		mode,
		started_at: now,
		players,
		killer_state: None,
		tournament_state: None,
		consecutive_wins: 0,
		breaking_player,
	});
	Ok(())
}

/// Install a tournament on the table. Participants live in the bracket, not
/// the queue.
pub fn start_tournament(
	table: &mut Table,
	player_names: Vec<String>,
	format: TournamentFormat,
	race_to: u8,
	now: i64,
) -> Result<()> {
	if table.current_game.is_some() {
		return Err(ChalkError::GameInProgress);
	}
	let state = tournament::generate(format, &player_names, race_to)?;
	table.current_game = Some(CurrentGame {
		id: fresh_id(),
		mode: GameMode::Tournament,
		started_at: now,
		players: Vec::new(),
		killer_state: None,
		tournament_state: Some(state),
		consecutive_wins: 0,
		breaking_player: player_names[0].clone(),
	});
	Ok(())
}

/// Score one tournament frame. Returns the finished-game payload once the
/// bracket completes.
pub fn report_tournament_frame(table: &mut Table, winner: &str, now: i64) -> Result<Option<FinishedGame>> {
	let game = table.current_game.as_mut().ok_or(ChalkError::NoActiveGame)?;
	let state = game.tournament_state.as_mut().ok_or(ChalkError::NoActiveGame)?;
	tournament::report_frame(state, winner, now)?;

	if state.stage != TournamentStage::Complete {
		return Ok(None);
	}
	let game = table.current_game.take().expect("checked above");
	let state = game.tournament_state.clone().expect("checked above");
	let winners = state.winner.clone().map(|w| vec![w]).unwrap_or_default();
	let record = history_record(table, &game, winners, None, 0, &HashMap::new(), now);
	// bracket names carry no uid attribution
	Ok(Some(FinishedGame { record, user_results: Vec::new() }))
}

fn participant_uids(table: &Table, game: &CurrentGame) -> HashMap<String, String> {
	let mut uids = HashMap::new();
	for player in &game.players {
		if let Some(entry) = table.entry(&player.queue_entry_id) {
			if let Some(uid) = entry.user_ids.get(&player.name) {
				uids.insert(player.name.clone(), uid.clone());
			}
		}
	}
	uids
}

fn history_record(
	table: &Table,
	game: &CurrentGame,
	winner: Vec<String>,
	winner_side: Option<Side>,
	consecutive_wins: u32,
	user_ids: &HashMap<String, String>,
	now: i64,
) -> GameHistoryRecord {
	let mut uid_list: Vec<String> = user_ids.values().cloned().collect();
	uid_list.sort();
	uid_list.dedup();
	GameHistoryRecord {
		id: game.id.clone(),
		table_id: table.id.clone(),
		mode: game.mode,
		players: game.players.clone(),
		winner,
		winner_side,
		started_at: game.started_at,
		ended_at: now,
		duration: now - game.started_at,
		consecutive_wins,
		killer_state: game.killer_state.clone(),
		tournament_state: game.tournament_state.clone(),
		player_uids: user_ids.clone(),
		player_uid_list: uid_list,
		venue_name: table.venue_name.clone(),
	}
}

fn opposite(side: Side) -> Side {
	match side {
		Side::Holder => Side::Challenger,
		Side::Challenger => Side::Holder,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::queue::add_to_queue;
	use crate::types::{JoinRequest, Table};

	fn table() -> Table {
		Table::new("CHALK-TEST".into(), "Main".into(), "The Crown".into(), "0".repeat(64), 0)
	}

	fn join(table: &mut Table, name: &str, mode: GameMode, at: i64) -> String {
		add_to_queue(
			table,
			JoinRequest { player_names: vec![name.to_string()], game_mode: mode, user_ids: HashMap::new() },
			at,
		)
		.unwrap()
	}

	fn join_doubles(table: &mut Table, names: [&str; 2], at: i64) -> String {
		add_to_queue(
			table,
			JoinRequest {
				player_names: names.iter().map(|s| s.to_string()).collect(),
				game_mode: GameMode::Doubles,
				user_ids: HashMap::new(),
			},
			at,
		)
		.unwrap()
	}

	fn holder_win(names: &[&str]) -> GameResult {
		GameResult { winning_side: Side::Holder, winner_names: names.iter().map(|s| s.to_string()).collect() }
	}

	#[test]
	fn should_play_out_win_stay_singles() {
		// queue = [A, B, C]
		let mut t = table();
		join(&mut t, "A", GameMode::Singles, 1);
		join(&mut t, "B", GameMode::Singles, 2);
		join(&mut t, "C", GameMode::Singles, 3);

		start_next_game(&mut t, 10_000).unwrap();
		let game = t.current_game.as_ref().unwrap();
		assert_eq!(game.mode, GameMode::Singles);
		assert_eq!(game.breaking_player, "A"); // winner_breaks default
		assert_eq!(game.consecutive_wins, 0);
		let called: Vec<_> = t.queue.iter().filter(|e| e.status == QueueStatus::Called).collect();
		assert_eq!(called.len(), 2);
		assert!(called.iter().all(|e| e.no_show_deadline == Some(10_000 + 120_000)));

		let finished = process_result(&mut t, holder_win(&["A"]), 20_000).unwrap();
		assert!(t.current_game.is_none());
		let order: Vec<&str> = t.queue.iter().map(|e| e.player_names[0].as_str()).collect();
		assert_eq!(order, vec!["A", "C"]);
		assert!(t.queue.iter().all(|e| e.is_waiting()));

		let a = &t.session_stats.player_stats["A"];
		assert_eq!((a.wins, a.losses, a.games_played, a.current_streak, a.best_streak), (1, 0, 1, 1, 1));
		assert_eq!(t.session_stats.player_stats["B"].losses, 1);

		assert_eq!(finished.record.winner, vec!["A"]);
		assert_eq!(finished.record.winner_side, Some(Side::Holder));
		assert_eq!(finished.record.duration, 10_000);
		assert_eq!(finished.record.consecutive_wins, 1);
	}

	#[test]
	fn should_move_winner_back_at_win_limit_and_crown() {
		// A has won twice; the third straight win trips the limit
		let mut t = table();
		t.settings.win_limit_enabled = true;
		t.settings.win_limit_count = 3;
		let a = join(&mut t, "A", GameMode::Singles, 1);
		join(&mut t, "B", GameMode::Singles, 2);
		join(&mut t, "C", GameMode::Singles, 3);
		t.session_stats.player_stats.insert(
			"A".into(),
			crate::types::PlayerStats { wins: 2, games_played: 2, current_streak: 2, best_streak: 2, ..Default::default() },
		);

		start_next_game(&mut t, 10_000).unwrap();
		assert_eq!(t.current_game.as_ref().unwrap().consecutive_wins, 2);

		process_result(&mut t, holder_win(&["A"]), 20_000).unwrap();
		let order: Vec<&str> = t.queue.iter().map(|e| e.player_names[0].as_str()).collect();
		assert_eq!(order, vec!["C", "A"]);
		assert_eq!(t.queue.last().unwrap().id, a);

		let king = t.session_stats.king_of_table.clone().unwrap();
		assert_eq!((king.name.as_str(), king.consecutive_wins), ("A", 3));
	}

	#[test]
	fn should_reject_malformed_doubles_pairing() {
		// both entries doubles, one with a bad name count
		let mut t = table();
		join_doubles(&mut t, ["A", "B"], 1);
		let id = join_doubles(&mut t, ["C", "D"], 2);
		t.entry_mut(&id).unwrap().player_names.push("E".into());

		assert!(matches!(start_next_game(&mut t, 10), Err(ChalkError::InvalidDoublesComposition)));
		assert!(t.current_game.is_none());
	}

	#[test]
	fn should_pair_two_doubles_teams() {
		let mut t = table();
		join_doubles(&mut t, ["A", "B"], 1);
		join_doubles(&mut t, ["C", "D"], 2);
		start_next_game(&mut t, 10).unwrap();
		let game = t.current_game.as_ref().unwrap();
		assert_eq!(game.mode, GameMode::Doubles);
		assert_eq!(game.players.len(), 4);
		assert_eq!(game.side_names(Side::Holder), vec!["A", "B"]);
	}

	#[test]
	fn should_let_challenge_entry_skip_ahead() {
		let mut t = table();
		join(&mut t, "A", GameMode::Singles, 1);
		join(&mut t, "B", GameMode::Singles, 2);
		join(&mut t, "X", GameMode::Challenge, 3);

		start_next_game(&mut t, 10).unwrap();
		let game = t.current_game.as_ref().unwrap();
		assert_eq!(game.mode, GameMode::Challenge);
		assert_eq!(game.side_names(Side::Holder), vec!["A"]);
		assert_eq!(game.side_names(Side::Challenger), vec!["X"]);
		// B was skipped, not called
		assert!(t.queue.iter().find(|e| e.player_names[0] == "B").unwrap().is_waiting());
	}

	#[test]
	fn should_run_killer_to_a_single_survivor() {
		// P, Q, R all queued for killer
		let mut t = table();
		let p = join(&mut t, "P", GameMode::Killer, 1);
		join(&mut t, "Q", GameMode::Killer, 2);
		join(&mut t, "R", GameMode::Killer, 3);

		start_next_game(&mut t, 10).unwrap();
		{
			let killer = t.current_game.as_ref().unwrap().killer_state.as_ref().unwrap();
			assert_eq!(killer.players.len(), 3);
			assert!(killer.players.iter().all(|p| p.lives == KILLER_DEFAULT_LIVES && !p.is_eliminated));
			assert_eq!(killer.round, 1);
		}

		eliminate_killer_player(&mut t, "Q").unwrap();
		eliminate_killer_player(&mut t, "Q").unwrap();
		eliminate_killer_player(&mut t, "Q").unwrap();
		{
			let killer = t.current_game.as_ref().unwrap().killer_state.as_ref().unwrap();
			assert!(killer.players.iter().find(|p| p.name == "Q").unwrap().is_eliminated);
			assert!(!is_killer_game_over(killer));
		}
		for _ in 0..3 {
			eliminate_killer_player(&mut t, "R").unwrap();
		}
		{
			let killer = t.current_game.as_ref().unwrap().killer_state.as_ref().unwrap();
			assert!(is_killer_game_over(killer));
			assert_eq!(killer_winner(killer), Some("P"));
		}

		let finished = finish_killer_game(&mut t, "P", 99).unwrap();
		assert!(t.current_game.is_none());
		// only the winner's original entry survives, back at the front
		assert_eq!(t.queue.len(), 1);
		assert_eq!(t.queue[0].id, p);
		assert!(t.queue[0].is_waiting());
		assert_eq!(finished.record.mode, GameMode::Killer);
		assert_eq!(finished.record.winner, vec!["P"]);
		assert!(finished.record.killer_state.is_some());
	}

	#[test]
	fn should_require_three_for_killer() {
		let mut t = table();
		join(&mut t, "P", GameMode::Killer, 1);
		join(&mut t, "Q", GameMode::Singles, 2);
		assert!(matches!(start_next_game(&mut t, 10), Err(ChalkError::InsufficientPlayers)));
	}

	#[test]
	fn should_start_killer_direct_reusing_waiting_entries() {
		let mut t = table();
		let p = join(&mut t, "P", GameMode::Singles, 1);
		start_killer_direct(&mut t, vec!["P".into(), "Q".into(), "R".into()], 10).unwrap();
		let game = t.current_game.as_ref().unwrap();
		assert_eq!(game.mode, GameMode::Killer);
		assert!(game.players.iter().any(|gp| gp.queue_entry_id == p));
		assert_eq!(t.queue.len(), 3);
	}

	#[test]
	fn should_cancel_and_restart_with_same_pairing() {
		let mut t = table();
		join(&mut t, "A", GameMode::Singles, 1);
		join(&mut t, "B", GameMode::Singles, 2);

		start_next_game(&mut t, 10).unwrap();
		let first: Vec<String> =
			t.current_game.as_ref().unwrap().players.iter().map(|p| p.name.clone()).collect();
		cancel_current_game(&mut t).unwrap();
		assert!(t.current_game.is_none());
		assert!(t.queue.iter().all(|e| e.is_waiting() && e.no_show_deadline.is_none()));

		start_next_game(&mut t, 20).unwrap();
		let second: Vec<String> =
			t.current_game.as_ref().unwrap().players.iter().map(|p| p.name.clone()).collect();
		assert_eq!(first, second);
	}

	#[test]
	fn should_resolve_no_shows_by_forfeiting_listed_entries() {
		let mut t = table();
		join(&mut t, "A", GameMode::Singles, 1);
		let b = join(&mut t, "B", GameMode::Singles, 2);
		join(&mut t, "C", GameMode::Singles, 3);

		start_next_game(&mut t, 10).unwrap();
		resolve_no_shows(&mut t, &[b.clone()]).unwrap();
		assert!(t.current_game.is_none());
		let order: Vec<&str> = t.queue.iter().map(|e| e.player_names[0].as_str()).collect();
		assert_eq!(order, vec!["A", "C"]);
		assert!(t.queue.iter().all(|e| e.is_waiting()));
	}

	#[test]
	fn should_dismiss_no_show_warning_without_reseating() {
		let mut t = table();
		join(&mut t, "A", GameMode::Singles, 1);
		join(&mut t, "B", GameMode::Singles, 2);
		start_next_game(&mut t, 10).unwrap();

		dismiss_no_show(&mut t);
		assert!(t
			.queue
			.iter()
			.filter(|e| e.status == QueueStatus::Called)
			.all(|e| e.no_show_deadline.is_none()));
		assert!(t.current_game.is_some());
	}

	#[test]
	fn should_reject_result_without_game() {
		let mut t = table();
		assert!(matches!(process_result(&mut t, holder_win(&["A"]), 1), Err(ChalkError::NoActiveGame)));
	}

	#[test]
	fn should_register_walk_up_game() {
		let mut t = table();
		register_current_game(&mut t, vec!["A".into()], vec!["B".into()], GameMode::Singles, 10).unwrap();
		assert!(t.current_game.is_some());
		assert_eq!(t.queue.len(), 2);
		assert!(matches!(
			register_current_game(&mut t, vec!["C".into()], vec!["D".into()], GameMode::Singles, 11),
			Err(ChalkError::GameInProgress)
		));

		// reporting works exactly as for a queue-started game
		process_result(&mut t, holder_win(&["A"]), 20).unwrap();
		let order: Vec<&str> = t.queue.iter().map(|e| e.player_names[0].as_str()).collect();
		assert_eq!(order, vec!["A"]);
	}

	#[test]
	fn should_attribute_lifetime_results_from_claimed_entries() {
		let mut t = table();
		let a = join(&mut t, "A", GameMode::Singles, 1);
		join(&mut t, "B", GameMode::Singles, 2);
		crate::engine::queue::claim_queue_spot(&mut t, &a, "A", "uid-a").unwrap();

		start_next_game(&mut t, 10).unwrap();
		let finished = process_result(&mut t, holder_win(&["A"]), 20).unwrap();
		assert_eq!(finished.record.player_uid_list, vec!["uid-a"]);
		assert_eq!(finished.user_results.len(), 1);
		assert!(finished.user_results[0].won);
	}
}
