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

//! The `Table` document and every value it contains.
//!
//! One `Table` is the whole persisted state of one physical pool table. The
//! pure engines in [`crate::engine`] transform these values; nothing in this
//! module performs I/O or reads a clock. All timestamps are integer
//! milliseconds since the Unix epoch; nullable fields serialize as explicit
//! `null`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Process-wide engine defaults. These are constants of the engine, not
// command flags.
pub const MAX_QUEUE_SIZE: usize = 30;
pub const MAX_RECENT_NAMES: usize = 50;
pub const MAX_PLAYER_NAME_LEN: usize = 30;
pub const DEFAULT_NO_SHOW_TIMEOUT_SECS: u32 = 120;
pub const DEFAULT_HOLD_MAX_MINUTES: u32 = 15;
pub const DEFAULT_WIN_LIMIT: u32 = 3;
pub const DEFAULT_ATTRACT_TIMEOUT_MINUTES: u32 = 1;
pub const KILLER_DEFAULT_LIVES: u8 = 3;
pub const KILLER_MIN_PLAYERS: usize = 3;
pub const KILLER_MAX_PLAYERS: usize = 8;
pub const SHORT_CODE_LEN: usize = 4;
pub const PIN_LEN: usize = 4;
pub const RACE_TO_MIN: u8 = 1;
pub const RACE_TO_MAX: u8 = 13;
pub const MIN_TOURNAMENT_PLAYERS: usize = 3;
pub const MAX_TOURNAMENT_PLAYERS: usize = 16;

pub fn fresh_id() -> String {
	Uuid::new_v4().to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
	Idle,
	Active,
	Private,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
	Waiting,
	OnHold,
	Called,
	NoShowWarning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
	Singles,
	Doubles,
	Killer,
	Challenge,
	Tournament,
}

/// Which side of the active game a player is on. The holder was at the front
/// of the queue entering the game and stays there after a win, up to the win
/// limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
	Holder,
	Challenger,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakRule {
	WinnerBreaks,
	LoserBreaks,
	Alternate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoulRule {
	TwoShots,
	BallInHand,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
	Dark,
	Light,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseRules {
	#[serde(default = "default_break_rule")]
	pub break_rule: BreakRule,
	#[serde(default = "default_foul_rule")]
	pub foul_rule: FoulRule,
	#[serde(default)]
	pub black_spot_rule: bool,
}

impl Default for HouseRules {
	fn default() -> Self {
		Self { break_rule: default_break_rule(), foul_rule: default_foul_rule(), black_spot_rule: false }
	}
}

const fn default_break_rule() -> BreakRule {
	BreakRule::WinnerBreaks
}

const fn default_foul_rule() -> FoulRule {
	FoulRule::TwoShots
}

const fn default_no_show_timeout() -> u32 {
	DEFAULT_NO_SHOW_TIMEOUT_SECS
}

const fn default_hold_max_minutes() -> u32 {
	DEFAULT_HOLD_MAX_MINUTES
}

const fn default_win_limit_count() -> u32 {
	DEFAULT_WIN_LIMIT
}

const fn default_attract_timeout() -> u32 {
	DEFAULT_ATTRACT_TIMEOUT_MINUTES
}

const fn default_sound_volume() -> f32 {
	0.5
}

const fn default_theme() -> Theme {
	Theme::Dark
}

const fn default_true() -> bool {
	true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
	/// Salted SHA-256 of the admin PIN, lowercase hex. The plaintext PIN is
	/// never stored or returned.
	pub pin_hash: String,
	pub table_name: String,
	#[serde(default = "default_no_show_timeout")]
	pub no_show_timeout_seconds: u32,
	#[serde(default = "default_hold_max_minutes")]
	pub hold_max_minutes: u32,
	#[serde(default)]
	pub win_limit_enabled: bool,
	#[serde(default = "default_win_limit_count")]
	pub win_limit_count: u32,
	#[serde(default = "default_attract_timeout")]
	pub attract_mode_timeout_minutes: u32,
	#[serde(default = "default_true")]
	pub sound_enabled: bool,
	#[serde(default = "default_sound_volume")]
	pub sound_volume: f32,
	#[serde(default)]
	pub house_rules: HouseRules,
	#[serde(default = "default_theme")]
	pub theme: Theme,
}

impl Settings {
	pub fn new(pin_hash: String, table_name: String) -> Self {
		Self {
			pin_hash,
			table_name,
			no_show_timeout_seconds: default_no_show_timeout(),
			hold_max_minutes: default_hold_max_minutes(),
			win_limit_enabled: false,
			win_limit_count: default_win_limit_count(),
			attract_mode_timeout_minutes: default_attract_timeout(),
			sound_enabled: true,
			sound_volume: default_sound_volume(),
			house_rules: HouseRules::default(),
			theme: default_theme(),
		}
	}

	/// Shallow field merge with one designated deep-merged subtree
	/// (`houseRules`). Absent patch fields leave the current value untouched.
	pub fn apply(&mut self, patch: SettingsPatch) {
		if let Some(pin_hash) = patch.pin_hash {
			self.pin_hash = pin_hash;
		}
		if let Some(table_name) = patch.table_name {
			self.table_name = table_name;
		}
		if let Some(secs) = patch.no_show_timeout_seconds {
			self.no_show_timeout_seconds = secs;
		}
		if let Some(mins) = patch.hold_max_minutes {
			self.hold_max_minutes = mins;
		}
		if let Some(enabled) = patch.win_limit_enabled {
			self.win_limit_enabled = enabled;
		}
		if let Some(count) = patch.win_limit_count {
			self.win_limit_count = count;
		}
		if let Some(mins) = patch.attract_mode_timeout_minutes {
			self.attract_mode_timeout_minutes = mins;
		}
		if let Some(enabled) = patch.sound_enabled {
			self.sound_enabled = enabled;
		}
		if let Some(volume) = patch.sound_volume {
			self.sound_volume = volume.clamp(0.0, 1.0);
		}
		if let Some(rules) = patch.house_rules {
			if let Some(break_rule) = rules.break_rule {
				self.house_rules.break_rule = break_rule;
			}
			if let Some(foul_rule) = rules.foul_rule {
				self.house_rules.foul_rule = foul_rule;
			}
			if let Some(black_spot) = rules.black_spot_rule {
				self.house_rules.black_spot_rule = black_spot;
			}
		}
		if let Some(theme) = patch.theme {
			self.theme = theme;
		}
	}
}

/// Partial settings update. `pin_hash` is already hashed by the coordinator;
/// plaintext PINs never reach this type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
	pub pin_hash: Option<String>,
	pub table_name: Option<String>,
	pub no_show_timeout_seconds: Option<u32>,
	pub hold_max_minutes: Option<u32>,
	pub win_limit_enabled: Option<bool>,
	pub win_limit_count: Option<u32>,
	pub attract_mode_timeout_minutes: Option<u32>,
	pub sound_enabled: Option<bool>,
	pub sound_volume: Option<f32>,
	pub house_rules: Option<HouseRulesPatch>,
	pub theme: Option<Theme>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseRulesPatch {
	pub break_rule: Option<BreakRule>,
	pub foul_rule: Option<FoulRule>,
	pub black_spot_rule: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
	pub id: String,
	/// One name for singles/challenge/killer/tournament entries, two for
	/// doubles.
	pub player_names: Vec<String>,
	pub joined_at: i64,
	pub status: QueueStatus,
	pub hold_until: Option<i64>,
	pub no_show_deadline: Option<i64>,
	pub game_mode: GameMode,
	/// playerName -> opaque user id, for lifetime-stats attribution.
	#[serde(default)]
	pub user_ids: HashMap<String, String>,
}

impl QueueEntry {
	pub fn new(player_names: Vec<String>, game_mode: GameMode, user_ids: HashMap<String, String>, now: i64) -> Self {
		Self {
			id: fresh_id(),
			player_names,
			joined_at: now,
			status: QueueStatus::Waiting,
			hold_until: None,
			no_show_deadline: None,
			game_mode,
			user_ids,
		}
	}

	pub fn is_waiting(&self) -> bool {
		self.status == QueueStatus::Waiting
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePlayer {
	pub name: String,
	pub side: Side,
	pub queue_entry_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillerPlayer {
	pub name: String,
	pub lives: u8,
	pub is_eliminated: bool,
}

/// Killer is a multi-player elimination mode. Everyone starts with
/// [`KILLER_DEFAULT_LIVES`]; a lost frame costs a life; the last survivor
/// wins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillerState {
	pub players: Vec<KillerPlayer>,
	pub round: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentFormat {
	Knockout,
	RoundRobin,
	GroupKnockout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStage {
	Group,
	Knockout,
	Complete,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
	pub winner: String,
	pub reported_at: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentMatch {
	pub id: String,
	pub player1: Option<String>,
	pub player2: Option<String>,
	pub is_bye: bool,
	pub frames: Vec<Frame>,
	pub winner: Option<String>,
	pub race_to: u8,
	pub stage: TournamentStage,
	pub group_index: Option<usize>,
	pub round_index: usize,
	pub match_index: usize,
	pub feeds_into: Option<String>,
	pub feeds_slot: Option<u8>,
}

impl TournamentMatch {
	pub fn frame_wins(&self, name: &str) -> usize {
		self.frames.iter().filter(|f| f.winner == name).count()
	}

	pub fn has_player(&self, name: &str) -> bool {
		self.player1.as_deref() == Some(name) || self.player2.as_deref() == Some(name)
	}

	pub fn is_playable(&self) -> bool {
		!self.is_bye && self.winner.is_none() && self.player1.is_some() && self.player2.is_some()
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentState {
	pub format: TournamentFormat,
	pub race_to: u8,
	pub player_names: Vec<String>,
	pub matches: Vec<TournamentMatch>,
	/// Group membership, for `group_knockout` and `round_robin`.
	pub groups: Vec<Vec<String>>,
	pub current_match_id: Option<String>,
	pub stage: TournamentStage,
	pub winner: Option<String>,
	pub completed_match_count: u32,
	pub total_match_count: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentGame {
	pub id: String,
	pub mode: GameMode,
	pub started_at: i64,
	/// Empty for `mode=tournament`; the bracket tracks its own participants.
	pub players: Vec<GamePlayer>,
	pub killer_state: Option<KillerState>,
	pub tournament_state: Option<TournamentState>,
	/// Wins in a row for the current holder. Zero when the holder did not
	/// carry a streak into this game.
	pub consecutive_wins: u32,
	pub breaking_player: String,
}

impl CurrentGame {
	pub fn side_names(&self, side: Side) -> Vec<String> {
		self.players.iter().filter(|p| p.side == side).map(|p| p.name.clone()).collect()
	}

	pub fn entry_id_for_side(&self, side: Side) -> Option<&str> {
		self.players.iter().find(|p| p.side == side).map(|p| p.queue_entry_id.as_str())
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
	pub wins: u32,
	pub losses: u32,
	pub games_played: u32,
	pub current_streak: u32,
	pub best_streak: u32,
}

impl PlayerStats {
	pub fn win_rate(&self) -> f64 {
		if self.games_played == 0 {
			0.0
		} else {
			f64::from(self.wins) / f64::from(self.games_played)
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KingOfTable {
	pub name: String,
	pub consecutive_wins: u32,
	pub crowned_at: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
	pub games_played: u32,
	#[serde(default)]
	pub player_stats: HashMap<String, PlayerStats>,
	pub king_of_table: Option<KingOfTable>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
	pub started_at: i64,
	pub is_private: bool,
	/// Names allowed to join while the session is private.
	#[serde(default)]
	pub private_player_names: Vec<String>,
}

impl SessionState {
	pub fn new(now: i64) -> Self {
		Self { started_at: now, is_private: false, private_player_names: Vec::new() }
	}
}

/// The single document representing one physical pool table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
	pub id: String,
	/// 10-char human code, `CHALK-XXXX`, unique across tables.
	pub short_code: String,
	pub name: String,
	pub venue_name: String,
	pub venue_id: Option<String>,
	pub status: TableStatus,
	pub created_at: i64,
	pub last_active_at: i64,
	pub idle_since: Option<i64>,
	pub settings: Settings,
	pub queue: Vec<QueueEntry>,
	pub current_game: Option<CurrentGame>,
	pub session_stats: SessionStats,
	/// Most-recent-first, deduplicated, capped at [`MAX_RECENT_NAMES`].
	pub recent_names: Vec<String>,
	pub session: SessionState,
}

impl Table {
	pub fn new(short_code: String, name: String, venue_name: String, pin_hash: String, now: i64) -> Self {
		Self {
			id: fresh_id(),
			short_code,
			name: name.clone(),
			venue_name,
			venue_id: None,
			status: TableStatus::Idle,
			created_at: now,
			last_active_at: now,
			idle_since: Some(now),
			settings: Settings::new(pin_hash, name),
			queue: Vec::new(),
			current_game: None,
			session_stats: SessionStats::default(),
			recent_names: Vec::new(),
			session: SessionState::new(now),
		}
	}

	pub fn entry(&self, entry_id: &str) -> Option<&QueueEntry> {
		self.queue.iter().find(|e| e.id == entry_id)
	}

	pub fn entry_mut(&mut self, entry_id: &str) -> Option<&mut QueueEntry> {
		self.queue.iter_mut().find(|e| e.id == entry_id)
	}

	pub fn waiting(&self) -> impl Iterator<Item = &QueueEntry> {
		self.queue.iter().filter(|e| e.is_waiting())
	}

	/// Recompute `status`/`idleSince` from the session, queue and game.
	pub fn refresh_status(&mut self, now: i64) {
		if self.session.is_private {
			self.status = TableStatus::Private;
			self.idle_since = None;
		} else if self.current_game.is_some() || !self.queue.is_empty() {
			self.status = TableStatus::Active;
			self.idle_since = None;
		} else {
			if self.status != TableStatus::Idle {
				self.idle_since = Some(now);
			}
			self.status = TableStatus::Idle;
		}
	}

	/// Stamp activity and refresh the derived status. Called by the
	/// coordinator after every accepted mutation.
	pub fn touch(&mut self, now: i64) {
		self.last_active_at = now;
		self.refresh_status(now);
	}
}

/// Payload for adding a party to the queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
	pub player_names: Vec<String>,
	pub game_mode: GameMode,
	#[serde(default)]
	pub user_ids: HashMap<String, String>,
}

/// A reported outcome for a singles/doubles/challenge game.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
	pub winning_side: Side,
	pub winner_names: Vec<String>,
}

/// Append-only record of one completed game, child of a `Table`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameHistoryRecord {
	pub id: String,
	pub table_id: String,
	pub mode: GameMode,
	pub players: Vec<GamePlayer>,
	pub winner: Vec<String>,
	pub winner_side: Option<Side>,
	pub started_at: i64,
	pub ended_at: i64,
	pub duration: i64,
	pub consecutive_wins: u32,
	pub killer_state: Option<KillerState>,
	pub tournament_state: Option<TournamentState>,
	/// playerName -> uid for the players known to be signed in.
	#[serde(default)]
	pub player_uids: HashMap<String, String>,
	/// Flat uid list for "games involving user X" index queries.
	#[serde(default)]
	pub player_uid_list: Vec<String>,
	pub venue_name: String,
}

/// One deduplicated per-user outcome of a game, input to the lifetime-stats
/// batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResult {
	pub user_id: String,
	pub won: bool,
	pub mode: GameMode,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeStats {
	pub wins: u32,
	pub losses: u32,
	pub games_played: u32,
}

/// Lifetime per-user aggregate, stored on the user profile document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifetimeStats {
	pub games_played: u32,
	pub wins: u32,
	pub losses: u32,
	pub current_streak: u32,
	pub best_streak: u32,
	pub last_game_at: Option<i64>,
	#[serde(default)]
	pub by_mode: HashMap<GameMode, ModeStats>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
	pub id: String,
	pub name: String,
	pub owner_id: String,
	pub owner_name: String,
	pub created_at: i64,
	#[serde(default)]
	pub table_ids: Vec<String>,
	pub logo_url: Option<String>,
}

impl Venue {
	pub fn new(name: String, owner_id: String, owner_name: String, logo_url: Option<String>, now: i64) -> Self {
		Self { id: fresh_id(), name, owner_id, owner_name, created_at: now, table_ids: Vec::new(), logo_url }
	}
}

/// Patch for `UpdateVenue`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenuePatch {
	pub name: Option<String>,
	pub logo_url: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn table() -> Table {
		Table::new("CHALK-ABCD".into(), "Main Table".into(), "The Crown".into(), "0".repeat(64), 1_000)
	}

	#[test]
	fn should_round_trip_table_document() {
		let mut t = table();
		t.queue.push(QueueEntry::new(vec!["Alice".into()], GameMode::Singles, HashMap::new(), 2_000));
		let json = serde_json::to_value(&t).unwrap();
		// nullable fields are explicit nulls, not omitted
		assert!(json.get("venueId").unwrap().is_null());
		assert!(json["queue"][0].get("holdUntil").unwrap().is_null());
		assert_eq!(json["queue"][0]["status"], "waiting");
		let back: Table = serde_json::from_value(json).unwrap();
		assert_eq!(t, back);
	}

	#[test]
	fn should_refresh_status_from_queue_and_session() {
		let mut t = table();
		assert_eq!(t.status, TableStatus::Idle);

		t.queue.push(QueueEntry::new(vec!["Alice".into()], GameMode::Singles, HashMap::new(), 2_000));
		t.touch(2_000);
		assert_eq!(t.status, TableStatus::Active);
		assert_eq!(t.idle_since, None);

		t.queue.clear();
		t.touch(3_000);
		assert_eq!(t.status, TableStatus::Idle);
		assert_eq!(t.idle_since, Some(3_000));

		t.session.is_private = true;
		t.touch(4_000);
		assert_eq!(t.status, TableStatus::Private);
	}

	#[test]
	fn should_deep_merge_house_rules_only() {
		let mut settings = Settings::new("hash".into(), "Main".into());
		settings.apply(SettingsPatch {
			win_limit_enabled: Some(true),
			house_rules: Some(HouseRulesPatch { break_rule: Some(BreakRule::LoserBreaks), ..Default::default() }),
			..Default::default()
		});
		assert!(settings.win_limit_enabled);
		assert_eq!(settings.house_rules.break_rule, BreakRule::LoserBreaks);
		// untouched subtree fields survive the merge
		assert_eq!(settings.house_rules.foul_rule, FoulRule::TwoShots);
		assert_eq!(settings.win_limit_count, DEFAULT_WIN_LIMIT);
	}

	#[test]
	fn should_clamp_sound_volume() {
		let mut settings = Settings::new("hash".into(), "Main".into());
		settings.apply(SettingsPatch { sound_volume: Some(7.5), ..Default::default() });
		assert!((settings.sound_volume - 1.0).abs() < f32::EPSILON);
	}
}
