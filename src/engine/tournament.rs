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

//! Pure bracket/group schedule generation and per-frame advancement.
//!
//! Generation is deterministic: the same players in the same order always
//! produce an identical schedule. Match ids are structural (`KO-R0-M0`,
//! `G1-R2-M0`, `KO-FINAL`), never random.

use std::cmp::Ordering;

use hashbrown::HashSet;
use itertools::Itertools;

use crate::{
	error::{ChalkError, Result},
	types::{
		Frame, TournamentFormat, TournamentMatch, TournamentStage, TournamentState, MAX_TOURNAMENT_PLAYERS,
		MIN_TOURNAMENT_PLAYERS, RACE_TO_MAX, RACE_TO_MIN,
	},
};

/// One row of a group (or round-robin) standings table.
#[derive(Clone, Debug, PartialEq)]
pub struct Standing {
	pub name: String,
	pub played: u32,
	pub points: u32,
	pub frames_won: u32,
	pub frames_lost: u32,
}

impl Standing {
	pub fn frame_diff(&self) -> i64 {
		i64::from(self.frames_won) - i64::from(self.frames_lost)
	}
}

/// Generate a fresh tournament.
pub fn generate(format: TournamentFormat, players: &[String], race_to: u8) -> Result<TournamentState> {
	if !(RACE_TO_MIN..=RACE_TO_MAX).contains(&race_to) {
		return Err(ChalkError::InvalidInput(format!("raceTo must be {}..={}", RACE_TO_MIN, RACE_TO_MAX)));
	}
	if players.len() < MIN_TOURNAMENT_PLAYERS {
		return Err(ChalkError::InsufficientPlayers);
	}
	if players.len() > MAX_TOURNAMENT_PLAYERS {
		return Err(ChalkError::InvalidInput(format!("at most {} players", MAX_TOURNAMENT_PLAYERS)));
	}
	let unique: HashSet<&str> = players.iter().map(String::as_str).collect();
	if unique.len() != players.len() {
		return Err(ChalkError::InvalidInput("duplicate player name".into()));
	}

	let mut state = match format {
		TournamentFormat::Knockout => TournamentState {
			format,
			race_to,
			player_names: players.to_vec(),
			matches: knockout_bracket(players, race_to),
			groups: Vec::new(),
			current_match_id: None,
			stage: TournamentStage::Knockout,
			winner: None,
			completed_match_count: 0,
			total_match_count: 0,
		},
		TournamentFormat::RoundRobin => {
			let matches = group_schedule(0, players, race_to);
			TournamentState {
				format,
				race_to,
				player_names: players.to_vec(),
				matches,
				groups: vec![players.to_vec()],
				current_match_id: None,
				stage: TournamentStage::Group,
				winner: None,
				completed_match_count: 0,
				total_match_count: 0,
			}
		}
		TournamentFormat::GroupKnockout => {
			let groups = snake_groups(players, group_count(players.len()));
			let mut matches = interleaved_group_schedule(&groups, race_to);
			// the knockout stage is pre-built with empty slots and filled by
			// crossover seeding once every group completes
			let advancers = groups.len() * 2;
			matches.extend(knockout_shell(advancers.next_power_of_two(), race_to));
			TournamentState {
				format,
				race_to,
				player_names: players.to_vec(),
				matches,
				groups,
				current_match_id: None,
				stage: TournamentStage::Group,
				winner: None,
				completed_match_count: 0,
				total_match_count: 0,
			}
		}
	};

	settle(&mut state);
	Ok(state)
}

/// Score one frame of the current match; closing a match cascades winners,
/// byes, stage transitions and the champion check.
pub fn report_frame(state: &mut TournamentState, winner: &str, now: i64) -> Result<()> {
	if state.stage == TournamentStage::Complete {
		return Err(ChalkError::InvalidInput("tournament is complete".into()));
	}
	let current_id =
		state.current_match_id.clone().ok_or_else(|| ChalkError::InvalidInput("no playable match".into()))?;
	let race_to = state.race_to as usize;

	let closed = {
		let m = state
			.matches
			.iter_mut()
			.find(|m| m.id == current_id)
			.ok_or_else(|| ChalkError::NotFound(format!("match {}", current_id)))?;
		if !m.has_player(winner) {
			return Err(ChalkError::InvalidInput(format!("{} is not playing match {}", winner, m.id)));
		}
		m.frames.push(Frame { winner: winner.to_string(), reported_at: now });
		if m.frame_wins(winner) >= race_to {
			m.winner = Some(winner.to_string());
			true
		} else {
			false
		}
	};

	if closed {
		settle(state);
	}
	Ok(())
}

/// Standings of one group: points desc (win = 2), frame difference desc,
/// frames won desc. `head_to_head_ordering` is the documented tiebreak hook.
pub fn group_standings(state: &TournamentState, group_index: usize) -> Vec<Standing> {
	let names = state.groups.get(group_index).cloned().unwrap_or_default();
	let mut rows: Vec<Standing> = names
		.into_iter()
		.map(|name| Standing { name, played: 0, points: 0, frames_won: 0, frames_lost: 0 })
		.collect();

	for m in state.matches.iter().filter(|m| m.group_index == Some(group_index)) {
		let winner = match &m.winner {
			Some(w) => w.clone(),
			None => continue,
		};
		let (p1, p2) = match (&m.player1, &m.player2) {
			(Some(a), Some(b)) => (a.clone(), b.clone()),
			_ => continue,
		};
		let p1_frames = m.frame_wins(&p1) as u32;
		let p2_frames = m.frame_wins(&p2) as u32;
		for row in rows.iter_mut() {
			if row.name == p1 {
				row.played += 1;
				row.frames_won += p1_frames;
				row.frames_lost += p2_frames;
			} else if row.name == p2 {
				row.played += 1;
				row.frames_won += p2_frames;
				row.frames_lost += p1_frames;
			}
			if row.name == winner {
				row.points += 2;
			}
		}
	}

	rows.sort_by(|a, b| {
		b.points
			.cmp(&a.points)
			.then_with(|| b.frame_diff().cmp(&a.frame_diff()))
			.then_with(|| b.frames_won.cmp(&a.frames_won))
			.then_with(|| head_to_head_ordering(a, b))
			.then_with(|| a.name.cmp(&b.name))
	});
	rows
}

/// Tiebreak hook between two tied standings rows. Deliberately returns
/// `Equal`; refine without disturbing the order of non-ties.
pub fn head_to_head_ordering(_a: &Standing, _b: &Standing) -> Ordering {
	Ordering::Equal
}

// ---- generation internals ----

fn group_count(player_count: usize) -> usize {
	match player_count {
		0..=4 => 1,
		5..=8 => 2,
		9..=10 => 3,
		_ => 4,
	}
}

/// Distribute seeds across groups left-to-right, then right-to-left,
/// alternating.
fn snake_groups(players: &[String], count: usize) -> Vec<Vec<String>> {
	let mut groups: Vec<Vec<String>> = vec![Vec::new(); count];
	for (pass, chunk) in players.chunks(count).enumerate() {
		for (i, player) in chunk.iter().enumerate() {
			let g = if pass % 2 == 0 { i } else { count - 1 - i };
			groups[g].push(player.clone());
		}
	}
	groups
}

/// Recursive seed order for a power-of-two bracket: 1 meets N, 2 meets N-1,
/// and so on down the halves. 1-based seeds.
fn seed_order(size: usize) -> Vec<usize> {
	let mut order = vec![1];
	let mut n = 1;
	while n < size {
		n *= 2;
		order = order.into_iter().flat_map(|s| [s, n + 1 - s]).collect();
	}
	order
}

fn knockout_id(round: usize, index: usize, rounds: usize) -> String {
	if round + 1 == rounds {
		"KO-FINAL".to_string()
	} else {
		format!("KO-R{}-M{}", round, index)
	}
}

fn knockout_match(round: usize, index: usize, rounds: usize, race_to: u8) -> TournamentMatch {
	let feeds_into = if round + 1 == rounds { None } else { Some(knockout_id(round + 1, index / 2, rounds)) };
	let feeds_slot = feeds_into.as_ref().map(|_| 1 + (index % 2) as u8);
	TournamentMatch {
		id: knockout_id(round, index, rounds),
		player1: None,
		player2: None,
		is_bye: false,
		frames: Vec::new(),
		winner: None,
		race_to,
		stage: TournamentStage::Knockout,
		group_index: None,
		round_index: round,
		match_index: index,
		feeds_into,
		feeds_slot,
	}
}

/// A full bracket with empty slots: `size` must be a power of two ≥ 2.
fn knockout_shell(size: usize, race_to: u8) -> Vec<TournamentMatch> {
	let rounds = size.trailing_zeros() as usize;
	let mut matches = Vec::new();
	for round in 0..rounds {
		let in_round = size >> (round + 1);
		for index in 0..in_round {
			matches.push(knockout_match(round, index, rounds, race_to));
		}
	}
	matches
}

/// Bracket for the given players in seeding order. Players beyond the seeded
/// count leave their opponent's slot empty, which `settle` turns into a bye.
fn knockout_bracket(players: &[String], race_to: u8) -> Vec<TournamentMatch> {
	let size = players.len().next_power_of_two();
	let order = seed_order(size);
	let mut matches = knockout_shell(size, race_to);
	for (i, m) in matches.iter_mut().enumerate().take(size / 2) {
		m.player1 = players.get(order[2 * i] - 1).cloned();
		m.player2 = players.get(order[2 * i + 1] - 1).cloned();
	}
	matches
}

/// Circle-method round robin for one group. With an odd player count a
/// placeholder joins and its pairings are dropped.
fn round_robin_rounds(names: &[String]) -> Vec<Vec<(String, String)>> {
	let mut ring: Vec<Option<&String>> = names.iter().map(Some).collect();
	if ring.len() % 2 != 0 {
		ring.push(None);
	}
	let n = ring.len();
	let mut rounds = Vec::with_capacity(n - 1);
	for _ in 0..n - 1 {
		let mut pairs = Vec::with_capacity(n / 2);
		for i in 0..n / 2 {
			if let (Some(a), Some(b)) = (ring[i], ring[n - 1 - i]) {
				pairs.push((a.clone(), b.clone()));
			}
		}
		rounds.push(pairs);
		ring[1..].rotate_right(1);
	}
	rounds
}

fn group_schedule(group_index: usize, names: &[String], race_to: u8) -> Vec<TournamentMatch> {
	let mut matches = Vec::new();
	for (round, pairs) in round_robin_rounds(names).into_iter().enumerate() {
		for (index, (a, b)) in pairs.into_iter().enumerate() {
			matches.push(TournamentMatch {
				id: format!("G{}-R{}-M{}", group_index, round, index),
				player1: Some(a),
				player2: Some(b),
				is_bye: false,
				frames: Vec::new(),
				winner: None,
				race_to,
				stage: TournamentStage::Group,
				group_index: Some(group_index),
				round_index: round,
				match_index: index,
				feeds_into: None,
				feeds_slot: None,
			});
		}
	}
	matches
}

/// All groups' schedules, round-major so play rotates across groups.
fn interleaved_group_schedule(groups: &[Vec<String>], race_to: u8) -> Vec<TournamentMatch> {
	let per_group: Vec<Vec<TournamentMatch>> =
		groups.iter().enumerate().map(|(g, names)| group_schedule(g, names, race_to)).collect();
	let max_round = per_group.iter().flat_map(|ms| ms.iter().map(|m| m.round_index)).max().unwrap_or(0);
	let mut matches = Vec::new();
	for round in 0..=max_round {
		for ms in &per_group {
			matches.extend(ms.iter().filter(|m| m.round_index == round).cloned());
		}
	}
	matches
}

// ---- advancement internals ----

/// Drive the bracket to a fixpoint after any change: winners flow through
/// `feedsInto`, byes resolve, the group stage hands over to the knockout,
/// counters and the current match refresh, and a champion ends the
/// tournament.
fn settle(state: &mut TournamentState) {
	propagate(state);

	if state.stage == TournamentStage::Group
		&& state.format == TournamentFormat::GroupKnockout
		&& state.matches.iter().filter(|m| m.stage == TournamentStage::Group).all(|m| m.winner.is_some())
	{
		fill_knockout_from_groups(state);
		state.stage = TournamentStage::Knockout;
		propagate(state);
	}

	state.total_match_count = state.matches.iter().filter(|m| !m.is_bye).count() as u32;
	state.completed_match_count =
		state.matches.iter().filter(|m| !m.is_bye && m.winner.is_some()).count() as u32;

	check_complete(state);

	state.current_match_id = if state.stage == TournamentStage::Complete {
		None
	} else {
		let active = state.stage;
		state.matches.iter().find(|m| m.stage == active && m.is_playable()).map(|m| m.id.clone())
	};
}

/// Push winners into their next-round slots and resolve byes until nothing
/// changes. Byes only resolve while the knockout stage is live; a pre-built
/// shell waiting on group results is not a wall of byes.
fn propagate(state: &mut TournamentState) {
	let knockout_live = state.stage == TournamentStage::Knockout;
	loop {
		let mut changed = false;

		let flows: Vec<(String, u8, String)> = state
			.matches
			.iter()
			.filter_map(|m| match (&m.winner, &m.feeds_into, m.feeds_slot) {
				(Some(w), Some(target), Some(slot)) => Some((target.clone(), slot, w.clone())),
				_ => None,
			})
			.collect();
		for (target_id, slot, winner) in flows {
			if let Some(target) = state.matches.iter_mut().find(|m| m.id == target_id) {
				let slot_ref = if slot == 1 { &mut target.player1 } else { &mut target.player2 };
				if slot_ref.as_deref() != Some(winner.as_str()) {
					*slot_ref = Some(winner);
					changed = true;
				}
			}
		}

		if knockout_live {
			let pending: Vec<(String, u8)> = state
				.matches
				.iter()
				.filter(|m| m.winner.is_none())
				.filter_map(|m| m.feeds_into.clone().zip(m.feeds_slot))
				.collect();
			for i in 0..state.matches.len() {
				let (id, empty_slot) = {
					let m = &state.matches[i];
					if m.stage != TournamentStage::Knockout || m.winner.is_some() {
						continue;
					}
					let empty = match (&m.player1, &m.player2) {
						(Some(_), None) => 2u8,
						(None, Some(_)) => 1u8,
						_ => continue,
					};
					(m.id.clone(), empty)
				};
				// an empty slot nobody can still fill is a bye
				if !pending.iter().any(|(target, slot)| *target == id && *slot == empty_slot) {
					let m = &mut state.matches[i];
					m.is_bye = true;
					m.winner = if empty_slot == 2 { m.player1.clone() } else { m.player2.clone() };
					changed = true;
				}
			}
		}

		if !changed {
			break;
		}
	}
}

/// Crossover-seed the advancers into the pre-built knockout round.
fn fill_knockout_from_groups(state: &mut TournamentState) {
	let group_total = state.groups.len();
	let mut firsts = Vec::with_capacity(group_total);
	let mut seconds = Vec::with_capacity(group_total);
	for g in 0..group_total {
		let standings = group_standings(state, g);
		firsts.push(standings[0].name.clone());
		seconds.push(standings[1].name.clone());
	}

	let advancers = group_total * 2;
	let ko_size = advancers.next_power_of_two();
	let slots: Vec<Option<String>> = if advancers == ko_size {
		// exact fit: G_i winner meets the next group's runner-up
		(0..group_total)
			.flat_map(|i| [Some(firsts[i].clone()), Some(seconds[(i + 1) % group_total].clone())])
			.collect()
	} else {
		// uneven fit: winners seeded above crossed runners-up, byes on top
		let seeds: Vec<String> =
			firsts.iter().cloned().chain(seconds.iter().rev().cloned()).collect();
		seed_order(ko_size).into_iter().map(|seed| seeds.get(seed - 1).cloned()).collect()
	};

	let r0: Vec<String> = state
		.matches
		.iter()
		.filter(|m| m.stage == TournamentStage::Knockout && m.round_index == 0)
		.sorted_by_key(|m| m.match_index)
		.map(|m| m.id.clone())
		.collect();
	for (i, id) in r0.iter().enumerate() {
		if let Some(m) = state.matches.iter_mut().find(|m| m.id == *id) {
			m.player1 = slots.get(2 * i).cloned().flatten();
			m.player2 = slots.get(2 * i + 1).cloned().flatten();
		}
	}
}

fn check_complete(state: &mut TournamentState) {
	if state.stage == TournamentStage::Complete {
		return;
	}
	match state.format {
		TournamentFormat::Knockout | TournamentFormat::GroupKnockout => {
			let final_winner = state
				.matches
				.iter()
				.find(|m| m.id.ends_with("-FINAL"))
				.and_then(|m| m.winner.clone());
			if let Some(winner) = final_winner {
				state.winner = Some(winner);
				state.stage = TournamentStage::Complete;
			}
		}
		TournamentFormat::RoundRobin => {
			if state.matches.iter().all(|m| m.winner.is_some()) {
				state.winner = group_standings(state, 0).first().map(|s| s.name.clone());
				state.stage = TournamentStage::Complete;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn players(n: usize) -> Vec<String> {
		(0..n).map(|i| format!("P{}", i + 1)).collect()
	}

	fn play_out(state: &mut TournamentState, pick: impl Fn(&TournamentMatch) -> String) {
		let mut guard = 0;
		while let Some(id) = state.current_match_id.clone() {
			let m = state.matches.iter().find(|m| m.id == id).unwrap().clone();
			let winner = pick(&m);
			// frames go to the same player until the match closes
			while state.current_match_id.as_deref() == Some(id.as_str()) {
				report_frame(state, &winner, 1_000 + guard).unwrap();
				guard += 1;
				assert!(guard < 1_000, "tournament did not converge");
			}
		}
	}

	fn seed1(m: &TournamentMatch) -> String {
		m.player1.clone().unwrap()
	}

	#[test]
	fn should_build_a_seeded_knockout_with_byes() {
		let state = generate(TournamentFormat::Knockout, &players(5), 2).unwrap();
		assert_eq!(state.stage, TournamentStage::Knockout);

		// bracket of 8: 4 + 2 + 1 matches
		assert_eq!(state.matches.len(), 7);
		let r0: Vec<&TournamentMatch> = state.matches.iter().filter(|m| m.round_index == 0).collect();
		assert_eq!(r0[0].player1.as_deref(), Some("P1"));
		assert_eq!(r0[0].player2, None); // seed 8 is absent
		assert!(r0[0].is_bye);
		assert_eq!(r0[0].winner.as_deref(), Some("P1"));
		assert_eq!(r0[1].player1.as_deref(), Some("P4"));
		assert_eq!(r0[1].player2.as_deref(), Some("P5"));
		assert!(!r0[1].is_bye);

		// byes excluded from the totals
		assert_eq!(state.total_match_count, 4);
		assert_eq!(state.completed_match_count, 0);

		// bye winners already propagated into round 1
		let r1m0 = state.matches.iter().find(|m| m.id == "KO-R1-M0").unwrap();
		assert_eq!(r1m0.player1.as_deref(), Some("P1"));
	}

	#[test]
	fn should_generate_identical_brackets_twice() {
		let a = generate(TournamentFormat::Knockout, &players(6), 3).unwrap();
		let b = generate(TournamentFormat::Knockout, &players(6), 3).unwrap();
		assert_eq!(a.matches, b.matches);
	}

	#[test]
	fn should_link_feeds_with_even_odd_slots() {
		let state = generate(TournamentFormat::Knockout, &players(8), 1).unwrap();
		let r0: Vec<&TournamentMatch> = state.matches.iter().filter(|m| m.round_index == 0).collect();
		assert_eq!(r0[0].feeds_into.as_deref(), Some("KO-R1-M0"));
		assert_eq!(r0[0].feeds_slot, Some(1));
		assert_eq!(r0[1].feeds_into.as_deref(), Some("KO-R1-M0"));
		assert_eq!(r0[1].feeds_slot, Some(2));
		assert_eq!(r0[3].feeds_into.as_deref(), Some("KO-R1-M1"));
		let final_match = state.matches.iter().find(|m| m.id == "KO-FINAL").unwrap();
		assert_eq!(final_match.feeds_into, None);
	}

	#[test]
	fn should_race_to_n_and_crown_a_knockout_champion() {
		let mut state = generate(TournamentFormat::Knockout, &players(4), 2).unwrap();
		assert_eq!(state.current_match_id.as_deref(), Some("KO-R0-M0"));

		// a single frame does not close a race-to-2 match
		let first = state.current_match_id.clone().unwrap();
		let m = state.matches.iter().find(|m| m.id == first).unwrap().clone();
		report_frame(&mut state, m.player1.as_deref().unwrap(), 10).unwrap();
		assert_eq!(state.completed_match_count, 0);

		play_out(&mut state, seed1);
		assert_eq!(state.stage, TournamentStage::Complete);
		assert_eq!(state.winner.as_deref(), Some("P1"));
		assert_eq!(state.completed_match_count, state.total_match_count);
		assert_eq!(state.current_match_id, None);
	}

	#[test]
	fn should_reject_a_winner_not_in_the_match() {
		let mut state = generate(TournamentFormat::Knockout, &players(4), 2).unwrap();
		assert!(matches!(report_frame(&mut state, "Nobody", 1), Err(ChalkError::InvalidInput(_))));
	}

	#[test]
	fn should_schedule_round_robin_by_circle_method() {
		let state = generate(TournamentFormat::RoundRobin, &players(4), 1).unwrap();
		// 4 players: 3 rounds x 2 matches
		assert_eq!(state.matches.len(), 6);
		assert_eq!(state.total_match_count, 6);
		for p in players(4) {
			let appearances =
				state.matches.iter().filter(|m| m.has_player(&p)).count();
			assert_eq!(appearances, 3, "{} should play 3 matches", p);
		}

		// odd count drops the placeholder pairings
		let state = generate(TournamentFormat::RoundRobin, &players(5), 1).unwrap();
		assert_eq!(state.matches.len(), 10);
		assert!(state.matches.iter().all(|m| m.player1.is_some() && m.player2.is_some()));
	}

	#[test]
	fn should_pick_round_robin_winner_from_standings() {
		let mut state = generate(TournamentFormat::RoundRobin, &players(3), 1).unwrap();
		// P1 beats everyone, P2 beats P3
		play_out(&mut state, |m| {
			if m.has_player("P1") {
				"P1".to_string()
			} else if m.has_player("P2") {
				"P2".to_string()
			} else {
				seed1(m)
			}
		});
		assert_eq!(state.stage, TournamentStage::Complete);
		assert_eq!(state.winner.as_deref(), Some("P1"));
	}

	#[test]
	fn should_order_standings_by_points_diff_frames() {
		// P1 beats P2 2-0 and P3 2-1; P3 beats P2 2-0
		let mut state = generate(TournamentFormat::RoundRobin, &players(3), 2).unwrap();
		let mut at = 0;
		while state.stage != TournamentStage::Complete {
			let id = state.current_match_id.clone().unwrap();
			let m = state.matches.iter().find(|m| m.id == id).unwrap().clone();
			at += 10;
			if m.has_player("P1") && m.has_player("P3") {
				report_frame(&mut state, "P3", at).unwrap();
				report_frame(&mut state, "P1", at + 1).unwrap();
				report_frame(&mut state, "P1", at + 2).unwrap();
			} else if m.has_player("P1") {
				report_frame(&mut state, "P1", at).unwrap();
				report_frame(&mut state, "P1", at + 1).unwrap();
			} else {
				report_frame(&mut state, "P3", at).unwrap();
				report_frame(&mut state, "P3", at + 1).unwrap();
			}
		}

		let standings = group_standings(&state, 0);
		assert_eq!(standings[0].name, "P1");
		assert_eq!(standings[0].points, 4);
		assert_eq!(standings[0].frames_won, 4);
		assert_eq!(standings[0].frames_lost, 1);
		assert_eq!(standings[1].name, "P3");
		assert_eq!(standings[2].name, "P2");
		assert_eq!(state.winner.as_deref(), Some("P1"));
	}

	#[test]
	fn should_snake_seed_groups() {
		let groups = snake_groups(&players(8), 2);
		assert_eq!(groups[0], vec!["P1", "P4", "P5", "P8"]);
		assert_eq!(groups[1], vec!["P2", "P3", "P6", "P7"]);
	}

	#[test]
	fn should_transition_groups_to_crossover_knockout() {
		// 8 players split into 2 groups of 4
		let mut state = generate(TournamentFormat::GroupKnockout, &players(8), 1).unwrap();
		assert_eq!(state.groups.len(), 2);
		assert_eq!(state.stage, TournamentStage::Group);

		let group_matches = state.matches.iter().filter(|m| m.stage == TournamentStage::Group).count();
		assert_eq!(group_matches, 12); // 2 groups x C(4,2)
		// group matches + 2 semis + 1 final, no byes
		assert_eq!(state.total_match_count, 15);

		// lower player number wins every group frame
		while state.stage == TournamentStage::Group {
			let id = state.current_match_id.clone().unwrap();
			let m = state.matches.iter().find(|m| m.id == id).unwrap().clone();
			let p1 = m.player1.clone().unwrap();
			let p2 = m.player2.clone().unwrap();
			let winner = if number(&p1) < number(&p2) { p1 } else { p2 };
			report_frame(&mut state, &winner, 10).unwrap();
		}

		assert_eq!(state.stage, TournamentStage::Knockout);
		// group A = {P1,P4,P5,P8} -> 1st P1, 2nd P4; group B = {P2,P3,P6,P7} -> 1st P2, 2nd P3
		let semi0 = state.matches.iter().find(|m| m.id == "KO-R0-M0").unwrap();
		let semi1 = state.matches.iter().find(|m| m.id == "KO-R0-M1").unwrap();
		assert_eq!((semi0.player1.as_deref(), semi0.player2.as_deref()), (Some("P1"), Some("P3")));
		assert_eq!((semi1.player1.as_deref(), semi1.player2.as_deref()), (Some("P2"), Some("P4")));

		play_out(&mut state, |m| {
			let p1 = m.player1.clone().unwrap();
			let p2 = m.player2.clone().unwrap();
			if number(&p1) < number(&p2) {
				p1
			} else {
				p2
			}
		});
		assert_eq!(state.stage, TournamentStage::Complete);
		assert_eq!(state.winner.as_deref(), Some("P1"));
		assert_eq!(state.completed_match_count, 15);
	}

	#[test]
	fn should_put_six_advancers_into_an_eight_bracket() {
		// 9 players -> 3 groups -> 6 advancers -> byes for the top seeds
		let mut state = generate(TournamentFormat::GroupKnockout, &players(9), 1).unwrap();
		assert_eq!(state.groups.len(), 3);

		while state.stage == TournamentStage::Group {
			let id = state.current_match_id.clone().unwrap();
			let m = state.matches.iter().find(|m| m.id == id).unwrap().clone();
			let p1 = m.player1.clone().unwrap();
			let p2 = m.player2.clone().unwrap();
			let winner = if number(&p1) < number(&p2) { p1 } else { p2 };
			report_frame(&mut state, &winner, 10).unwrap();
		}

		assert_eq!(state.stage, TournamentStage::Knockout);
		let byes = state.matches.iter().filter(|m| m.is_bye).count();
		assert_eq!(byes, 2);
		// bye winners are already through to the semis
		let semis: Vec<&TournamentMatch> =
			state.matches.iter().filter(|m| m.stage == TournamentStage::Knockout && m.round_index == 1).collect();
		assert!(semis.iter().any(|m| m.player1.is_some() || m.player2.is_some()));

		play_out(&mut state, |m| {
			let p1 = m.player1.clone().unwrap();
			let p2 = m.player2.clone().unwrap();
			if number(&p1) < number(&p2) {
				p1
			} else {
				p2
			}
		});
		assert_eq!(state.stage, TournamentStage::Complete);
		assert_eq!(state.winner.as_deref(), Some("P1"));
	}

	#[test]
	fn should_validate_generation_inputs() {
		assert!(matches!(
			generate(TournamentFormat::Knockout, &players(2), 2),
			Err(ChalkError::InsufficientPlayers)
		));
		assert!(matches!(
			generate(TournamentFormat::Knockout, &players(17), 2),
			Err(ChalkError::InvalidInput(_))
		));
		assert!(matches!(
			generate(TournamentFormat::Knockout, &players(4), 0),
			Err(ChalkError::InvalidInput(_))
		));
		assert!(matches!(
			generate(TournamentFormat::Knockout, &players(4), 14),
			Err(ChalkError::InvalidInput(_))
		));
		let dupes = vec!["A".to_string(), "A".to_string(), "B".to_string()];
		assert!(matches!(
			generate(TournamentFormat::Knockout, &dupes, 2),
			Err(ChalkError::InvalidInput(_))
		));
	}

	fn number(name: &str) -> usize {
		name.trim_start_matches('P').parse().unwrap()
	}
}
