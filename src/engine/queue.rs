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

//! Pure transitions over the waiting queue.
//!
//! Nothing here drives wall-clock time; expiry is computed only when invoked
//! with a caller-supplied `now`.

use hashbrown::HashSet;

use crate::{
	error::{ChalkError, Result},
	types::{GameMode, JoinRequest, QueueEntry, QueueStatus, Table, MAX_PLAYER_NAME_LEN, MAX_QUEUE_SIZE, MAX_RECENT_NAMES},
};

/// Append a new party to the queue and refresh the recent-names list.
/// Returns the id of the new entry.
///
/// Name comparison is case-sensitive and exact; normalization is the
/// caller's responsibility.
pub fn add_to_queue(table: &mut Table, req: JoinRequest, now: i64) -> Result<String> {
	if table.queue.len() >= MAX_QUEUE_SIZE {
		return Err(ChalkError::QueueFull);
	}
	validate_names(&req.player_names, req.game_mode)?;

	let queued: HashSet<&str> =
		table.queue.iter().flat_map(|e| e.player_names.iter()).map(String::as_str).collect();
	if let Some(name) = req.player_names.iter().find(|n| queued.contains(n.as_str())) {
		return Err(ChalkError::Duplicate(name.clone()));
	}
	drop(queued);

	if table.session.is_private
		&& req.player_names.iter().any(|n| !table.session.private_player_names.contains(n))
	{
		return Err(ChalkError::PrivateSessionForbidden);
	}

	let entry = QueueEntry::new(req.player_names.clone(), req.game_mode, req.user_ids, now);
	let id = entry.id.clone();
	table.queue.push(entry);
	remember_names(&mut table.recent_names, &req.player_names);
	Ok(id)
}

fn validate_names(names: &[String], mode: GameMode) -> Result<()> {
	if names.is_empty() {
		return Err(ChalkError::InvalidInput("at least one player name is required".into()));
	}
	if let Some(name) = names.iter().find(|n| n.trim().is_empty()) {
		return Err(ChalkError::InvalidInput(format!("blank player name {:?}", name)));
	}
	if let Some(name) = names.iter().find(|n| n.chars().count() > MAX_PLAYER_NAME_LEN) {
		return Err(ChalkError::InvalidInput(format!("player name too long: {}", name)));
	}
	if names.len() == 2 && names[0] == names[1] {
		return Err(ChalkError::Duplicate(names[0].clone()));
	}
	match mode {
		GameMode::Doubles if names.len() != 2 => Err(ChalkError::InvalidInput("doubles takes exactly two names".into())),
		GameMode::Doubles => Ok(()),
		_ if names.len() != 1 => Err(ChalkError::InvalidInput(format!("{:?} takes exactly one name", mode))),
		_ => Ok(()),
	}
}

/// Prepend `names`, deduplicate keeping the most recent occurrence, cap.
pub(crate) fn remember_names(recent: &mut Vec<String>, names: &[String]) {
	let mut merged: Vec<String> = names.to_vec();
	merged.extend(recent.drain(..));
	let mut seen: HashSet<String> = HashSet::with_capacity(merged.len());
	*recent = merged.into_iter().filter(|n| seen.insert(n.clone())).take(MAX_RECENT_NAMES).collect();
}

/// Remove the entry if present. Idempotent.
pub fn remove_from_queue(table: &mut Table, entry_id: &str) {
	table.queue.retain(|e| e.id != entry_id);
}

/// Splice-move the entry to `new_index`, clamped to the queue bounds.
/// Idempotent; a no-op for an unknown entry.
pub fn reorder_queue(table: &mut Table, entry_id: &str, new_index: usize) {
	let from = match table.queue.iter().position(|e| e.id == entry_id) {
		Some(i) => i,
		None => return,
	};
	let entry = table.queue.remove(from);
	let to = new_index.min(table.queue.len());
	table.queue.insert(to, entry);
}

/// Put the entry on hold until `now + holdMaxMinutes`. No-op if absent.
pub fn hold_position(table: &mut Table, entry_id: &str, now: i64) {
	let hold_minutes = i64::from(table.settings.hold_max_minutes);
	if let Some(entry) = table.entry_mut(entry_id) {
		entry.status = QueueStatus::OnHold;
		entry.hold_until = Some(now + hold_minutes * 60_000);
		entry.no_show_deadline = None;
	}
}

/// Release a held entry back to waiting. No-op if absent.
pub fn unhold_position(table: &mut Table, entry_id: &str) {
	if let Some(entry) = table.entry_mut(entry_id) {
		entry.status = QueueStatus::Waiting;
		entry.hold_until = None;
	}
}

/// Drop every held entry whose hold has lapsed.
pub fn expire_held_entries(table: &mut Table, now: i64) {
	table.queue.retain(|e| match (e.status, e.hold_until) {
		(QueueStatus::OnHold, Some(deadline)) => deadline >= now,
		_ => true,
	});
}

/// Pull the entry out, clear its call deadline, and append it at the end as
/// waiting.
pub fn move_to_back(queue: &mut Vec<QueueEntry>, entry_id: &str) {
	if let Some(from) = queue.iter().position(|e| e.id == entry_id) {
		let mut entry = queue.remove(from);
		entry.status = QueueStatus::Waiting;
		entry.no_show_deadline = None;
		entry.hold_until = None;
		queue.push(entry);
	}
}

/// Attach a signed-in user id to one of the entry's names, for lifetime-stats
/// attribution.
pub fn claim_queue_spot(table: &mut Table, entry_id: &str, player_name: &str, user_id: &str) -> Result<()> {
	let entry = table.entry_mut(entry_id).ok_or_else(|| ChalkError::NotFound(format!("queue entry {}", entry_id)))?;
	if !entry.player_names.iter().any(|n| n == player_name) {
		return Err(ChalkError::InvalidInput(format!("{} is not on this queue entry", player_name)));
	}
	entry.user_ids.insert(player_name.to_string(), user_id.to_string());
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;
	use crate::types::Table;

	fn table() -> Table {
		Table::new("CHALK-TEST".into(), "Main".into(), "The Crown".into(), "0".repeat(64), 0)
	}

	fn join(names: &[&str], mode: GameMode) -> JoinRequest {
		JoinRequest {
			player_names: names.iter().map(|s| s.to_string()).collect(),
			game_mode: mode,
			user_ids: HashMap::new(),
		}
	}

	#[test]
	fn should_add_and_track_recent_names() {
		let mut t = table();
		add_to_queue(&mut t, join(&["Alice"], GameMode::Singles), 1).unwrap();
		add_to_queue(&mut t, join(&["Bob", "Cara"], GameMode::Doubles), 2).unwrap();
		assert_eq!(t.queue.len(), 2);
		assert_eq!(t.recent_names, vec!["Bob", "Cara", "Alice"]);
		assert!(t.queue.iter().all(|e| e.is_waiting() && e.hold_until.is_none() && e.no_show_deadline.is_none()));
	}

	#[test]
	fn should_reject_duplicates_across_entries() {
		let mut t = table();
		add_to_queue(&mut t, join(&["Alice"], GameMode::Singles), 1).unwrap();
		let err = add_to_queue(&mut t, join(&["Alice", "Bob"], GameMode::Doubles), 2).unwrap_err();
		assert!(matches!(err, ChalkError::Duplicate(_)));
		// case-sensitive on purpose
		add_to_queue(&mut t, join(&["alice"], GameMode::Singles), 3).unwrap();
	}

	#[test]
	fn should_enforce_caps_and_name_shape() {
		let mut t = table();
		for i in 0..MAX_QUEUE_SIZE {
			add_to_queue(&mut t, join(&[&format!("P{}", i)], GameMode::Singles), i as i64).unwrap();
		}
		assert!(matches!(add_to_queue(&mut t, join(&["Z"], GameMode::Singles), 99), Err(ChalkError::QueueFull)));

		let mut t = table();
		assert!(matches!(add_to_queue(&mut t, join(&[], GameMode::Singles), 1), Err(ChalkError::InvalidInput(_))));
		let long = "x".repeat(MAX_PLAYER_NAME_LEN + 1);
		assert!(matches!(add_to_queue(&mut t, join(&[&long], GameMode::Singles), 1), Err(ChalkError::InvalidInput(_))));
		assert!(matches!(
			add_to_queue(&mut t, join(&["Solo"], GameMode::Doubles), 1),
			Err(ChalkError::InvalidInput(_))
		));
		assert!(matches!(
			add_to_queue(&mut t, join(&["A", "B"], GameMode::Singles), 1),
			Err(ChalkError::InvalidInput(_))
		));
	}

	#[test]
	fn should_enforce_private_session_allow_list() {
		let mut t = table();
		t.session.is_private = true;
		t.session.private_player_names = vec!["Alice".into()];
		add_to_queue(&mut t, join(&["Alice"], GameMode::Singles), 1).unwrap();
		assert!(matches!(
			add_to_queue(&mut t, join(&["Mallory"], GameMode::Singles), 2),
			Err(ChalkError::PrivateSessionForbidden)
		));
	}

	#[test]
	fn should_cap_recent_names_at_fifty() {
		let mut t = table();
		for i in 0..MAX_RECENT_NAMES + 10 {
			let name = format!("P{}", i);
			let id = add_to_queue(&mut t, join(&[&name], GameMode::Singles), i as i64).unwrap();
			remove_from_queue(&mut t, &id);
		}
		assert_eq!(t.recent_names.len(), MAX_RECENT_NAMES);
		assert_eq!(t.recent_names[0], format!("P{}", MAX_RECENT_NAMES + 9));
	}

	#[test]
	fn should_remove_idempotently() {
		let mut t = table();
		let id = add_to_queue(&mut t, join(&["Alice"], GameMode::Singles), 1).unwrap();
		remove_from_queue(&mut t, &id);
		remove_from_queue(&mut t, &id);
		assert!(t.queue.is_empty());
	}

	#[test]
	fn should_reorder_with_clamping() {
		let mut t = table();
		let a = add_to_queue(&mut t, join(&["A"], GameMode::Singles), 1).unwrap();
		add_to_queue(&mut t, join(&["B"], GameMode::Singles), 2).unwrap();
		add_to_queue(&mut t, join(&["C"], GameMode::Singles), 3).unwrap();

		reorder_queue(&mut t, &a, 99);
		let order: Vec<&str> = t.queue.iter().map(|e| e.player_names[0].as_str()).collect();
		assert_eq!(order, vec!["B", "C", "A"]);

		reorder_queue(&mut t, &a, 0);
		let order: Vec<&str> = t.queue.iter().map(|e| e.player_names[0].as_str()).collect();
		assert_eq!(order, vec!["A", "B", "C"]);

		reorder_queue(&mut t, "missing", 1);
		assert_eq!(t.queue.len(), 3);
	}

	#[test]
	fn should_hold_unhold_and_expire() {
		let mut t = table();
		let id = add_to_queue(&mut t, join(&["Alice"], GameMode::Singles), 1).unwrap();

		hold_position(&mut t, &id, 10_000);
		let entry = t.entry(&id).unwrap();
		assert_eq!(entry.status, QueueStatus::OnHold);
		assert_eq!(entry.hold_until, Some(10_000 + 15 * 60_000));

		// hold then unhold returns the queue to the same shape
		unhold_position(&mut t, &id);
		let entry = t.entry(&id).unwrap();
		assert_eq!(entry.status, QueueStatus::Waiting);
		assert_eq!(entry.hold_until, None);
		assert_eq!(entry.joined_at, 1);

		hold_position(&mut t, &id, 10_000);
		expire_held_entries(&mut t, 10_000 + 15 * 60_000 + 1);
		assert!(t.queue.is_empty());
	}

	#[test]
	fn should_move_to_back_and_clear_deadlines() {
		let mut t = table();
		let a = add_to_queue(&mut t, join(&["A"], GameMode::Singles), 1).unwrap();
		add_to_queue(&mut t, join(&["B"], GameMode::Singles), 2).unwrap();
		t.entry_mut(&a).unwrap().status = QueueStatus::Called;
		t.entry_mut(&a).unwrap().no_show_deadline = Some(5_000);

		move_to_back(&mut t.queue, &a);
		let last = t.queue.last().unwrap();
		assert_eq!(last.id, a);
		assert_eq!(last.status, QueueStatus::Waiting);
		assert_eq!(last.no_show_deadline, None);
	}

	#[test]
	fn should_claim_spot_for_known_name_only() {
		let mut t = table();
		let id = add_to_queue(&mut t, join(&["Alice"], GameMode::Singles), 1).unwrap();
		claim_queue_spot(&mut t, &id, "Alice", "uid-1").unwrap();
		assert_eq!(t.entry(&id).unwrap().user_ids.get("Alice").map(String::as_str), Some("uid-1"));
		assert!(matches!(claim_queue_spot(&mut t, &id, "Bob", "uid-2"), Err(ChalkError::InvalidInput(_))));
		assert!(matches!(claim_queue_spot(&mut t, "missing", "Alice", "uid-1"), Err(ChalkError::NotFound(_))));
	}
}
