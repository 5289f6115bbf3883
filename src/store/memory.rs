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

//! In-process adapter: versioned documents behind one lock, with per-table
//! channel fan-out. Backs the test-suite and kiosk-local deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
	engine::stats,
	error::{ChalkError, Result},
	store::{Store, TableOp, TableUpdates, VenueOp},
	types::{GameHistoryRecord, LifetimeStats, Table, UserResult, Venue},
};

struct Versioned<T> {
	version: u64,
	value: T,
}

#[derive(Default)]
struct Inner {
	tables: HashMap<String, Versioned<Table>>,
	codes: HashMap<String, String>,
	venues: HashMap<String, Versioned<Venue>>,
	history: Vec<GameHistoryRecord>,
	users: HashMap<String, LifetimeStats>,
	watchers: HashMap<String, Vec<flume::Sender<Table>>>,
}

impl Inner {
	/// Commit a new table value: bump the version and push the snapshot to
	/// every live subscriber.
	fn commit_table(&mut self, table: Table) {
		let id = table.id.clone();
		if let Some(watchers) = self.watchers.get_mut(&id) {
			watchers.retain(|tx| tx.send(table.clone()).is_ok());
		}
		if let Some(doc) = self.tables.get_mut(&id) {
			doc.version += 1;
			doc.value = table;
		}
	}
}

/// All state behind one lock; the lock is the serialization point, so CAS
/// conflicts cannot occur here. The contract is still the optimistic one the
/// coordinator expects.
#[derive(Default)]
pub struct MemoryStore {
	inner: Mutex<Inner>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seed a user profile so the lifetime batch has somewhere to land.
	/// Profiles are owned by the surrounding application; the engine only
	/// updates them.
	pub fn put_user(&self, user_id: &str, stats: LifetimeStats) {
		self.inner.lock().users.insert(user_id.to_string(), stats);
	}

	pub fn user(&self, user_id: &str) -> Option<LifetimeStats> {
		self.inner.lock().users.get(user_id).cloned()
	}
}

#[async_trait]
impl Store for MemoryStore {
	async fn insert_table(&self, table: &Table) -> Result<()> {
		let mut inner = self.inner.lock();
		if inner.codes.contains_key(&table.short_code) {
			return Err(ChalkError::ShortCodeCollision);
		}
		if inner.tables.contains_key(&table.id) {
			return Err(ChalkError::Conflict(format!("table {} already exists", table.id)));
		}
		inner.codes.insert(table.short_code.clone(), table.id.clone());
		inner.tables.insert(table.id.clone(), Versioned { version: 1, value: table.clone() });
		Ok(())
	}

	async fn table(&self, id: &str) -> Result<Option<Table>> {
		Ok(self.inner.lock().tables.get(id).map(|doc| doc.value.clone()))
	}

	async fn table_id_for_code(&self, code: &str) -> Result<Option<String>> {
		Ok(self.inner.lock().codes.get(code).cloned())
	}

	async fn mutate_table(&self, id: &str, op: TableOp<'_>) -> Result<Table> {
		let mut inner = self.inner.lock();
		let doc = inner.tables.get(id).ok_or_else(|| ChalkError::NotFound(format!("table {}", id)))?;
		let mut table = doc.value.clone();
		op(&mut table)?;
		inner.commit_table(table.clone());
		Ok(table)
	}

	async fn delete_table(&self, id: &str) -> Result<()> {
		let mut inner = self.inner.lock();
		let doc = inner.tables.remove(id).ok_or_else(|| ChalkError::NotFound(format!("table {}", id)))?;
		inner.codes.remove(&doc.value.short_code);
		// closing the channels tells subscribers the table is gone
		inner.watchers.remove(id);
		Ok(())
	}

	async fn insert_venue(&self, venue: &Venue) -> Result<()> {
		let mut inner = self.inner.lock();
		if inner.venues.contains_key(&venue.id) {
			return Err(ChalkError::Conflict(format!("venue {} already exists", venue.id)));
		}
		inner.venues.insert(venue.id.clone(), Versioned { version: 1, value: venue.clone() });
		Ok(())
	}

	async fn venue(&self, id: &str) -> Result<Option<Venue>> {
		Ok(self.inner.lock().venues.get(id).map(|doc| doc.value.clone()))
	}

	async fn venues_by_owner(&self, owner_id: &str) -> Result<Vec<Venue>> {
		let inner = self.inner.lock();
		let mut venues: Vec<Venue> =
			inner.venues.values().filter(|doc| doc.value.owner_id == owner_id).map(|doc| doc.value.clone()).collect();
		venues.sort_by(|a, b| a.created_at.cmp(&b.created_at));
		Ok(venues)
	}

	async fn mutate_venue(&self, id: &str, op: VenueOp<'_>) -> Result<Venue> {
		let mut inner = self.inner.lock();
		let doc = inner.venues.get_mut(id).ok_or_else(|| ChalkError::NotFound(format!("venue {}", id)))?;
		let mut venue = doc.value.clone();
		op(&mut venue)?;
		doc.version += 1;
		doc.value = venue.clone();
		Ok(venue)
	}

	async fn delete_venue(&self, id: &str) -> Result<()> {
		let mut inner = self.inner.lock();
		inner.venues.remove(id).ok_or_else(|| ChalkError::NotFound(format!("venue {}", id)))?;
		Ok(())
	}

	async fn link_table_to_venue(&self, venue_id: &str, table_id: &str) -> Result<Table> {
		let mut inner = self.inner.lock();
		let venue_name = {
			let venue =
				inner.venues.get(venue_id).ok_or_else(|| ChalkError::NotFound(format!("venue {}", venue_id)))?;
			venue.value.name.clone()
		};
		let table = {
			let doc =
				inner.tables.get(table_id).ok_or_else(|| ChalkError::NotFound(format!("table {}", table_id)))?;
			let mut table = doc.value.clone();
			match &table.venue_id {
				Some(existing) if existing != venue_id => {
					return Err(ChalkError::Conflict("table already claimed by another venue".into()))
				}
				_ => {}
			}
			table.venue_id = Some(venue_id.to_string());
			table.venue_name = venue_name;
			table
		};
		let venue = inner.venues.get_mut(venue_id).expect("looked up above");
		if !venue.value.table_ids.iter().any(|id| id == table_id) {
			venue.value.table_ids.push(table_id.to_string());
			venue.version += 1;
		}
		inner.commit_table(table.clone());
		Ok(table)
	}

	async fn unlink_table_from_venue(&self, venue_id: &str, table_id: &str) -> Result<()> {
		let mut inner = self.inner.lock();
		if let Some(venue) = inner.venues.get_mut(venue_id) {
			venue.value.table_ids.retain(|id| id != table_id);
			venue.version += 1;
		}
		let table = inner.tables.get(table_id).map(|doc| doc.value.clone());
		if let Some(mut table) = table {
			if table.venue_id.as_deref() == Some(venue_id) {
				table.venue_id = None;
				inner.commit_table(table);
			}
		}
		Ok(())
	}

	async fn append_history(&self, record: &GameHistoryRecord) -> Result<()> {
		let mut inner = self.inner.lock();
		if inner.history.iter().any(|r| r.id == record.id) {
			return Ok(());
		}
		inner.history.push(record.clone());
		Ok(())
	}

	async fn history_for_table(&self, table_id: &str, limit: u32) -> Result<Vec<GameHistoryRecord>> {
		let inner = self.inner.lock();
		let mut records: Vec<GameHistoryRecord> =
			inner.history.iter().filter(|r| r.table_id == table_id).cloned().collect();
		records.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
		records.truncate(limit as usize);
		Ok(records)
	}

	async fn history_for_user(
		&self,
		user_id: &str,
		limit: u32,
		before: Option<i64>,
	) -> Result<Vec<GameHistoryRecord>> {
		let inner = self.inner.lock();
		let mut records: Vec<GameHistoryRecord> = inner
			.history
			.iter()
			.filter(|r| r.player_uid_list.iter().any(|uid| uid == user_id))
			.filter(|r| before.map_or(true, |b| r.ended_at < b))
			.cloned()
			.collect();
		records.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
		records.truncate(limit as usize);
		Ok(records)
	}

	async fn batch_update_users(&self, updates: &[UserResult], now: i64) -> Result<()> {
		let mut inner = self.inner.lock();
		for update in updates {
			// unknown users have no profile to update
			if let Some(lifetime) = inner.users.get_mut(&update.user_id) {
				stats::apply_lifetime_result(lifetime, update.won, update.mode, now);
			}
		}
		Ok(())
	}

	async fn subscribe_table(&self, id: &str) -> Result<TableUpdates> {
		let mut inner = self.inner.lock();
		if !inner.tables.contains_key(id) {
			return Err(ChalkError::NotFound(format!("table {}", id)));
		}
		let (tx, rx) = flume::unbounded();
		inner.watchers.entry(id.to_string()).or_default().push(tx);
		Ok(TableUpdates::new(rx, None))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::GameMode;
	use anyhow::Error;
	use async_std::task;

	fn table(code: &str) -> Table {
		Table::new(code.into(), "Main".into(), "The Crown".into(), "0".repeat(64), 0)
	}

	#[test]
	fn should_reject_short_code_collisions() -> Result<(), Error> {
		task::block_on(async {
			let store = MemoryStore::new();
			store.insert_table(&table("CHALK-AAAA")).await?;
			let err = store.insert_table(&table("CHALK-AAAA")).await.unwrap_err();
			assert!(matches!(err, ChalkError::ShortCodeCollision));
			store.insert_table(&table("CHALK-BBBB")).await?;
			Ok(())
		})
	}

	#[test]
	fn should_mutate_and_fan_out_snapshots() {
		task::block_on(async {
			let store = MemoryStore::new();
			let t = table("CHALK-AAAA");
			store.insert_table(&t).await.unwrap();
			let updates = store.subscribe_table(&t.id).await.unwrap();

			store
				.mutate_table(&t.id, &mut |table| {
					table.name = "Renamed".into();
					Ok(())
				})
				.await
				.unwrap();

			let snapshot = updates.rx.recv_async().await.unwrap();
			assert_eq!(snapshot.name, "Renamed");

			// a failed op leaves the document untouched and emits nothing
			let err = store
				.mutate_table(&t.id, &mut |_| Err(ChalkError::NoActiveGame))
				.await
				.unwrap_err();
			assert!(matches!(err, ChalkError::NoActiveGame));
			assert!(updates.rx.try_recv().is_err());
			assert_eq!(store.table(&t.id).await.unwrap().unwrap().name, "Renamed");
		});
	}

	#[test]
	fn should_close_subscriptions_on_delete() {
		task::block_on(async {
			let store = MemoryStore::new();
			let t = table("CHALK-AAAA");
			store.insert_table(&t).await.unwrap();
			let updates = store.subscribe_table(&t.id).await.unwrap();
			store.delete_table(&t.id).await.unwrap();
			assert!(updates.rx.recv_async().await.is_err());
			assert_eq!(store.table_id_for_code("CHALK-AAAA").await.unwrap(), None);
		});
	}

	#[test]
	fn should_link_tables_and_venues_both_ways() -> Result<(), Error> {
		task::block_on(async {
			let store = MemoryStore::new();
			let t = table("CHALK-AAAA");
			store.insert_table(&t).await?;
			let venue = Venue::new("The Crown".into(), "owner-1".into(), "Sam".into(), None, 0);
			store.insert_venue(&venue).await?;

			let linked = store.link_table_to_venue(&venue.id, &t.id).await?;
			assert_eq!(linked.venue_id.as_deref(), Some(venue.id.as_str()));
			assert_eq!(store.venue(&venue.id).await?.unwrap().table_ids, vec![t.id.clone()]);

			// claimed by someone else
			let other = Venue::new("Rival".into(), "owner-2".into(), "Ash".into(), None, 0);
			store.insert_venue(&other).await?;
			let err = store.link_table_to_venue(&other.id, &t.id).await.unwrap_err();
			assert!(matches!(err, ChalkError::Conflict(_)));

			store.unlink_table_from_venue(&venue.id, &t.id).await?;
			assert!(store.venue(&venue.id).await?.unwrap().table_ids.is_empty());
			assert_eq!(store.table(&t.id).await?.unwrap().venue_id, None);
			Ok(())
		})
	}

	#[test]
	fn should_append_history_idempotently() {
		task::block_on(async {
			let store = MemoryStore::new();
			let record = GameHistoryRecord {
				id: "g1".into(),
				table_id: "t1".into(),
				mode: GameMode::Singles,
				players: Vec::new(),
				winner: vec!["A".into()],
				winner_side: None,
				started_at: 0,
				ended_at: 10,
				duration: 10,
				consecutive_wins: 1,
				killer_state: None,
				tournament_state: None,
				player_uids: HashMap::new(),
				player_uid_list: vec!["uid-a".into()],
				venue_name: "The Crown".into(),
			};
			store.append_history(&record).await.unwrap();
			store.append_history(&record).await.unwrap();
			assert_eq!(store.history_for_table("t1", 10).await.unwrap().len(), 1);
			assert_eq!(store.history_for_user("uid-a", 10, None).await.unwrap().len(), 1);
			assert_eq!(store.history_for_user("uid-a", 10, Some(10)).await.unwrap().len(), 0);
			assert_eq!(store.history_for_user("uid-b", 10, None).await.unwrap().len(), 0);
		});
	}

	#[test]
	fn should_skip_unknown_users_in_lifetime_batch() {
		task::block_on(async {
			let store = MemoryStore::new();
			store.put_user("uid-a", LifetimeStats::default());
			let updates = vec![
				UserResult { user_id: "uid-a".into(), won: true, mode: GameMode::Singles },
				UserResult { user_id: "uid-ghost".into(), won: false, mode: GameMode::Singles },
			];
			store.batch_update_users(&updates, 99).await.unwrap();
			let lifetime = store.user("uid-a").unwrap();
			assert_eq!((lifetime.wins, lifetime.games_played), (1, 1));
			assert_eq!(lifetime.last_game_at, Some(99));
			assert!(store.user("uid-ghost").is_none());
		});
	}
}
