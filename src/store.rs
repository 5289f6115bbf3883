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

//! The persistence contract the coordinator consumes.
//!
//! One document per table (keyed by id), one short-code index entry per
//! table (keyed by code), one venue document per venue, an append-only
//! history collection per table, and one lifetime-stats document per user.
//! Mutations run as optimistic read-compute-CAS cycles: the mutation closure
//! is pure and may be re-invoked on version conflict.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
	error::Result,
	types::{GameHistoryRecord, Table, UserResult, Venue},
};

/// Bounded retries for one optimistic transaction before it fails
/// `Conflict`.
pub const MAX_TXN_RETRIES: usize = 5;

/// A pure transition over the table document, re-invocable on conflict.
pub type TableOp<'a> = &'a mut (dyn FnMut(&mut Table) -> Result<()> + Send);

/// A pure transition over a venue document, re-invocable on conflict.
pub type VenueOp<'a> = &'a mut (dyn FnMut(&mut Venue) -> Result<()> + Send);

/// A cancellable stream of whole-table snapshots. The receiver yields the
/// full document on every persisted change; consumers diff on their side.
pub struct TableUpdates {
	pub rx: flume::Receiver<Table>,
	kill: Option<flume::Sender<()>>,
}

impl TableUpdates {
	pub fn new(rx: flume::Receiver<Table>, kill: Option<flume::Sender<()>>) -> Self {
		Self { rx, kill }
	}
}

impl Drop for TableUpdates {
	fn drop(&mut self) {
		if let Some(kill) = self.kill.take() {
			let _ = kill.send(());
		}
	}
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
	/// Write a fresh table and its short-code index entry atomically.
	/// Fails `ShortCodeCollision` when the code is already indexed.
	async fn insert_table(&self, table: &Table) -> Result<()>;

	async fn table(&self, id: &str) -> Result<Option<Table>>;

	/// Short-code index lookup.
	async fn table_id_for_code(&self, code: &str) -> Result<Option<String>>;

	/// Optimistic transaction over one table document: read, apply `op`,
	/// CAS-write. Retried up to [`MAX_TXN_RETRIES`] times on version
	/// conflict, then fails `Conflict`. Returns the committed document.
	async fn mutate_table(&self, id: &str, op: TableOp<'_>) -> Result<Table>;

	/// Remove the table and its short-code index entry.
	async fn delete_table(&self, id: &str) -> Result<()>;

	async fn insert_venue(&self, venue: &Venue) -> Result<()>;

	async fn venue(&self, id: &str) -> Result<Option<Venue>>;

	async fn venues_by_owner(&self, owner_id: &str) -> Result<Vec<Venue>>;

	async fn mutate_venue(&self, id: &str, op: VenueOp<'_>) -> Result<Venue>;

	async fn delete_venue(&self, id: &str) -> Result<()>;

	/// Atomically link `venue.tableIds` and `table.venueId` in both
	/// directions. Fails `Conflict` when the table already belongs to a
	/// different venue.
	async fn link_table_to_venue(&self, venue_id: &str, table_id: &str) -> Result<Table>;

	/// Atomically drop the link in both directions. Idempotent.
	async fn unlink_table_from_venue(&self, venue_id: &str, table_id: &str) -> Result<()>;

	/// Append one game record. Idempotent on the record id, so a retried
	/// post-commit side effect cannot double-count.
	async fn append_history(&self, record: &GameHistoryRecord) -> Result<()>;

	/// Latest games of one table, `endedAt` descending.
	async fn history_for_table(&self, table_id: &str, limit: u32) -> Result<Vec<GameHistoryRecord>>;

	/// Latest games involving a user (`playerUidList contains uid`),
	/// `endedAt` descending, paginated with `before`.
	async fn history_for_user(&self, user_id: &str, limit: u32, before: Option<i64>)
		-> Result<Vec<GameHistoryRecord>>;

	/// Fold one game's results into the lifetime stats of every known user
	/// in the batch. Users without a stored profile are silently skipped.
	async fn batch_update_users(&self, updates: &[UserResult], now: i64) -> Result<()>;

	/// Subscribe to whole-document snapshots of one table.
	async fn subscribe_table(&self, id: &str) -> Result<TableUpdates>;
}
