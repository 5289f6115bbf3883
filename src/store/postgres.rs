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

//! PostgreSQL adapter.
//!
//! Documents live as JSONB rows with a bigint `version` column; mutations
//! are read-compute-CAS cycles retried on version mismatch. A trigger emits
//! `pg_notify('table_update', id)` on every table write, and each
//! subscription runs a listener task that re-reads the document and pushes
//! the snapshot downstream.

use async_std::task;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use sqlx::{
	postgres::{PgConnection, PgListener, PgPool, PgPoolOptions},
	types::Json,
	Connection, Row,
};

use crate::{
	engine::stats,
	error::{ChalkError, Result},
	store::{Store, TableOp, TableUpdates, VenueOp, MAX_TXN_RETRIES},
	types::{GameHistoryRecord, LifetimeStats, Table, UserResult, Venue},
};

/// Channel the table-write trigger notifies with the table id as payload.
const TABLE_CHANNEL: &str = "table_update";

/// Run all the migrations.
pub async fn migrate<T: AsRef<str>>(url: T) -> Result<()> {
	let mut conn = PgConnection::connect(url.as_ref()).await?;
	sqlx::migrate!("./src/migrations").run(&mut conn).await?;
	Ok(())
}

#[derive(Clone)]
pub struct PostgresStore {
	/// pool of database connections
	pool: PgPool,
}

impl PostgresStore {
	/// Connect to the database and run migrations.
	pub async fn connect(url: &str) -> Result<Self> {
		migrate(url).await?;
		let pool = PgPoolOptions::new().min_connections(1).max_connections(16).connect(url).await?;
		Ok(Self { pool })
	}

	/// Start the store with a pre-defined pool. Migrations are the caller's
	/// concern.
	pub fn with_pool(pool: PgPool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	async fn fetch_table(pool: &PgPool, id: &str) -> Result<Option<Table>> {
		let row = sqlx::query("SELECT doc FROM tables WHERE id = $1").bind(id).fetch_optional(pool).await?;
		Ok(match row {
			Some(row) => Some(row.try_get::<Json<Table>, _>("doc")?.0),
			None => None,
		})
	}
}

#[async_trait]
impl Store for PostgresStore {
	async fn insert_table(&self, table: &Table) -> Result<()> {
		let mut tx = self.pool.begin().await?;
		let done = sqlx::query("INSERT INTO codes (code, table_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
			.bind(&table.short_code)
			.bind(&table.id)
			.execute(&mut tx)
			.await?;
		if done.rows_affected() == 0 {
			return Err(ChalkError::ShortCodeCollision);
		}
		sqlx::query("INSERT INTO tables (id, short_code, version, doc) VALUES ($1, $2, 1, $3)")
			.bind(&table.id)
			.bind(&table.short_code)
			.bind(Json(table))
			.execute(&mut tx)
			.await?;
		tx.commit().await?;
		Ok(())
	}

	async fn table(&self, id: &str) -> Result<Option<Table>> {
		Self::fetch_table(&self.pool, id).await
	}

	async fn table_id_for_code(&self, code: &str) -> Result<Option<String>> {
		let row = sqlx::query("SELECT table_id FROM codes WHERE code = $1")
			.bind(code)
			.fetch_optional(&self.pool)
			.await?;
		Ok(match row {
			Some(row) => Some(row.try_get("table_id")?),
			None => None,
		})
	}

	async fn mutate_table(&self, id: &str, op: TableOp<'_>) -> Result<Table> {
		for attempt in 0..MAX_TXN_RETRIES {
			let row = sqlx::query("SELECT doc, version FROM tables WHERE id = $1")
				.bind(id)
				.fetch_optional(&self.pool)
				.await?
				.ok_or_else(|| ChalkError::NotFound(format!("table {}", id)))?;
			let version: i64 = row.try_get("version")?;
			let mut table = row.try_get::<Json<Table>, _>("doc")?.0;

			op(&mut table)?;

			let done =
				sqlx::query("UPDATE tables SET doc = $1, version = version + 1 WHERE id = $2 AND version = $3")
					.bind(Json(&table))
					.bind(id)
					.bind(version)
					.execute(&self.pool)
					.await?;
			if done.rows_affected() == 1 {
				return Ok(table);
			}
			log::debug!("table {} version raced at attempt {}, retrying", id, attempt);
		}
		Err(ChalkError::Conflict(format!("table {} kept racing", id)))
	}

	async fn delete_table(&self, id: &str) -> Result<()> {
		let mut tx = self.pool.begin().await?;
		let row = sqlx::query("SELECT short_code FROM tables WHERE id = $1 FOR UPDATE")
			.bind(id)
			.fetch_optional(&mut tx)
			.await?
			.ok_or_else(|| ChalkError::NotFound(format!("table {}", id)))?;
		let code: String = row.try_get("short_code")?;
		sqlx::query("DELETE FROM codes WHERE code = $1").bind(&code).execute(&mut tx).await?;
		sqlx::query("DELETE FROM tables WHERE id = $1").bind(id).execute(&mut tx).await?;
		tx.commit().await?;
		Ok(())
	}

	async fn insert_venue(&self, venue: &Venue) -> Result<()> {
		sqlx::query("INSERT INTO venues (id, owner_id, version, doc) VALUES ($1, $2, 1, $3)")
			.bind(&venue.id)
			.bind(&venue.owner_id)
			.bind(Json(venue))
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn venue(&self, id: &str) -> Result<Option<Venue>> {
		let row = sqlx::query("SELECT doc FROM venues WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
		Ok(match row {
			Some(row) => Some(row.try_get::<Json<Venue>, _>("doc")?.0),
			None => None,
		})
	}

	async fn venues_by_owner(&self, owner_id: &str) -> Result<Vec<Venue>> {
		let rows = sqlx::query("SELECT doc FROM venues WHERE owner_id = $1 ORDER BY (doc->>'createdAt')::bigint")
			.bind(owner_id)
			.fetch_all(&self.pool)
			.await?;
		rows.into_iter().map(|row| Ok(row.try_get::<Json<Venue>, _>("doc")?.0)).collect()
	}

	async fn mutate_venue(&self, id: &str, op: VenueOp<'_>) -> Result<Venue> {
		for attempt in 0..MAX_TXN_RETRIES {
			let row = sqlx::query("SELECT doc, version FROM venues WHERE id = $1")
				.bind(id)
				.fetch_optional(&self.pool)
				.await?
				.ok_or_else(|| ChalkError::NotFound(format!("venue {}", id)))?;
			let version: i64 = row.try_get("version")?;
			let mut venue = row.try_get::<Json<Venue>, _>("doc")?.0;

			op(&mut venue)?;

			let done =
				sqlx::query("UPDATE venues SET doc = $1, version = version + 1 WHERE id = $2 AND version = $3")
					.bind(Json(&venue))
					.bind(id)
					.bind(version)
					.execute(&self.pool)
					.await?;
			if done.rows_affected() == 1 {
				return Ok(venue);
			}
			log::debug!("venue {} version raced at attempt {}, retrying", id, attempt);
		}
		Err(ChalkError::Conflict(format!("venue {} kept racing", id)))
	}

	async fn delete_venue(&self, id: &str) -> Result<()> {
		let done = sqlx::query("DELETE FROM venues WHERE id = $1").bind(id).execute(&self.pool).await?;
		if done.rows_affected() == 0 {
			return Err(ChalkError::NotFound(format!("venue {}", id)));
		}
		Ok(())
	}

	async fn link_table_to_venue(&self, venue_id: &str, table_id: &str) -> Result<Table> {
		let mut tx = self.pool.begin().await?;
		let venue_row = sqlx::query("SELECT doc FROM venues WHERE id = $1 FOR UPDATE")
			.bind(venue_id)
			.fetch_optional(&mut tx)
			.await?
			.ok_or_else(|| ChalkError::NotFound(format!("venue {}", venue_id)))?;
		let mut venue = venue_row.try_get::<Json<Venue>, _>("doc")?.0;
		let table_row = sqlx::query("SELECT doc FROM tables WHERE id = $1 FOR UPDATE")
			.bind(table_id)
			.fetch_optional(&mut tx)
			.await?
			.ok_or_else(|| ChalkError::NotFound(format!("table {}", table_id)))?;
		let mut table = table_row.try_get::<Json<Table>, _>("doc")?.0;

		match &table.venue_id {
			Some(existing) if existing != venue_id => {
				return Err(ChalkError::Conflict("table already claimed by another venue".into()))
			}
			_ => {}
		}
		table.venue_id = Some(venue_id.to_string());
		table.venue_name = venue.name.clone();
		if !venue.table_ids.iter().any(|id| id == table_id) {
			venue.table_ids.push(table_id.to_string());
		}

		sqlx::query("UPDATE tables SET doc = $1, version = version + 1 WHERE id = $2")
			.bind(Json(&table))
			.bind(table_id)
			.execute(&mut tx)
			.await?;
		sqlx::query("UPDATE venues SET doc = $1, version = version + 1 WHERE id = $2")
			.bind(Json(&venue))
			.bind(venue_id)
			.execute(&mut tx)
			.await?;
		tx.commit().await?;
		Ok(table)
	}

	async fn unlink_table_from_venue(&self, venue_id: &str, table_id: &str) -> Result<()> {
		let mut tx = self.pool.begin().await?;
		if let Some(row) = sqlx::query("SELECT doc FROM venues WHERE id = $1 FOR UPDATE")
			.bind(venue_id)
			.fetch_optional(&mut tx)
			.await?
		{
			let mut venue = row.try_get::<Json<Venue>, _>("doc")?.0;
			venue.table_ids.retain(|id| id != table_id);
			sqlx::query("UPDATE venues SET doc = $1, version = version + 1 WHERE id = $2")
				.bind(Json(&venue))
				.bind(venue_id)
				.execute(&mut tx)
				.await?;
		}
		if let Some(row) = sqlx::query("SELECT doc FROM tables WHERE id = $1 FOR UPDATE")
			.bind(table_id)
			.fetch_optional(&mut tx)
			.await?
		{
			let mut table = row.try_get::<Json<Table>, _>("doc")?.0;
			if table.venue_id.as_deref() == Some(venue_id) {
				table.venue_id = None;
				sqlx::query("UPDATE tables SET doc = $1, version = version + 1 WHERE id = $2")
					.bind(Json(&table))
					.bind(table_id)
					.execute(&mut tx)
					.await?;
			}
		}
		tx.commit().await?;
		Ok(())
	}

	async fn append_history(&self, record: &GameHistoryRecord) -> Result<()> {
		sqlx::query(
			r#"
            INSERT INTO history (id, table_id, ended_at, player_uid_list, doc)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
        "#,
		)
		.bind(&record.id)
		.bind(&record.table_id)
		.bind(record.ended_at)
		.bind(&record.player_uid_list)
		.bind(Json(record))
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	async fn history_for_table(&self, table_id: &str, limit: u32) -> Result<Vec<GameHistoryRecord>> {
		let rows = sqlx::query(
			"SELECT doc FROM history WHERE table_id = $1 ORDER BY ended_at DESC LIMIT $2",
		)
		.bind(table_id)
		.bind(i64::from(limit))
		.fetch_all(&self.pool)
		.await?;
		rows.into_iter().map(|row| Ok(row.try_get::<Json<GameHistoryRecord>, _>("doc")?.0)).collect()
	}

	async fn history_for_user(
		&self,
		user_id: &str,
		limit: u32,
		before: Option<i64>,
	) -> Result<Vec<GameHistoryRecord>> {
		let rows = match before {
			Some(before) => {
				sqlx::query(
					r#"
                    SELECT doc FROM history
                    WHERE $1 = ANY (player_uid_list) AND ended_at < $2
                    ORDER BY ended_at DESC LIMIT $3
                "#,
				)
				.bind(user_id)
				.bind(before)
				.bind(i64::from(limit))
				.fetch_all(&self.pool)
				.await?
			}
			None => {
				sqlx::query(
					r#"
                    SELECT doc FROM history
                    WHERE $1 = ANY (player_uid_list)
                    ORDER BY ended_at DESC LIMIT $2
                "#,
				)
				.bind(user_id)
				.bind(i64::from(limit))
				.fetch_all(&self.pool)
				.await?
			}
		};
		rows.into_iter().map(|row| Ok(row.try_get::<Json<GameHistoryRecord>, _>("doc")?.0)).collect()
	}

	async fn batch_update_users(&self, updates: &[UserResult], now: i64) -> Result<()> {
		let mut tx = self.pool.begin().await?;
		for update in updates {
			let row = sqlx::query("SELECT lifetime FROM users WHERE id = $1 FOR UPDATE")
				.bind(&update.user_id)
				.fetch_optional(&mut tx)
				.await?;
			// unknown users have no profile to update
			let row = match row {
				Some(row) => row,
				None => continue,
			};
			let mut lifetime = row.try_get::<Json<LifetimeStats>, _>("lifetime")?.0;
			stats::apply_lifetime_result(&mut lifetime, update.won, update.mode, now);
			sqlx::query("UPDATE users SET lifetime = $1 WHERE id = $2")
				.bind(Json(&lifetime))
				.bind(&update.user_id)
				.execute(&mut tx)
				.await?;
		}
		tx.commit().await?;
		Ok(())
	}

	async fn subscribe_table(&self, id: &str) -> Result<TableUpdates> {
		if Self::fetch_table(&self.pool, id).await?.is_none() {
			return Err(ChalkError::NotFound(format!("table {}", id)));
		}

		// connect and LISTEN before spawning so a write racing the
		// subscription cannot slip between the two
		let mut listener = PgListener::connect_with(&self.pool).await?;
		listener.listen(TABLE_CHANNEL).await?;

		let (tx, rx) = flume::unbounded();
		let (kill_tx, kill_rx) = flume::bounded(1);
		let pool = self.pool.clone();
		let id = id.to_string();

		task::spawn(async move {
			let mut notifications = listener.into_stream();
			loop {
				let mut notif_fut = notifications.next().fuse();
				let mut killed = kill_rx.recv_async().fuse();
				futures::select! {
					notif = notif_fut => match notif {
						Some(Ok(n)) if n.payload() == id => {
							match Self::fetch_table(&pool, &id).await {
								Ok(Some(table)) => {
									if tx.send_async(table).await.is_err() {
										break;
									}
								}
								// row gone: the table was deleted
								Ok(None) => break,
								Err(e) => {
									log::error!("subscription re-read failed: {}", e);
									break;
								}
							}
						}
						Some(Ok(_)) => {}
						Some(Err(e)) => {
							log::error!("table listener: {}", e);
							break;
						}
						None => break,
					},
					_ = killed => break,
				}
			}
		});

		Ok(TableUpdates::new(rx, Some(kill_tx)))
	}
}
