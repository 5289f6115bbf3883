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

//! The command API.
//!
//! Binds the pure engines to a [`Store`]: every mutating command is one
//! optimistic transaction (read table, run the pure transition, CAS write),
//! so callers observe either the whole new table state or nothing. Finished
//! games hand their history record and lifetime batch to a writer actor
//! after the commit.

mod side_effects;

use std::sync::Arc;

use async_std::task;
use futures::FutureExt;
use xtra::{prelude::*, spawn::AsyncStd};

pub use self::side_effects::{Die, RecordGame, SideEffectWriter};
use crate::{
	codes::{self, Clock, CodeGenerator, RandomCodes, SystemClock},
	engine::{game, game::FinishedGame, queue, stats},
	error::{ChalkError, Result},
	store::Store,
	types::{
		GameHistoryRecord, GameMode, GameResult, JoinRequest, PlayerStats, SessionState, SessionStats,
		SettingsPatch, Table, TournamentFormat, Venue, VenuePatch, PIN_LEN,
	},
};

/// How many fresh short codes to try before giving up on table creation.
pub const SHORT_CODE_RETRIES: usize = 5;

/// Parameters for `CreateTable`.
#[derive(Clone, Debug)]
pub struct NewTable {
	pub venue_name: String,
	pub table_name: String,
	pub pin: String,
	pub venue_id: Option<String>,
}

/// Handle on a live table subscription. Dropping it (or calling
/// [`Subscription::cancel`]) stops delivery.
pub struct Subscription {
	kill: flume::Sender<()>,
	handle: Option<task::JoinHandle<()>>,
}

impl Subscription {
	pub async fn cancel(mut self) {
		let _ = self.kill.send_async(()).await;
		if let Some(handle) = self.handle.take() {
			handle.await;
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		let _ = self.kill.send(());
	}
}

/// Builds a [`Coordinator`], with seams for the clock and the short-code
/// generator.
pub struct CoordinatorBuilder<S: Store> {
	store: Arc<S>,
	clock: Option<Arc<dyn Clock>>,
	codes: Option<Arc<dyn CodeGenerator>>,
}

impl<S: Store> CoordinatorBuilder<S> {
	pub fn new(store: Arc<S>) -> Self {
		Self { store, clock: None, codes: None }
	}

	/// Override the wall clock.
	///
	/// # Default
	/// Defaults to the system clock.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);
		self
	}

	/// Override the short-code generator.
	///
	/// # Default
	/// Defaults to uniform random codes.
	pub fn code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
		self.codes = Some(codes);
		self
	}

	/// Spawn the side-effect writer and assemble the coordinator.
	pub fn build(self) -> Coordinator<S> {
		let effects = SideEffectWriter::new(self.store.clone()).create(None).spawn(&mut AsyncStd);
		Coordinator {
			store: self.store,
			clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
			codes: self.codes.unwrap_or_else(|| Arc::new(RandomCodes)),
			effects,
		}
	}
}

pub struct Coordinator<S: Store> {
	store: Arc<S>,
	clock: Arc<dyn Clock>,
	codes: Arc<dyn CodeGenerator>,
	effects: Address<SideEffectWriter<S>>,
}

impl<S: Store> Clone for Coordinator<S> {
	fn clone(&self) -> Self {
		Self {
			store: Arc::clone(&self.store),
			clock: Arc::clone(&self.clock),
			codes: Arc::clone(&self.codes),
			effects: self.effects.clone(),
		}
	}
}

impl<S: Store> Coordinator<S> {
	pub fn new(store: Arc<S>) -> Self {
		CoordinatorBuilder::new(store).build()
	}

	pub fn builder(store: Arc<S>) -> CoordinatorBuilder<S> {
		CoordinatorBuilder::new(store)
	}

	pub fn store(&self) -> &Arc<S> {
		&self.store
	}

	/// Stop the side-effect writer. Pending writes drain first.
	pub async fn shutdown(self) {
		let _ = self.effects.send(Die).await;
	}

	// ---- tables ----

	/// Allocate a table: fresh id, unique short code (generation retried on
	/// collision), hashed PIN, and optionally a venue link.
	pub async fn create_table(&self, new: NewTable) -> Result<Table> {
		if new.pin.chars().count() != PIN_LEN {
			return Err(ChalkError::InvalidInput(format!("PIN must be {} characters", PIN_LEN)));
		}
		if new.table_name.trim().is_empty() || new.venue_name.trim().is_empty() {
			return Err(ChalkError::InvalidInput("table and venue names are required".into()));
		}
		if let Some(venue_id) = &new.venue_id {
			if self.store.venue(venue_id).await?.is_none() {
				return Err(ChalkError::NotFound(format!("venue {}", venue_id)));
			}
		}

		let now = self.clock.now_ms();
		let pin_hash = codes::hash_pin(&new.pin);
		for _ in 0..SHORT_CODE_RETRIES {
			let code = codes::normalize_code(&self.codes.generate());
			if !codes::is_valid_code(&code) {
				return Err(ChalkError::InvalidInput(format!("generated short code {:?} is malformed", code)));
			}
			let table = Table::new(code, new.table_name.clone(), new.venue_name.clone(), pin_hash.clone(), now);
			match self.store.insert_table(&table).await {
				Ok(()) => {
					log::info!("created table {} with code {}", table.id, table.short_code);
					return match &new.venue_id {
						Some(venue_id) => self.store.link_table_to_venue(venue_id, &table.id).await,
						None => Ok(table),
					};
				}
				Err(ChalkError::ShortCodeCollision) => {
					log::debug!("short code {} collided, regenerating", table.short_code);
					continue;
				}
				Err(e) => return Err(e),
			}
		}
		Err(ChalkError::ShortCodeCollision)
	}

	pub async fn table(&self, table_id: &str) -> Result<Table> {
		self.store.table(table_id).await?.ok_or_else(|| ChalkError::NotFound(format!("table {}", table_id)))
	}

	/// Short-code lookup. The code is normalized (trim, uppercase) and
	/// validated before the index is consulted.
	pub async fn table_by_short_code(&self, code: &str) -> Result<Option<Table>> {
		let code = codes::normalize_code(code);
		if !codes::is_valid_code(&code) {
			return Err(ChalkError::InvalidInput(format!("short code {:?}", code)));
		}
		match self.store.table_id_for_code(&code).await? {
			Some(id) => self.store.table(&id).await,
			None => Ok(None),
		}
	}

	/// Stream whole-table snapshots into `on_update` until cancelled.
	/// `on_error` fires once if the stream drops out from under us.
	pub async fn subscribe_table(
		&self,
		table_id: &str,
		on_update: impl Fn(Table) + Send + 'static,
		on_error: impl Fn(ChalkError) + Send + 'static,
	) -> Result<Subscription> {
		let updates = self.store.subscribe_table(table_id).await?;
		let (kill_tx, kill_rx) = flume::bounded(1);
		let handle = task::spawn(async move {
			loop {
				let mut next = updates.rx.recv_async().fuse();
				let mut killed = kill_rx.recv_async().fuse();
				futures::select! {
					table = next => match table {
						Ok(table) => on_update(table),
						Err(_) => {
							on_error(ChalkError::Unavailable("disconnected".into()));
							break;
						}
					},
					_ = killed => break,
				}
			}
		});
		Ok(Subscription { kill: kill_tx, handle: Some(handle) })
	}

	/// Destroy a table. Admin authority; refused while a game is live.
	pub async fn delete_table(&self, table_id: &str, pin: &str) -> Result<()> {
		let table = self.table(table_id).await?;
		check_pin(&table, pin)?;
		if table.current_game.is_some() {
			return Err(ChalkError::GameInProgress);
		}
		if let Some(venue_id) = &table.venue_id {
			self.store.unlink_table_from_venue(venue_id, table_id).await?;
		}
		self.store.delete_table(table_id).await
	}

	// ---- queue ----

	pub async fn add_to_queue(&self, table_id: &str, req: JoinRequest) -> Result<Table> {
		self.mutate(table_id, move |table, now| {
			queue::add_to_queue(table, req.clone(), now)?;
			Ok(())
		})
		.await
	}

	pub async fn remove_from_queue(&self, table_id: &str, entry_id: &str) -> Result<Table> {
		let entry_id = entry_id.to_string();
		self.mutate(table_id, move |table, _| {
			queue::remove_from_queue(table, &entry_id);
			Ok(())
		})
		.await
	}

	pub async fn reorder_queue(&self, table_id: &str, entry_id: &str, new_index: usize) -> Result<Table> {
		let entry_id = entry_id.to_string();
		self.mutate(table_id, move |table, _| {
			queue::reorder_queue(table, &entry_id, new_index);
			Ok(())
		})
		.await
	}

	pub async fn hold_position(&self, table_id: &str, entry_id: &str) -> Result<Table> {
		let entry_id = entry_id.to_string();
		self.mutate(table_id, move |table, now| {
			queue::hold_position(table, &entry_id, now);
			Ok(())
		})
		.await
	}

	pub async fn unhold_position(&self, table_id: &str, entry_id: &str) -> Result<Table> {
		let entry_id = entry_id.to_string();
		self.mutate(table_id, move |table, _| {
			queue::unhold_position(table, &entry_id);
			Ok(())
		})
		.await
	}

	pub async fn claim_queue_spot(
		&self,
		table_id: &str,
		entry_id: &str,
		player_name: &str,
		user_id: &str,
	) -> Result<Table> {
		let (entry_id, player_name, user_id) =
			(entry_id.to_string(), player_name.to_string(), user_id.to_string());
		self.mutate(table_id, move |table, _| queue::claim_queue_spot(table, &entry_id, &player_name, &user_id))
			.await
	}

	// ---- games ----

	pub async fn start_next_game(&self, table_id: &str) -> Result<Table> {
		self.mutate(table_id, game::start_next_game).await
	}

	pub async fn register_current_game(
		&self,
		table_id: &str,
		holder_names: Vec<String>,
		challenger_names: Vec<String>,
		mode: GameMode,
	) -> Result<Table> {
		self.mutate(table_id, move |table, now| {
			game::register_current_game(table, holder_names.clone(), challenger_names.clone(), mode, now)
		})
		.await
	}

	/// Report a singles/doubles/challenge result. A concurrent double report
	/// loses the race and observes `NoActiveGame`.
	pub async fn report_result(&self, table_id: &str, result: GameResult) -> Result<Table> {
		let now = self.clock.now_ms();
		let mut finished: Option<FinishedGame> = None;
		let mut apply = |table: &mut Table| -> Result<()> {
			finished = Some(game::process_result(table, result.clone(), now)?);
			table.touch(now);
			Ok(())
		};
		let table = self.store.mutate_table(table_id, &mut apply).await?;
		if let Some(finished) = finished {
			self.record_game(finished, now).await;
		}
		Ok(table)
	}

	pub async fn start_killer_direct(&self, table_id: &str, player_names: Vec<String>) -> Result<Table> {
		self.mutate(table_id, move |table, now| game::start_killer_direct(table, player_names.clone(), now))
			.await
	}

	pub async fn eliminate_killer_player(&self, table_id: &str, name: &str) -> Result<Table> {
		let name = name.to_string();
		self.mutate(table_id, move |table, _| game::eliminate_killer_player(table, &name)).await
	}

	pub async fn finish_killer_game(&self, table_id: &str, winner: &str) -> Result<Table> {
		let now = self.clock.now_ms();
		let winner = winner.to_string();
		let mut finished: Option<FinishedGame> = None;
		let mut apply = |table: &mut Table| -> Result<()> {
			finished = Some(game::finish_killer_game(table, &winner, now)?);
			table.touch(now);
			Ok(())
		};
		let table = self.store.mutate_table(table_id, &mut apply).await?;
		if let Some(finished) = finished {
			self.record_game(finished, now).await;
		}
		Ok(table)
	}

	pub async fn cancel_game(&self, table_id: &str) -> Result<Table> {
		self.mutate(table_id, |table, _| game::cancel_current_game(table)).await
	}

	pub async fn dismiss_no_show(&self, table_id: &str) -> Result<Table> {
		self.mutate(table_id, |table, _| {
			game::dismiss_no_show(table);
			Ok(())
		})
		.await
	}

	pub async fn resolve_no_shows(&self, table_id: &str, entry_ids: Vec<String>) -> Result<Table> {
		self.mutate(table_id, move |table, _| game::resolve_no_shows(table, &entry_ids)).await
	}

	// ---- tournaments ----

	pub async fn start_tournament(
		&self,
		table_id: &str,
		player_names: Vec<String>,
		format: TournamentFormat,
		race_to: u8,
	) -> Result<Table> {
		self.mutate(table_id, move |table, now| {
			game::start_tournament(table, player_names.clone(), format, race_to, now)
		})
		.await
	}

	pub async fn report_tournament_frame(&self, table_id: &str, winner: &str) -> Result<Table> {
		let now = self.clock.now_ms();
		let winner = winner.to_string();
		let mut finished: Option<FinishedGame> = None;
		let mut apply = |table: &mut Table| -> Result<()> {
			finished = game::report_tournament_frame(table, &winner, now)?;
			table.touch(now);
			Ok(())
		};
		let table = self.store.mutate_table(table_id, &mut apply).await?;
		if let Some(finished) = finished {
			self.record_game(finished, now).await;
		}
		Ok(table)
	}

	// ---- settings & session ----

	/// Admin settings update: shallow merge, `houseRules` deep-merged. A new
	/// PIN is hashed here; plaintext never reaches the document.
	pub async fn update_settings(
		&self,
		table_id: &str,
		pin: &str,
		mut patch: SettingsPatch,
		new_pin: Option<&str>,
	) -> Result<Table> {
		if let Some(new_pin) = new_pin {
			if new_pin.chars().count() != PIN_LEN {
				return Err(ChalkError::InvalidInput(format!("PIN must be {} characters", PIN_LEN)));
			}
			patch.pin_hash = Some(codes::hash_pin(new_pin));
		}
		let pin = pin.to_string();
		self.mutate(table_id, move |table, _| {
			check_pin(table, &pin)?;
			table.settings.apply(patch.clone());
			Ok(())
		})
		.await
	}

	/// Start a fresh session: queue, game, stats and private mode reset;
	/// settings and recent names survive.
	pub async fn reset_table(&self, table_id: &str, pin: &str) -> Result<Table> {
		let pin = pin.to_string();
		self.mutate(table_id, move |table, now| {
			check_pin(table, &pin)?;
			table.queue.clear();
			table.current_game = None;
			table.session_stats = SessionStats::default();
			table.session = SessionState::new(now);
			Ok(())
		})
		.await
	}

	/// Flip private mode. Turning it on installs `allowed` as the allow
	/// list, defaulting to everyone currently queued; turning it off clears
	/// the list.
	pub async fn toggle_private_mode(
		&self,
		table_id: &str,
		pin: &str,
		allowed: Option<Vec<String>>,
	) -> Result<Table> {
		let pin = pin.to_string();
		self.mutate(table_id, move |table, _| {
			check_pin(table, &pin)?;
			if table.session.is_private {
				table.session.is_private = false;
				table.session.private_player_names.clear();
			} else {
				table.session.is_private = true;
				table.session.private_player_names = match &allowed {
					Some(names) => names.clone(),
					None => table.queue.iter().flat_map(|e| e.player_names.clone()).collect(),
				};
			}
			Ok(())
		})
		.await
	}

	// ---- stats & history ----

	pub async fn leaderboard(&self, table_id: &str) -> Result<Vec<(String, PlayerStats)>> {
		let table = self.table(table_id).await?;
		Ok(stats::leaderboard(&table.session_stats))
	}

	pub async fn history_for_table(&self, table_id: &str, limit: u32) -> Result<Vec<GameHistoryRecord>> {
		self.store.history_for_table(table_id, limit).await
	}

	pub async fn history_for_user(
		&self,
		user_id: &str,
		limit: u32,
		before: Option<i64>,
	) -> Result<Vec<GameHistoryRecord>> {
		self.store.history_for_user(user_id, limit, before).await
	}

	// ---- venues ----

	pub async fn create_venue(
		&self,
		name: &str,
		owner_id: &str,
		owner_name: &str,
		logo_url: Option<String>,
	) -> Result<Venue> {
		if name.trim().is_empty() {
			return Err(ChalkError::InvalidInput("venue name is required".into()));
		}
		let venue =
			Venue::new(name.to_string(), owner_id.to_string(), owner_name.to_string(), logo_url, self.clock.now_ms());
		self.store.insert_venue(&venue).await?;
		Ok(venue)
	}

	pub async fn venue(&self, venue_id: &str) -> Result<Venue> {
		self.store.venue(venue_id).await?.ok_or_else(|| ChalkError::NotFound(format!("venue {}", venue_id)))
	}

	pub async fn venues_by_owner(&self, owner_id: &str) -> Result<Vec<Venue>> {
		self.store.venues_by_owner(owner_id).await
	}

	pub async fn update_venue(&self, venue_id: &str, owner_id: &str, patch: VenuePatch) -> Result<Venue> {
		let owner_id = owner_id.to_string();
		self.store
			.mutate_venue(venue_id, &mut |venue| {
				if venue.owner_id != owner_id {
					return Err(ChalkError::AuthFailed);
				}
				if let Some(name) = &patch.name {
					venue.name = name.clone();
				}
				if let Some(logo_url) = &patch.logo_url {
					venue.logo_url = Some(logo_url.clone());
				}
				Ok(())
			})
			.await
	}

	/// Delete a venue that owns no tables.
	pub async fn delete_venue(&self, venue_id: &str, owner_id: &str) -> Result<()> {
		let venue = self.venue(venue_id).await?;
		if venue.owner_id != owner_id {
			return Err(ChalkError::AuthFailed);
		}
		if !venue.table_ids.is_empty() {
			return Err(ChalkError::VenueNotEmpty);
		}
		self.store.delete_venue(venue_id).await
	}

	/// Claim a table for a venue by short code and PIN: verify, reject a
	/// table already claimed elsewhere, and link both directions atomically.
	pub async fn claim_table(&self, venue_id: &str, short_code: &str, pin: &str) -> Result<Table> {
		let code = codes::normalize_code(short_code);
		if !codes::is_valid_code(&code) {
			return Err(ChalkError::InvalidInput(format!("short code {:?}", code)));
		}
		let table_id = self
			.store
			.table_id_for_code(&code)
			.await?
			.ok_or_else(|| ChalkError::NotFound(format!("no table with code {}", code)))?;
		let table = self.table(&table_id).await?;
		check_pin(&table, pin)?;
		self.store.link_table_to_venue(venue_id, &table_id).await
	}

	// ---- internals ----

	async fn mutate<F>(&self, table_id: &str, mut f: F) -> Result<Table>
	where
		F: FnMut(&mut Table, i64) -> Result<()> + Send,
	{
		let now = self.clock.now_ms();
		let mut apply = |table: &mut Table| -> Result<()> {
			f(table, now)?;
			table.touch(now);
			Ok(())
		};
		self.store.mutate_table(table_id, &mut apply).await
	}

	async fn record_game(&self, finished: FinishedGame, now: i64) {
		let game_id = finished.record.id.clone();
		let msg = RecordGame { record: finished.record, users: finished.user_results, now };
		if self.effects.send(msg).await.is_err() {
			log::error!("side-effect writer gone, dropping record for game {}", game_id);
		}
	}
}

fn check_pin(table: &Table, pin: &str) -> Result<()> {
	if codes::verify_pin(pin, &table.settings.pin_hash) {
		Ok(())
	} else {
		Err(ChalkError::AuthFailed)
	}
}
