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

//! Post-commit side-effect writer.
//!
//! History appends and lifetime-stats batches land here after a table commit
//! succeeds. Failures are logged and never surfaced: a committed table state
//! is not rolled back because a read-side write lagged. Both writes are
//! idempotent at the record level, so redelivery is safe.

use std::sync::Arc;

use xtra::prelude::*;

use crate::{
	store::Store,
	types::{GameHistoryRecord, UserResult},
};

pub struct SideEffectWriter<S: Store> {
	store: Arc<S>,
}

impl<S: Store> SideEffectWriter<S> {
	pub fn new(store: Arc<S>) -> Self {
		Self { store }
	}
}

#[async_trait::async_trait]
impl<S: Store> Actor for SideEffectWriter<S> {}

/// A finished game to persist: the history record plus the lifetime batch
/// for every player with a known uid.
#[derive(Debug)]
pub struct RecordGame {
	pub record: GameHistoryRecord,
	pub users: Vec<UserResult>,
	pub now: i64,
}

impl Message for RecordGame {
	type Result = ();
}

#[async_trait::async_trait]
impl<S: Store> Handler<RecordGame> for SideEffectWriter<S> {
	async fn handle(&mut self, msg: RecordGame, _: &mut Context<Self>) {
		if let Err(e) = self.store.append_history(&msg.record).await {
			log::error!("failed to append history for game {}: {}", msg.record.id, e);
		}
		if msg.users.is_empty() {
			return;
		}
		if let Err(e) = self.store.batch_update_users(&msg.users, msg.now).await {
			log::error!("failed to batch lifetime stats for game {}: {}", msg.record.id, e);
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Die;

impl Message for Die {
	type Result = ();
}

#[async_trait::async_trait]
impl<S: Store> Handler<Die> for SideEffectWriter<S> {
	async fn handle(&mut self, _: Die, ctx: &mut Context<Self>) {
		ctx.stop();
	}
}
