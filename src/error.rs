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

use std::io;
use thiserror::Error;

pub type Result<T, E = ChalkError> = std::result::Result<T, E>;

/// Chalk Engine Error Enum
#[derive(Debug, Error)]
pub enum ChalkError {
	// command-facing taxonomy
	#[error("not found: {0}")]
	NotFound(String),
	#[error("conflicting write: {0}")]
	Conflict(String),
	#[error("invalid input: {0}")]
	InvalidInput(String),
	#[error("player already queued: {0}")]
	Duplicate(String),
	#[error("the queue is full")]
	QueueFull,
	#[error("a game is already in progress")]
	GameInProgress,
	#[error("no game in progress")]
	NoActiveGame,
	#[error("not enough waiting players")]
	InsufficientPlayers,
	#[error("doubles requires exactly two names on each side")]
	InvalidDoublesComposition,
	#[error("PIN verification failed")]
	AuthFailed,
	#[error("session is private")]
	PrivateSessionForbidden,
	#[error("venue still owns tables")]
	VenueNotEmpty,
	#[error("could not allocate a unique short code")]
	ShortCodeCollision,
	#[error("storage unavailable: {0}")]
	Unavailable(String),

	// Rust std io error
	#[error(transparent)]
	Io(#[from] io::Error),

	// encoding error
	#[error(transparent)]
	Serialization(#[from] serde_json::Error),

	// database error
	#[error("sqlx error: {0}")]
	Sql(#[from] sqlx::Error),
	#[error("migration error: {0}")]
	Migration(#[from] sqlx::migrate::MigrateError),

	// actor and channel error
	#[error("Trying to send to disconnected actor")]
	Disconnected,
	#[error("Sending on a disconnected channel")]
	Channel,
}

impl From<xtra::Disconnected> for ChalkError {
	fn from(_: xtra::Disconnected) -> Self {
		Self::Disconnected
	}
}

impl<T> From<flume::SendError<T>> for ChalkError {
	fn from(_: flume::SendError<T>) -> Self {
		Self::Channel
	}
}
