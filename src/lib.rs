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

//! The "Chalk It Up!" table session engine.
//!
//! Runs a physical pool table as a shared, contested resource: a waiting
//! queue, per-mode game orchestration (singles, doubles, challenge, killer,
//! tournaments), winner-stays rules, session and lifetime scoring. Pure
//! transition engines compute every state change; the [`Coordinator`] drives
//! them through optimistic transactions against a pluggable [`store::Store`]
//! and fans whole-table snapshots out to subscribers.

#![forbid(unsafe_code)]

pub mod codes;
mod coordinator;
pub mod engine;
mod error;
#[cfg(feature = "logging")]
mod logger;
pub mod store;
pub mod types;

pub use self::coordinator::{Coordinator, CoordinatorBuilder, NewTable, Subscription, SHORT_CODE_RETRIES};
pub use self::error::{ChalkError, Result};
#[cfg(feature = "logging")]
pub use self::logger::init as init_logger;

#[cfg(test)]
pub use test::*;

#[cfg(test)]
mod test {
	use std::sync::Once;

	static INIT: Once = Once::new();
	/// Guard that should be called at the beginning of every test.
	pub fn initialize() {
		INIT.call_once(|| {
			let _ = pretty_env_logger::try_init();
		});
	}
}
