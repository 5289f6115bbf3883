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

//! The pure state-transition engines.
//!
//! Every function in here maps plain values to plain values: no I/O, no
//! clocks, no suspension. The coordinator runs them inside optimistic
//! transactions; a returned error aborts the transaction with no state
//! change.

pub mod game;
pub mod queue;
pub mod stats;
pub mod tournament;
