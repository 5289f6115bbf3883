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

//! Logging for kiosk deployments: a terse colored terminal line plus a
//! verbose file under the per-user data directory. A kiosk rarely has
//! anyone watching its console, so the file carries the detail.

use std::{fs, io, path::PathBuf};

use fern::colors::{Color, ColoredLevelConfig};

/// Directory chalk-engine may write local state (log files) into. Falls
/// back to the working directory when the process has no home, as in a
/// container.
pub fn data_dir() -> PathBuf {
	dirs::BaseDirs::new()
		.map(|base| base.data_local_dir().join("chalk_engine"))
		.unwrap_or_else(|| PathBuf::from("."))
}

/// Install the global logger. `stdout_level` filters the terminal,
/// `file_level` filters `chalk.logs` under [`data_dir`]. Call once at
/// startup; a second call fails.
pub fn init(stdout_level: log::LevelFilter, file_level: log::LevelFilter) -> io::Result<()> {
	let dir = data_dir();
	fs::create_dir_all(&dir)?;

	let colors = ColoredLevelConfig::new().info(Color::Green).warn(Color::Yellow).error(Color::Red);

	let terminal = fern::Dispatch::new()
		.level(log::LevelFilter::Warn)
		.level_for("chalk_engine", stdout_level)
		.level_for("sqlx", log::LevelFilter::Error)
		.format(move |out, message, record| {
			out.finish(format_args!(
				"{} {} {}",
				chrono::Local::now().format("%H:%M:%S"),
				colors.color(record.level()),
				message
			))
		})
		.chain(io::stdout());

	let file = fern::Dispatch::new()
		.level(log::LevelFilter::Info)
		.level_for("chalk_engine", file_level)
		.level_for("sqlx", log::LevelFilter::Warn)
		.format(|out, message, record| {
			out.finish(format_args!(
				"{} {:<5} [{}] {} ({}:{})",
				chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%z"),
				record.level(),
				record.target(),
				message,
				record.file().unwrap_or("?"),
				record.line().unwrap_or_default()
			))
		})
		.chain(fern::log_file(dir.join("chalk.logs"))?);

	fern::Dispatch::new()
		.chain(terminal)
		.chain(file)
		.apply()
		.map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))
}
