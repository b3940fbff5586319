// Copyright © 2016, Canal TP and/or its affiliates. All rights reserved.
//
// This file is part of Navitia,
//     the software to build cool stuff with public transport.
//
// Hope you'll enjoy and contribute to this project,
//     powered by Canal TP (www.canaltp.fr).
// Help us simplify mobility and open public transport:
//     a non ending quest to the responsive locomotion way of traveling!
//
// LICENCE: This program is free software; you can redistribute it
// and/or modify it under the terms of the GNU Affero General Public
// License as published by the Free Software Foundation, either
// version 3 of the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
// Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public
// License along with this program. If not, see
// <http://www.gnu.org/licenses/>.
//
// Stay tuned using
// twitter @navitia
// IRC #navitia on freenode
// https://groups.google.com/d/forum/navitia
// www.navitia.io

use slog::{o, Drain, Never};
use slog_scope::warn;
use std::env;

use crate::settings::{LogFormat, LoggingSettings};

/// Install the global logger, it stays in place as long as the guard lives.
///
/// `RUST_LOG_JSON` forces JSON output ("pretty" for the indented flavor) and
/// `RUST_LOG` replaces the configured level.
pub fn logger_init(settings: &LoggingSettings) -> slog_scope::GlobalLoggerGuard {
    let format = match env::var("RUST_LOG_JSON") {
        Ok(ref s) if s == "pretty" => LogFormat::JsonPretty,
        Ok(_) => LogFormat::Json,
        Err(_) => settings.format,
    };
    match format {
        LogFormat::Compact => configure_logger(
            slog_term::CompactFormat::new(slog_term::PlainDecorator::new(std::io::stderr()))
                .build()
                .fuse(),
            &settings.level,
        ),
        LogFormat::Json | LogFormat::JsonPretty => {
            let drain = slog_json::Json::new(std::io::stderr())
                .add_default_keys()
                .add_key_value(o!(
                            "module" => slog::FnValue(|rinfo : &slog::Record<'_>| {
                                rinfo.module()
                            })
                ))
                .set_pretty(format == LogFormat::JsonPretty)
                .build()
                .fuse();
            configure_logger(drain, &settings.level)
        }
    }
}

fn configure_logger<T>(drain: T, level: &str) -> slog_scope::GlobalLoggerGuard
where
    T: Drain<Ok = (), Err = Never> + Send + 'static,
{
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    let drain = slog_envlogger::LogBuilder::new(drain)
        .parse(&filter)
        .build();
    let drain = slog_async::Async::new(drain).chan_size(256).build();

    let log = slog::Logger::root(drain.fuse(), o!());
    let scope_guard = slog_scope::set_global_logger(log);
    if let Err(err) = slog_stdlog::init() {
        warn!("could not redirect the log crate to slog: {}", err);
    }
    scope_guard
}
