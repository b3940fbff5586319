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

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use slog_scope::info;
use snafu::{ResultExt, Snafu};
use std::env;
use std::path::Path;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Setting Config Value Error: {}", source))]
    ConfigValue { source: config::ConfigError },

    #[snafu(display("Config Compilation Error: {}", source))]
    ConfigCompilation { source: config::ConfigError },

    #[snafu(display(
        "Run mode '{}' given without a config directory, use --config-dir",
        run_mode
    ))]
    MissingConfigDir { run_mode: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElasticsearchSettings {
    pub url: String,
    /// Request timeout, in milliseconds.
    pub timeout: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    Compact,
    Json,
    JsonPretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub elasticsearch: ElasticsearchSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    // Settings are merged from, in increasing priority:
    // * the defaults compiled in from 'config/default.toml',
    // * '<config_dir>/default.toml', if present,
    // * '<config_dir>/<run_mode>.toml', where the RUN_MODE environment variable
    //   takes precedence over the run mode given as argument,
    // * '<config_dir>/local.toml', if present,
    // * ELASTICOBJECTS_ prefixed environment variables, eg ELASTICOBJECTS_ELASTICSEARCH_TIMEOUT,
    // * ELASTICSEARCH_URL for the url.
    pub fn new(config_dir: Option<&Path>, run_mode: Option<String>) -> Result<Self, Error> {
        let run_mode = env::var("RUN_MODE").ok().or(run_mode);

        let mut builder = Config::builder().add_source(File::from_str(
            include_str!("../config/default.toml"),
            FileFormat::Toml,
        ));

        match config_dir {
            Some(dir) => {
                info!("using configuration from {}", dir.display());
                builder = builder.add_source(File::from(dir.join("default.toml")).required(false));
                if let Some(run_mode) = &run_mode {
                    let run_mode_path = dir.join(run_mode).with_extension("toml");
                    builder = builder.add_source(File::from(run_mode_path).required(true));
                }
                builder = builder.add_source(File::from(dir.join("local.toml")).required(false));
            }
            None => {
                if let Some(run_mode) = run_mode {
                    return Err(Error::MissingConfigDir { run_mode });
                }
            }
        }

        builder = builder.add_source(Environment::with_prefix("ELASTICOBJECTS").separator("_"));

        if let Ok(url) = env::var("ELASTICSEARCH_URL") {
            builder = builder
                .set_override("elasticsearch.url", url)
                .context(ConfigValue)?;
        }

        builder
            .build()
            .context(ConfigCompilation)?
            .try_deserialize()
            .context(ConfigCompilation)
    }
}
