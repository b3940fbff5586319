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

use elasticobjects::logger::logger_init;
use elasticobjects::settings::Settings;
use elasticobjects::{DocumentSequence, ObjectSearch, Query, Response, View};
use serde_json::Value;
use slog_scope::info;
use std::path::PathBuf;
use std::process::exit;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "objsearch",
    about = "Query Elasticsearch and print the wrapped responses"
)]
struct Args {
    /// Directory holding the configuration files.
    #[structopt(short = "c", long = "config-dir", parse(from_os_str))]
    config_dir: Option<PathBuf>,

    /// Run mode, selects '<config-dir>/<run-mode>.toml'.
    #[structopt(short = "m", long = "run-mode")]
    run_mode: Option<String>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Search documents matching a query string.
    Search {
        query: String,
        #[structopt(short = "i", long = "index")]
        indexes: Vec<String>,
        #[structopt(short = "t", long = "type")]
        doc_types: Vec<String>,
    },
    /// Fetch a single document.
    Get {
        index: String,
        doc_type: String,
        id: String,
    },
    /// Count documents matching a query string.
    Count {
        query: String,
        #[structopt(short = "i", long = "index")]
        indexes: Vec<String>,
    },
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::new(args.config_dir.as_deref(), args.run_mode)?;
    let _log_guard = logger_init(&settings.logging);
    let client = ObjectSearch::from_settings(&settings.elasticsearch)?;

    match args.cmd {
        Command::Search {
            query,
            indexes,
            doc_types,
        } => {
            let response = client.search(
                &Query::from(query),
                &as_strs(&indexes),
                &as_strs(&doc_types),
                &[],
            )?;
            match response {
                Response::Search(res) => {
                    info!("{} hits", res.total().unwrap_or_default());
                    for (i, doc) in res.iter().enumerate() {
                        println!(
                            "{}: {} | {}",
                            i,
                            doc.meta.id.as_deref().unwrap_or("-"),
                            serde_json::to_string(doc)?
                        );
                    }
                }
                other => println!("{}", serde_json::to_string_pretty(&other)?),
            }
        }
        Command::Get {
            index,
            doc_type,
            id,
        } => {
            let response = client.get(&index, &doc_type, &id, &[])?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Count { query, indexes } => {
            let response = client.count(&Query::from(query), &as_strs(&indexes), &[], &[])?;
            println!("{}", response.get_or("count", Value::Null));
        }
    }
    Ok(())
}

fn main() {
    let args = Args::from_args();
    if let Err(err) = run(args) {
        eprintln!("objsearch failed: {}", err);
        exit(1);
    }
}
