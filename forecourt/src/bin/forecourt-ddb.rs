// Copyright (C) 2025-2026 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of forecourt.
//
// forecourt is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// forecourt is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with forecourt.  If not,
// see <http://www.gnu.org/licenses/>.

//! # forecourt-ddb
//!
//! Stand up the forecourt DynamoDB schema for development purposes.
//!
//! I could have scripted this with the AWS CLI, but didn't want the dependency; the schema
//! already lives in this crate as data ([forecourt::tables]), so the shortest path is a small
//! binary that walks it.

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::{config::Region, Client};
use clap::{crate_authors, crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use either::Either;
use snafu::{prelude::*, Backtrace};
use tracing::{info, Level};
use tracing_subscriber::{
    fmt::{self},
    layer::SubscriberExt,
    EnvFilter, Layer, Registry,
};
use url::Url;

use std::io;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        crate error type                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Application error type
#[derive(Snafu)]
pub enum Error {
    #[snafu(display("Failed to parse RUST_LOG: {source}"))]
    EnvFilter {
        source: tracing_subscriber::filter::FromEnvError,
    },
    #[snafu(display("No endpoint URLs specified"))]
    NoEndpoints { backtrace: Backtrace },
    #[snafu(display("Failed to create the schema: {source}"))]
    Schema { source: forecourt::schemas::Error },
    #[snafu(display("Failed to set the tracing subscriber: {source}"))]
    Subscriber {
        source: tracing::subscriber::SetGlobalDefaultError,
    },
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self, f)
    }
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                finding DynamoDB on the network                                 //
////////////////////////////////////////////////////////////////////////////////////////////////////

// The network location of our DynamoDB (or ScyllaDB/Alternator) instance can be given as either a
// region, or a list of URLs.
/// Newtype to work around Rust's orphan traits rule
#[derive(Clone, Debug)]
struct DynamoLocation(Either<Region, Vec<Url>>);

impl clap::builder::ValueParserFactory for DynamoLocation {
    type Parser = DynamoLocationParser;

    fn value_parser() -> Self::Parser {
        DynamoLocationParser
    }
}

#[derive(Clone, Debug)]
struct DynamoLocationParser;

impl clap::builder::TypedValueParser for DynamoLocationParser {
    type Value = DynamoLocation;

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> std::result::Result<Self::Value, clap::Error> {
        use clap::error::ErrorKind;
        let text = value
            .to_str()
            .ok_or(clap::Error::new(ErrorKind::InvalidValue))?;
        let vals: Vec<&str> = text.split(',').collect();
        if vals.len() == 1 {
            Ok(DynamoLocation(match Url::parse(vals[0]) {
                Ok(url) => Either::Right(vec![url]),
                Err(_) => Either::Left(Region::new(vals[0].to_string())),
            }))
        } else {
            Ok(DynamoLocation(Either::Right(
                vals.iter()
                    .map(|s| Url::parse(s))
                    .collect::<std::result::Result<Vec<Url>, _>>()
                    .map_err(|_| clap::Error::new(ErrorKind::InvalidValue))?,
            )))
        }
    }
}

async fn get_client(location: DynamoLocation) -> Result<Client> {
    let config = match location.0 {
        Either::Left(region) => {
            aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await
        }
        Either::Right(endpoints) => {
            let ep_url = endpoints.first().ok_or(NoEndpointsSnafu {}.build())?;
            aws_config::defaults(BehaviorVersion::latest())
                .endpoint_url(ep_url.as_str())
                .load()
                .await
        }
    };
    Ok(Client::new(&config))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              main                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

fn configure_logging(matches: &ArgMatches) -> Result<()> {
    let level = match (
        matches.get_flag("debug"),
        matches.get_flag("verbose"),
        matches.get_flag("quiet"),
    ) {
        (true, _, _) => Level::TRACE,
        (false, true, _) => Level::DEBUG,
        (false, false, true) => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env()
        .context(EnvFilterSnafu)?;
    let formatter: Box<dyn Layer<Registry> + Send + Sync> = if matches.get_flag("plain") {
        Box::new(fmt::Layer::default().compact().with_writer(io::stdout))
    } else {
        Box::new(fmt::Layer::default().json().with_writer(io::stdout))
    };
    tracing::subscriber::set_global_default(Registry::default().with(formatter).with(filter))
        .context(SubscriberSnafu)
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut matches = Command::new("forecourt-ddb")
        .version(crate_version!())
        .author(crate_authors!())
        .about("Create the forecourt schema for DynamoDB.")
        .arg(
            Arg::new("debug")
                .short('D')
                .long("debug")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("FORECOURT_DDB_DEBUG")
                .help("produce debug output"),
        )
        .arg(
            Arg::new("plain")
                .short('p')
                .long("plain")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("FORECOURT_DDB_PLAIN")
                .help("log in human-readable format, not JSON/structured logging"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("FORECOURT_DDB_QUIET")
                .help("produce only error output"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("FORECOURT_DDB_VERBOSE")
                .help("produce prolix output"),
        )
        .arg(
            Arg::new("prefix")
                .short('t')
                .long("table-prefix")
                .num_args(1)
                .env("FORECOURT_DDB_PREFIX")
                .help("prefix applied to every table name"),
        )
        .arg(
            Arg::new("location")
                .index(1)
                .value_parser(value_parser!(DynamoLocation))
                .required(true)
                .help("Network location of the DynamoDB cluster")
                .long_help(
                    "Network location of the DynamoDB/ScyllaDB cluster.

Specify as either an AWS region ('us-west-2', e.g.) or as an URL ('http://localhost:8042', e.g.)",
                )
                .env("FORECOURT_DDB_LOCATION"),
        )
        .get_matches();
    configure_logging(&matches)?;

    info!("forecourt-ddb {}", crate_version!());

    let prefix = matches.remove_one::<String>("prefix");
    let location = matches.remove_one::<DynamoLocation>("location").unwrap(/* required */);

    let client = get_client(location).await?;
    forecourt::schemas::create_all(&client, prefix.as_deref())
        .await
        .context(SchemaSnafu)?;
    Ok(())
}
