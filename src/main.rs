#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod api;
mod cache;
mod cli;
mod controller;
mod core;
mod plant;
mod prelude;
mod quantity;
mod report;
mod tables;

use clap::{Parser, crate_version};

use crate::{
    cli::{Args, Command, hunt, rbc},
    prelude::*,
};

fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    info!(version = crate_version!(), "starting…");

    let args = Args::parse();

    match args.command {
        Command::Hunt(args) => {
            hunt(&args)?;
            args.heartbeat.send();
        }
        Command::Rbc(args) => {
            rbc(&args)?;
        }
    }

    info!("done!");
    Ok(())
}
