mod amber;
mod hardware;
mod heartbeat;
mod home_assistant;
mod hunt;
mod load_model;
mod optimizer;
mod rbc;

use clap::{Parser, Subcommand};

pub use self::{
    hunt::{HuntArgs, hunt},
    rbc::{RbcArgs, rbc},
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: read the plant, optimize the dispatch plan, and actuate its first step.
    #[clap(name = "hunt")]
    Hunt(Box<HuntArgs>),

    /// Run the rule-based controller in a loop.
    #[clap(name = "rbc")]
    Rbc(Box<RbcArgs>),
}
