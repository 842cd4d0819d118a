use clap::Parser;

use crate::watch::priority::PriorityChange;

#[derive(Parser)]
#[command(
    name = "focusnice",
    about = "Renice the process owning the focused X11 window"
)]
pub struct Cli {
    /// Add DELTA to the focused process's current priority (negative raises it)
    #[arg(
        short = 'a',
        long = "add",
        value_name = "DELTA",
        allow_negative_numbers = true,
        conflicts_with = "set"
    )]
    pub add: Option<i32>,

    /// Set the focused process's priority to PRIORITY outright
    #[arg(
        short = 's',
        long = "set",
        value_name = "PRIORITY",
        allow_negative_numbers = true
    )]
    pub set: Option<i32>,

    /// X11 display to connect to (defaults to $DISPLAY)
    #[arg(short = 'd', long = "display", value_name = "DISPLAY")]
    pub display: Option<String>,
}

impl Cli {
    /// Fold the add/set options into a priority change.
    ///
    /// Additive with a delta of -1 when neither option is given.
    pub fn change(&self) -> PriorityChange {
        match (self.add, self.set) {
            (_, Some(value)) => PriorityChange::Set(value),
            (Some(delta), None) => PriorityChange::Add(delta),
            (None, None) => PriorityChange::Add(-1),
        }
    }
}
