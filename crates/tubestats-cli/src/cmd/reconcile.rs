//! `tstats reconcile`: retry reconciliation of a day file already written.

use crate::output::{OutputMode, render};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use tubestats_core::StoreConfig;

use super::import::ImportSummary;
use super::{close_store, open_store, parse_when};

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Day whose raw file is reconciled (YYYY-MM-DD).
    #[arg(long, value_parser = super::parse_day)]
    pub day: NaiveDate,

    /// Collection time to reconcile at. Defaults to midnight UTC of the day.
    #[arg(long, value_parser = parse_when)]
    pub at: Option<DateTime<Utc>>,
}

pub fn run_reconcile(args: &ReconcileArgs, output: OutputMode, config: StoreConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let report = store
        .import_day(args.day, args.at)
        .with_context(|| format!("Failed to reconcile {}", args.day))?;
    close_store(store)?;

    let summary = ImportSummary::from(report);
    render(output, &summary, |s, w| s.write_human(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ReconcileArgs,
    }

    #[test]
    fn day_is_required_and_parsed() {
        let w = Wrapper::parse_from(["test", "--day", "2024-02-29"]);
        assert_eq!(w.args.day, NaiveDate::from_ymd_opt(2024, 2, 29).expect("day"));
        assert!(Wrapper::try_parse_from(["test"]).is_err());
        assert!(Wrapper::try_parse_from(["test", "--day", "2023-02-29"]).is_err());
    }
}
