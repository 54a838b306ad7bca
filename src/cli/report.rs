use ansi_term::Style;
use chrono::{Duration, Local};

use crate::{
    storage::entities::{SessionRecord, TotalsMap},
    utils::format::{format_duration, seconds_percentage, Percentage},
};

fn seconds(v: u64) -> Duration {
    Duration::seconds(v as i64)
}

/// Prints a totals map sorted by accumulated time, with each domain's share
/// of the whole. Domains below `min_percentage` are left out.
pub fn print_totals(title: &str, totals: &TotalsMap, min_percentage: Percentage) {
    let whole: u64 = totals.values().sum();
    println!(
        "{}: {} tracked across {} domains",
        Style::new().bold().paint(title),
        format_duration(seconds(whole)),
        totals.len()
    );

    let mut entries = totals.iter().collect::<Vec<_>>();
    entries.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (domain, &spent) in entries {
        let share = seconds_percentage(spent, whole);
        if share < min_percentage {
            continue;
        }
        println!(
            "{}%\t{}\t{}",
            *share as i32,
            format_duration(seconds(spent)),
            domain
        );
    }
}

pub fn print_sessions(records: &[SessionRecord]) {
    for record in records {
        println!(
            "{}\t{}\t{}\ttab {}",
            record.start.with_timezone(&Local).format("%x %H:%M:%S"),
            format_duration(seconds(record.duration_secs)),
            record.domain,
            record.tab_id
        );
    }
}

pub fn print_limits(limits: &TotalsMap) {
    if limits.is_empty() {
        println!("No limits configured");
        return;
    }
    println!("{}", Style::new().bold().paint("Daily limits"));
    for (domain, &limit) in limits {
        println!("{}\t{}", format_duration(seconds(limit)), domain);
    }
}
