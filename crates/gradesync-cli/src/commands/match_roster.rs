use crate::support::{
    load_roster_or_exit, print_roster_warnings, render_json_or_exit, snapshot_target_or_exit,
    yes_no,
};
use gradesync_core::{MatchOutcome, match_records, snapshot_digest};
use serde_json::json;

fn print_outcome(outcome: &MatchOutcome) {
    println!("  matched: {}", outcome.matches.len());
    for matched in &outcome.matches {
        println!(
            "    - {} -> {} {} ({})",
            matched.source.id(),
            matched.target.id,
            matched.positional_handle,
            matched.method
        );
    }
    println!("  in source not in target: {}", outcome.unmatched_source.len());
    for unmatched in &outcome.unmatched_source {
        println!(
            "    - serial={} id={} name={} ({})",
            unmatched.record.serial(),
            unmatched.record.id(),
            unmatched.record.name(),
            unmatched.reason.as_str()
        );
    }
    println!("  in target not in source: {}", outcome.unmatched_target.len());
    for unmatched in &outcome.unmatched_target {
        println!(
            "    - id={} name={} at {} ({})",
            unmatched.record.id,
            unmatched.record.name,
            unmatched.record.positional_handle,
            unmatched.reason.as_str()
        );
    }
}

pub fn run(roster: String, target: String, json_output: bool) {
    let loaded = load_roster_or_exit(&roster);
    let snapshot = snapshot_target_or_exit(&target);
    let outcome = match_records(&loaded.records, &snapshot);

    if json_output {
        let payload = json!({
            "schema": 1,
            "rosterPath": roster,
            "targetPath": target,
            "hasStatusColumn": loaded.has_status_column,
            "snapshot": snapshot_digest(&snapshot),
            "rosterWarnings": loaded.warnings,
            "matches": outcome.matches,
            "unmatchedSource": outcome.unmatched_source,
            "unmatchedTarget": outcome.unmatched_target,
        });
        println!("{}", render_json_or_exit(&payload, "match"));
        return;
    }

    print_roster_warnings(&loaded.warnings);
    println!("gradesync match (dry run)");
    println!();
    println!(
        "  roster: {} ({} row(s), status column: {})",
        roster,
        loaded.records.len(),
        yes_no(loaded.has_status_column)
    );
    println!("  target: {} ({} row(s))", target, snapshot.len());
    print_outcome(&outcome);
}
