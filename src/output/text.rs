//! Human-readable text output

use super::FinalReport;
use crate::counts::RankedEntry;
use std::fmt::Write;

/// Print the report to stdout
pub fn print_report(report: &FinalReport) {
    print!("{}", format_report(report));
}

/// Render the report as it is printed
pub fn format_report(report: &FinalReport) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "═══════════════════════════════════════════════════════════");
    let _ = writeln!(out, "                    RESULTS");
    let _ = writeln!(out, "═══════════════════════════════════════════════════════════");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "\"{}\" appears {} times",
        report.search_term,
        format_number(report.total_matches)
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Top {} Mentions", report.top_n);
    write_ranking(&mut out, &report.top_mentions);
    let _ = writeln!(out);

    let _ = writeln!(out, "Top {} Topics", report.top_n);
    write_ranking(&mut out, &report.top_topics);
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "{} workers, {:.3} seconds taken",
        report.worker_count, report.elapsed_secs
    );

    out
}

fn write_ranking(out: &mut String, entries: &[RankedEntry]) {
    if entries.is_empty() {
        let _ = writeln!(out, "  (none)");
        return;
    }

    for (i, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "{}: {} ({})", i + 1, entry.key, format_number(entry.count));
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, c) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report() -> FinalReport {
        FinalReport {
            search_term: "kanye".into(),
            total_matches: 3,
            top_n: 10,
            top_mentions: vec![RankedEntry::new("@b", 2)],
            top_topics: vec![RankedEntry::new("#a", 3)],
            worker_count: 2,
            elapsed_secs: 0.25,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_format_report() {
        let text = format_report(&report());

        assert!(text.contains("\"kanye\" appears 3 times\n"));
        assert!(text.contains("Top 10 Mentions\n1: @b (2)\n"));
        assert!(text.contains("Top 10 Topics\n1: #a (3)\n"));
        assert!(text.contains("2 workers, 0.250 seconds taken"));
    }

    #[test]
    fn test_empty_ranking() {
        let mut report = report();
        report.top_mentions.clear();
        assert!(format_report(&report).contains("Top 10 Mentions\n  (none)\n"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }
}
