use crate::builder::BuildStats;
use crate::query::diff::DiffImpact;
use crate::query::impact::{CallImpact, FileImpact};
use crate::query::map::ModuleRank;
use crate::query::symbols::SymbolReport;

/// Compact one-line-per-result output by default; `--json` switches every
/// command to a machine-readable array.

pub fn print_build(stats: &BuildStats, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(stats).unwrap());
    } else {
        println!(
            "indexed {} files: {} nodes, {} edges ({} skipped)",
            stats.files, stats.nodes, stats.edges, stats.skipped
        );
    }
}

pub fn print_find(reports: &[SymbolReport], json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(reports).unwrap());
        return;
    }
    for report in reports {
        let s = &report.symbol;
        println!("{} [{}] {}:{}", s.name, s.kind.as_str(), s.file, s.line);
        for caller in &report.callers {
            let via = if caller.via.is_empty() {
                String::new()
            } else {
                format!(" via {}", caller.via.join(" -> "))
            };
            let dynamic = if caller.dynamic { " dynamic" } else { "" };
            println!(
                "  <- {} {}:{} ({:.1}{}){}",
                caller.node.name, caller.node.file, caller.node.line, caller.confidence, dynamic, via
            );
        }
        for callee in &report.callees {
            let dynamic = if callee.dynamic { " dynamic" } else { "" };
            println!(
                "  -> {} {}:{} ({:.1}{})",
                callee.node.name, callee.node.file, callee.node.line, callee.confidence, dynamic
            );
        }
    }
}

pub fn print_function_impact(results: &[CallImpact], json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(results).unwrap());
        return;
    }
    for hit in results {
        println!(
            "{}{} [{}] {}:{} ({:.1})",
            "  ".repeat(hit.depth.saturating_sub(1)),
            hit.node.name,
            hit.node.kind.as_str(),
            hit.node.file,
            hit.node.line,
            hit.confidence
        );
    }
}

pub fn print_file_impact(results: &[FileImpact], json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(results).unwrap());
        return;
    }
    for hit in results {
        println!("{}{} (level {})", "  ".repeat(hit.level - 1), hit.file, hit.level);
    }
}

pub fn print_map(ranks: &[ModuleRank], json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(ranks).unwrap());
        return;
    }
    for rank in ranks {
        println!("{:>6}  {}", rank.inbound, rank.file);
    }
}

pub fn print_diff(results: &[DiffImpact], json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(results).unwrap());
        return;
    }
    for impact in results {
        let d = &impact.definition;
        println!(
            "{} [{}] {}:{}-{}",
            d.name,
            d.kind.as_str(),
            d.file,
            d.line,
            d.end_line.map_or("?".to_owned(), |e| e.to_string())
        );
        for caller in &impact.callers {
            println!(
                "  <- {} {}:{} (depth {}, {:.1})",
                caller.node.name, caller.node.file, caller.node.line, caller.depth, caller.confidence
            );
        }
    }
}
