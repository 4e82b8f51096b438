//! Prints the summary of a finished run.

use std::time::Duration;

use kvload_core::Summary;
use kvload_core::sampler::OperationStats;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

pub fn print_summary(strategy: &str, summary: &Summary) {
    let elapsed = summary.elapsed();

    println!();
    println!(
        "{} {} ({} ops in {:.2?})",
        "## Run".bold(),
        strategy.bold().blue(),
        summary.total().bold(),
        elapsed
    );

    for (kind, stats) in summary.operations() {
        let label = format!("{}:", kind.as_str().to_uppercase());
        print!("{} ({} ops", label.bold().green(), stats.successes.bold());
        if stats.hits > 0 {
            print!(", {} hits", stats.hits);
        }
        println!(")");
        print_ops(stats, elapsed);
        print_percentiles(&stats.latency, Duration::from_secs_f64);
    }

    for (failure, count) in summary.failures() {
        println!(
            "{}",
            format!("{count} {} FAILURES", failure.to_uppercase())
                .bold()
                .red()
        );
    }

    println!();
    println!(
        "{} {:.2} operations/s",
        "TOTAL:".bold(),
        summary.throughput().bold()
    );
}

fn print_ops(stats: &OperationStats, duration: Duration) {
    let secs = duration.as_secs_f64();
    let ops_ps = if secs > 0.0 {
        stats.successes as f64 / secs
    } else {
        0.0
    };
    println!("  {:.2} operations/s", ops_ps.bold());
}

fn print_percentiles<T: std::fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let ops = sketch.count();
    let (Some(sum), Ok(Some(p50)), Ok(Some(p90)), Ok(Some(p99))) = (
        sketch.sum(),
        sketch.quantile(0.5),
        sketch.quantile(0.9),
        sketch.quantile(0.99),
    ) else {
        return;
    };

    let avg = map(sum / ops as f64);
    let (p50, p90, p99) = (map(p50), map(p90), map(p99));
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}
