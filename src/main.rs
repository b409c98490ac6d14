//! MVCS stress runner
//!
//! Command-line interface for running convergence and consistency stress
//! suites against the MVCS crate family.

use stress_test::{
    stress_duplicate_delivery, stress_random_edits, stress_snapshot_restore, StressError,
};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let result = match args.get(1).map(String::as_str) {
        None | Some("quick") => run_quick(),
        Some("full") => run_full(),
        Some("help" | "--help" | "-h") => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            println!("Unknown test suite: {other}");
            print_usage();
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("stress run aborted: {err}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║            MVCS STRESS TEST SUITE                          ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
    println!("Usage: cargo run [test_suite]");
    println!();
    println!("Available test suites:");
    println!("  quick    - Quick smoke runs (default)");
    println!("  full     - Larger fleets and longer schedules");
    println!("  help     - Show this help message");
    println!();
}

fn run_quick() -> Result<(), StressError> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║            QUICK SMOKE RUNS                                ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut all_converged = true;
    for stats in [
        stress_random_edits(3, 200, 10, 1)?,
        stress_duplicate_delivery(3, 100, 2)?,
        stress_snapshot_restore(3, 100, 3)?,
    ] {
        stats.print();
        all_converged &= stats.converged;
    }
    summary(all_converged);
    Ok(())
}

fn run_full() -> Result<(), StressError> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║            FULL STRESS SUITE                               ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut all_converged = true;
    for seed in 0..10 {
        let stats = stress_random_edits(5, 2000, 25, seed)?;
        stats.print();
        all_converged &= stats.converged;
    }
    for seed in 0..5 {
        let stats = stress_duplicate_delivery(4, 500, 100 + seed)?;
        stats.print();
        all_converged &= stats.converged;
    }
    for seed in 0..5 {
        let stats = stress_snapshot_restore(4, 500, 200 + seed)?;
        stats.print();
        all_converged &= stats.converged;
    }
    summary(all_converged);
    Ok(())
}

fn summary(all_converged: bool) {
    println!();
    if all_converged {
        println!("All suites converged.");
    } else {
        println!("CONVERGENCE FAILURES DETECTED, see above.");
        std::process::exit(1);
    }
}
