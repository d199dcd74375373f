use std::path::Path;
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the fleet simulation workspace",
    long_about = "A unified CLI for running scenarios, tests, benchmarks,\n\
                  and CI checks in the fleet simulation workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the synthetic scenario (100 vehicles, 800 requests)
    Run {
        /// Seed for the scenario generator
        #[arg(long, env = "FLEET_SEED", default_value_t = 42)]
        seed: u64,
        /// Build profile used for the run
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
    },
    /// Run unit, system and integration tests
    Test,
    /// Run Criterion benchmarks
    Bench,
    /// Compare benchmarks: stash changes, create baseline, restore, compare
    BenchCompare,
    /// Run CI checks (fmt, clippy, tests, examples, benchmarks)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Build and run the example scenario
    Examples,
    /// Run benchmarks
    Bench,
    /// Run check + examples + bench
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n--- {label}");
}

/// Runs `program` with `args`, exiting with its status code on failure.
fn run_checked(program: &str, args: &[&str]) {
    eprintln!("+ {program} {}", args.join(" "));
    let status: ExitStatus = Command::new(program)
        .args(args)
        .status()
        .unwrap_or_else(|e| panic!("failed to execute {program}: {e}"));
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_cargo(args: &[&str]) {
    run_checked("cargo", args);
}

fn run_git(args: &[&str]) {
    run_checked("git", args);
}

fn run_scenario(seed: u64, profile: BuildProfile) {
    let seed = seed.to_string();
    let mut args = vec!["run", "-p", "fleet_core", "--example", "scenario_run"];
    args.extend(profile.as_cargo_flag());
    args.extend(["--", seed.as_str()]);
    run_cargo(&args);
}

fn bench(extra: &[&str]) {
    let mut args = vec!["bench", "--package", "fleet_core", "--bench", "performance"];
    if !extra.is_empty() {
        args.push("--");
        args.extend_from_slice(extra);
    }
    run_cargo(&args);
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy (warnings are errors)");
    run_cargo(&["clippy", "--workspace", "--all-targets", "--all-features", "--", "-D", "warnings"]);

    step("Test fleet_core with and without test helpers");
    run_cargo(&["test", "-p", "fleet_core", "--all-targets"]);
    run_cargo(&["check", "-p", "fleet_core", "--lib", "--no-default-features"]);
}

fn ci_examples() {
    step("Run scenario_run (100 vehicles, 800 requests)");
    run_scenario(42, BuildProfile::Release);
}

fn ci_bench() {
    step("Run benchmarks");
    bench(&[]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { seed, profile } => run_scenario(seed, profile),
        Commands::Test => {
            run_cargo(&["test", "-p", "fleet_core", "--all-targets"]);
        }
        Commands::Bench => bench(&[]),
        Commands::BenchCompare => {
            let criterion_dir = Path::new("target/criterion");
            if criterion_dir.exists() {
                step("Clearing previous criterion results");
                std::fs::remove_dir_all(criterion_dir)
                    .unwrap_or_else(|e| panic!("cannot clear {}: {e}", criterion_dir.display()));
            }

            step("Stashing working tree");
            run_git(&["stash", "push", "-m", "xtask bench-compare"]);

            step("Baseline: benchmarks without local changes");
            bench(&["--save-baseline", "main"]);

            step("Restoring working tree");
            run_git(&["stash", "pop"]);

            step("Comparison: benchmarks with local changes");
            bench(&["--baseline", "main"]);

            eprintln!("\nCompared against baseline `main`; see criterion output above.");
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Examples => ci_examples(),
                CiJob::Bench => ci_bench(),
                CiJob::All => {
                    ci_check();
                    ci_examples();
                    ci_bench();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}
