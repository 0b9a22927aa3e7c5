//! Developer tasks for the pooled-datasource workspace.
//!
//! Run with `cargo xtask <command>`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

/// Library crate holding the facade and its unit tests.
const CORE: &str = "pooled-datasource";
/// Stub pool crate holding the lifecycle integration tests.
const STUBS: &str = "pooled-datasource-testing";

#[derive(Parser)]
#[command(name = "xtask", about = "Developer tasks for pooled-datasource")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every check in `CHECKS`, stopping at the first failure
    Ci,
    /// Run one named check (fmt, clippy, unit, lifecycle, doc)
    Check {
        /// Check name
        name: String,
    },
    /// Run unit tests, then the lifecycle integration tests
    Test,
    /// Run the datasource criterion bench
    Bench {
        /// Only run benchmarks whose name contains this filter
        filter: Option<String>,
    },
    /// Run a fuzz target for a bounded time (requires cargo-fuzz)
    Fuzz {
        /// Fuzz target name
        #[arg(default_value = "connection_string")]
        target: String,
        /// Maximum run time in seconds
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
}

struct Check {
    name: &'static str,
    run: fn(&Shell) -> Result<()>,
}

const CHECKS: &[Check] = &[
    Check { name: "fmt", run: fmt },
    Check { name: "clippy", run: clippy },
    Check { name: "unit", run: unit_tests },
    Check { name: "lifecycle", run: lifecycle_tests },
    Check { name: "doc", run: doc },
];

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root()?);

    match cli.command {
        Command::Ci => {
            for check in CHECKS {
                run_check(&sh, check)?;
            }
            println!("ci: {} checks passed", CHECKS.len());
        }
        Command::Check { name } => {
            let Some(check) = CHECKS.iter().find(|c| c.name == name) else {
                let known: Vec<_> = CHECKS.iter().map(|c| c.name).collect();
                bail!("unknown check {name:?}, expected one of {}", known.join(", "));
            };
            run_check(&sh, check)?;
        }
        Command::Test => {
            unit_tests(&sh)?;
            lifecycle_tests(&sh)?;
        }
        Command::Bench { filter } => bench(&sh, filter.as_deref())?,
        Command::Fuzz { target, seconds } => fuzz(&sh, &target, seconds)?,
    }

    Ok(())
}

fn run_check(sh: &Shell, check: &Check) -> Result<()> {
    println!("==> {}", check.name);
    (check.run)(sh).with_context(|| format!("check `{}` failed", check.name))
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;

    let manifest = String::from_utf8(output.stdout).context("invalid UTF-8 in cargo output")?;
    PathBuf::from(manifest.trim())
        .parent()
        .map(PathBuf::from)
        .context("manifest path has no parent")
}

fn fmt(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo fmt --all -- --check").run()?;
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    Ok(())
}

fn unit_tests(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo test -p {CORE}").run()?;
    Ok(())
}

fn lifecycle_tests(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo test -p {STUBS}").run()?;
    Ok(())
}

fn doc(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo doc -p {CORE} --no-deps")
        .env("RUSTDOCFLAGS", "-D warnings")
        .run()?;
    Ok(())
}

fn bench(sh: &Shell, filter: Option<&str>) -> Result<()> {
    let filter = filter.into_iter();
    cmd!(sh, "cargo bench -p {CORE} --bench datasource -- {filter...}").run()?;
    Ok(())
}

fn fuzz(sh: &Shell, target: &str, seconds: u64) -> Result<()> {
    let max_time = format!("-max_total_time={seconds}");
    let _dir = sh.push_dir("fuzz");
    cmd!(sh, "cargo +nightly fuzz run {target} -- {max_time}").run()?;
    println!("fuzz: {target} ran {seconds}s without crashes");
    Ok(())
}
