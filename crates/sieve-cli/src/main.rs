//! Netsieve CLI
//!
//! CLI tool for compiling filter lists, building selfies and checking
//! requests against them.

mod bench;
mod config;
mod selfie;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Serialize;

use sieve_compiler::Compiler;
use sieve_core::selfie::{header, read_u16_le, read_u32_le, section_entry, SectionId, SECTION_ENTRY_SIZE};
use sieve_core::types::{FilteringContext, RequestType};
use sieve_core::{LogData, MatchResult};

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "sieve")]
#[command(about = "Static network filter compiler and tools")]
struct Cli {
    /// JSON file with `tokens` and `engine` settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile filter lists into compiled-list files
    Compile {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Output directory, one `<name>.compiled` per list
        #[arg(short, long, default_value = "compiled")]
        output: PathBuf,
    },

    /// Compile filter lists and write an engine selfie
    Selfie {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Output selfie file
        #[arg(short, long, default_value = "engine.selfie")]
        output: PathBuf,
    },

    /// Dump selfie info
    Info {
        /// Selfie file to inspect
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Classify a single request
    Match {
        /// Selfie file to match against
        #[arg(long)]
        selfie: PathBuf,

        /// Request URL
        #[arg(long)]
        url: String,

        /// URL of the document issuing the request
        #[arg(long, default_value = "")]
        document: String,

        /// Request type (script, image, xhr, sub_frame, popup, elemhide, ...)
        #[arg(long = "type", default_value = "other")]
        request_type: String,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Time `match_request` over synthetic requests
    Bench {
        /// Selfie file to benchmark
        #[arg(long)]
        selfie: PathBuf,

        /// Number of distinct requests
        #[arg(short = 'n', long, default_value_t = 10_000)]
        requests: usize,

        /// Passes over the request set
        #[arg(long, default_value_t = 5)]
        iterations: usize,

        #[arg(long, default_value_t = 0xc0ffee)]
        seed: u32,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = CliConfig::load(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Compile { input, output } => cmd_compile(&input, &output, &config, cli.verbose),
        Commands::Selfie { input, output } => cmd_selfie(&input, &output, &config, cli.verbose),
        Commands::Info { input } => cmd_info(&input, &config),
        Commands::Match {
            selfie,
            url,
            document,
            request_type,
            json,
        } => cmd_match(&selfie, &url, &document, &request_type, json, &config),
        Commands::Bench {
            selfie,
            requests,
            iterations,
            seed,
        } => cmd_bench(&selfie, requests, iterations, seed, &config),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_compile(inputs: &[String], output: &Path, config: &CliConfig, verbose: bool) -> Result<(), String> {
    let start = Instant::now();
    let compiler = Compiler::new(config.tokens.clone());
    let lists = selfie::compile_inputs(inputs, &compiler, verbose)?;

    let mut accepted = 0usize;
    let mut rejected = 0usize;
    for list in &lists {
        let path = output.join(format!("{}.compiled", list.name));
        selfie::write_bytes(&path, list.text.as_bytes())?;
        accepted += list.stats.accepted;
        rejected += list.stats.rejected;
        println!(
            "  {} -> {} ({} entries, {} diagnostics)",
            list.name,
            path.display(),
            list.stats.accepted,
            list.diagnostics.len()
        );
    }

    println!("Compiled {} filter lists to '{}'", lists.len(), output.display());
    println!("  Accepted: {}", accepted);
    println!("  Rejected: {}", rejected);
    println!("  Time:     {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}

fn cmd_selfie(inputs: &[String], output: &Path, config: &CliConfig, verbose: bool) -> Result<(), String> {
    let start = Instant::now();
    let compiler = Compiler::new(config.tokens.clone());
    let lists = selfie::compile_inputs(inputs, &compiler, verbose)?;
    let compile_time = start.elapsed();

    let build_start = Instant::now();
    let engine = selfie::build_engine(&lists, config.engine)?;
    let bytes = engine.serialize();
    let build_time = build_start.elapsed();

    sieve_core::Engine::deserialize(&bytes, config.engine)
        .map_err(|e| format!("Generated selfie failed validation: {}", e))?;
    selfie::write_bytes(output, &bytes)?;

    let stats = engine.stats();
    let deduplicated: usize = lists.iter().map(|l| l.stats.deduplicated).sum();
    let rejected: usize = lists.iter().map(|l| l.stats.rejected).sum();

    println!("Wrote selfie for {} filter lists to '{}'", lists.len(), output.display());
    println!("  Records:  {} (cross-list duplicates {})", stats.records, stats.duplicates);
    println!(
        "  Hostnames: {}",
        stats.important.hostnames + stats.exception.hostnames + stats.block.hostnames
    );
    println!("  Rejected: {} (in-list duplicates {})", rejected, deduplicated);
    println!("  Size:     {} bytes ({:.1} KB)", bytes.len(), bytes.len() as f64 / 1024.0);
    println!(
        "  Time:     {:.1}ms (compile: {:.1}ms, build: {:.1}ms)",
        start.elapsed().as_secs_f64() * 1000.0,
        compile_time.as_secs_f64() * 1000.0,
        build_time.as_secs_f64() * 1000.0,
    );
    Ok(())
}

fn cmd_info(input: &Path, config: &CliConfig) -> Result<(), String> {
    let bytes = selfie::read_selfie(input)?;
    let engine = sieve_core::Engine::deserialize(&bytes, config.engine)
        .map_err(|e| format!("Invalid selfie: {}", e))?;

    let field16 = |offset| read_u16_le(&bytes, offset).unwrap_or(0);
    let field32 = |offset| read_u32_le(&bytes, offset).unwrap_or(0);

    println!("Selfie: {}", input.display());
    println!("  Magic:       SNSF");
    println!("  Version:     {}", field16(header::VERSION));
    println!("  Records:     {}", field32(header::RECORD_COUNT));
    println!("  Lists:       {}", field32(header::LIST_COUNT));
    println!("  CRC32:       {:08x}", field32(header::SELFIE_CRC32));
    println!("  Total size:  {} bytes ({:.1} KB)", bytes.len(), bytes.len() as f64 / 1024.0);
    println!();

    let section_count = field32(header::SECTION_COUNT) as usize;
    let dir = field32(header::SECTION_DIR_OFFSET) as usize;
    println!("Sections:");
    for i in 0..section_count {
        let entry = dir + i * SECTION_ENTRY_SIZE;
        let name = SectionId::try_from(field16(entry + section_entry::ID))
            .map(SectionId::name)
            .unwrap_or("unknown");
        println!(
            "  {:<10} offset {:>8}  length {:>8}  count {:>7}",
            name,
            field32(entry + section_entry::OFFSET),
            field32(entry + section_entry::LENGTH),
            field32(entry + section_entry::COUNT),
        );
    }
    println!();

    println!("Lists:");
    for (id, name) in engine.lists().iter().enumerate() {
        println!("  [{}] {}", id, name);
    }
    println!();

    let stats = engine.stats();
    println!("Realms:");
    for (realm, s) in [("important", &stats.important), ("exception", &stats.exception), ("block", &stats.block)] {
        println!(
            "  {:<10} {} token buckets ({} records), {} no-token, {} regex, {} hostnames ({} sparse, {} dense buckets)",
            realm,
            s.token_buckets,
            s.token_records,
            s.no_token,
            s.regex,
            s.hostnames,
            s.hostname_layout.sparse,
            s.hostname_layout.dense
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct MatchOutput {
    result: &'static str,
    code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<LogData>,
}

fn result_name(result: MatchResult) -> &'static str {
    match result {
        MatchResult::NoMatch => "nomatch",
        MatchResult::Blocked => "blocked",
        MatchResult::Allowed => "allowed",
    }
}

fn cmd_match(
    selfie_path: &Path,
    url: &str,
    document: &str,
    request_type: &str,
    json: bool,
    config: &CliConfig,
) -> Result<(), String> {
    let engine = selfie::load_engine(selfie_path, config.engine)?;
    let ctx = FilteringContext::new(url, document, RequestType::from_type_name(request_type));
    let verdict = engine.match_request(&ctx);

    let output = MatchOutput {
        result: result_name(verdict.result),
        code: verdict.result.into(),
        filter: engine.to_log_data(&verdict),
    };

    if json {
        let text = serde_json::to_string_pretty(&output).map_err(|e| format!("Failed to encode result: {}", e))?;
        println!("{}", text);
        return Ok(());
    }

    println!("{}", output.result);
    if let Some(filter) = &output.filter {
        println!("  Filter:  {}", filter.raw_filter);
        println!("  List:    {}", filter.source_list);
        println!("  Realm:   {}", filter.realm);
        println!("  Reason:  {}", filter.reason.join(", "));
    }
    Ok(())
}

fn cmd_bench(selfie_path: &Path, requests: usize, iterations: usize, seed: u32, config: &CliConfig) -> Result<(), String> {
    let engine = selfie::load_engine(selfie_path, config.engine)?;
    bench::run(
        &engine,
        &bench::BenchOptions {
            requests,
            iterations,
            seed,
        },
    )
}
