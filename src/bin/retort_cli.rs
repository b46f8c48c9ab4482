//! Retort CLI - Command line tool to enumerate reaction products from structure files.
//!
//! Usage:
//!   retort --reactants mols1.txt --reaction "C>>{0}O" --output products.tsv
//!   retort --reactants mols1.txt --reactants2 mols2.txt --reaction "C.N>>{0}{1}" --matrix
//!   retort --reactants mols1.txt --reactants2 mols2.txt --reaction "C.N>>{0}{1}" --matrix --max-random 1000 --seed 42
//!
//! Input files carry one structure per line in the template engine's textual
//! form; a blank line is a missing structure and lines starting with `#` are
//! skipped.

use clap::Parser;
use retort::chem::template::TemplateChemistry;
use retort::chem::{ChemistryEngine, ReactionSource};
use retort::core::{RunOptions, RunOutcome, StructureRecord};
use retort::plan::CombinationPolicy;
use retort::pool::PoolConfig;
use retort::report::CancelFlag;
use retort::stream::InMemoryStream;
use retort::ReactionBatchEngine;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "retort")]
#[command(about = "Retort - Apply a reaction template across structure streams")]
struct Args {
    /// First reactant file (one structure per line, blank line = missing)
    #[arg(short, long)]
    reactants: String,

    /// Optional second reactant file for two-component reactions
    #[arg(long)]
    reactants2: Option<String>,

    /// Reaction template, e.g. "C.N>>{0}{1}"
    #[arg(short = 'x', long)]
    reaction: String,

    /// Expand the full reactant matrix instead of pairing row by row
    #[arg(long)]
    matrix: bool,

    /// Emit each product only once per reactant combination row
    #[arg(long)]
    unique: bool,

    /// Bound the number of randomly picked combinations
    #[arg(long)]
    max_random: Option<u64>,

    /// Random seed for reproducible sampling (omit for a fresh pick per run)
    #[arg(long)]
    seed: Option<i64>,

    /// Worker thread count (default: 1.5 x available cores)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Output TSV path (default: stdout)
    #[arg(short, long)]
    output: Option<String>,
}

fn read_structures(
    chem: &TemplateChemistry,
    path: &str,
) -> Result<InMemoryStream, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let text = line.trim();
        if text.starts_with('#') {
            continue;
        }
        let structure = if text.is_empty() { None } else { Some(chem.structure(text)) };
        records.push(StructureRecord::new(records.len() as u64, structure));
    }
    Ok(InMemoryStream::new(records))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Retort");
    println!("======\n");

    let chem = Arc::new(TemplateChemistry::new());

    let primary = read_structures(&chem, &args.reactants)?;
    let secondary = match &args.reactants2 {
        Some(path) => Some(read_structures(&chem, path)?),
        None => None,
    };

    let mut policy =
        if args.matrix { CombinationPolicy::matrix() } else { CombinationPolicy::paired() };
    if let Some(max_count) = args.max_random {
        policy = policy.with_sampling(max_count, args.seed);
    }

    let options = RunOptions { unique_products: args.unique, passthrough_columns: Vec::new() };

    println!("Configuration:");
    println!("  Reactants 1: {} ({} structures)", args.reactants, primary.len());
    if let Some(path) = &args.reactants2 {
        println!(
            "  Reactants 2: {} ({} structures)",
            path,
            secondary.as_ref().map_or(0, |s| s.len())
        );
    }
    println!("  Reaction: {}", args.reaction);
    println!("  Mode: {}", if args.matrix { "matrix" } else { "paired" });
    if let Some(max_count) = args.max_random {
        println!(
            "  Sampling: up to {} combinations, seed {}",
            max_count,
            args.seed.map_or("random".to_string(), |s| s.to_string())
        );
    }
    println!();

    let cancel = CancelFlag::new();
    let cancel_handler = cancel.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, finishing in-flight work...");
        cancel_handler.cancel();
    })?;

    let mut engine =
        ReactionBatchEngine::new(Arc::clone(&chem) as Arc<dyn ChemistryEngine>);
    if let Some(workers) = args.workers {
        engine = engine.with_pool_config(PoolConfig::with_workers(workers));
    }

    let mut writer: BufWriter<Box<dyn Write + Send>> = match &args.output {
        Some(path) => BufWriter::new(Box::new(File::create(path)?)),
        None => BufWriter::new(Box::new(std::io::stdout())),
    };
    writeln!(writer, "product\tset\tindex\treactant_indices\treactants")?;

    let chem_for_rows = Arc::clone(&chem);
    let mut write_error = None;
    let summary = engine.run(
        &primary,
        secondary.as_ref().map(|s| s as &dyn retort::stream::StructureStream),
        &ReactionSource::Pattern(args.reaction.clone()),
        &policy,
        &options,
        &cancel,
        |rows| {
            for row in rows {
                let reactant_indices: Vec<String> =
                    row.reactant_indices.iter().map(|i| i.to_string()).collect();
                let reactant_texts: Vec<String> = row
                    .reactant_structures
                    .iter()
                    .map(|s| chem_for_rows.render(s))
                    .collect();
                if let Err(e) = writeln!(
                    writer,
                    "{}\t{}\t{}\t{}\t{}",
                    chem_for_rows.render(&row.product_structure),
                    row.product_set_index,
                    row.product_index,
                    reactant_indices.join(","),
                    reactant_texts.join(","),
                ) {
                    if write_error.is_none() {
                        write_error = Some(e);
                    }
                }
            }
        },
    )?;

    writer.flush()?;
    if let Some(e) = write_error {
        return Err(Box::new(e));
    }

    println!("\nRetort Complete!");
    println!("================");
    println!(
        "Outcome:       {}",
        match summary.outcome {
            RunOutcome::Completed => "completed",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::SecondaryStreamEnded => "second reactant stream ended early",
        }
    );
    println!("Rows emitted:  {}", summary.rows_emitted);
    if summary.warnings.is_empty() {
        println!("Warnings:      none");
    } else {
        println!("Warnings:");
        let mut categories: Vec<_> = summary.warnings.iter().collect();
        categories.sort();
        for (category, count) in categories {
            println!("  {:<18} {}", category, count);
        }
    }

    Ok(())
}
