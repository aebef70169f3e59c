// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Parser, Subcommand};

use lattice_rs::condition;
use lattice_rs::definition::{GraphDefinition, NodeKindDef};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a graph definition for structural and condition errors
    Validate {
        /// Path to the definition file
        #[arg(short, long)]
        file: String,
    },
    /// Print a summary of a graph definition
    Inspect {
        /// Path to the definition file
        #[arg(short, long)]
        file: String,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Commands::Validate { file } => {
            let definition = GraphDefinition::from_file(&file)
                .with_context(|| format!("failed to load '{}'", file))?;
            let problems = validate_definition(&definition);
            if problems.is_empty() {
                println!(
                    "{}: ok ({} nodes, {} edges)",
                    definition.name,
                    definition.nodes.len(),
                    definition.edges.len()
                );
                Ok(())
            } else {
                for problem in &problems {
                    eprintln!("error: {}", problem);
                }
                anyhow::bail!("{} problem(s) in '{}'", problems.len(), file);
            }
        }
        Commands::Inspect { file } => {
            let definition = GraphDefinition::from_file(&file)
                .with_context(|| format!("failed to load '{}'", file))?;
            print_summary(&definition);
            Ok(())
        }
    }
}

/// Structural checks that need no capability registry: edge endpoints,
/// start node, parseable conditions
fn validate_definition(definition: &GraphDefinition) -> Vec<String> {
    let mut problems = Vec::new();
    let ids: Vec<&str> = definition.nodes.iter().map(|n| n.id.as_str()).collect();

    for (i, id) in ids.iter().enumerate() {
        if ids[..i].contains(id) {
            problems.push(format!("duplicate node id '{}'", id));
        }
    }

    for edge in &definition.edges {
        for endpoint in [&edge.from, &edge.to] {
            if !ids.contains(&endpoint.as_str()) {
                problems.push(format!(
                    "edge {} -> {} references unknown node '{}'",
                    edge.from, edge.to, endpoint
                ));
            }
        }
        if let Some(when) = &edge.when {
            if let Err(e) = condition::parse(when) {
                problems.push(format!("edge {} -> {}: {}", edge.from, edge.to, e));
            }
        }
    }

    for node in &definition.nodes {
        let expr = match &node.kind {
            NodeKindDef::Conditional { when, .. } => Some(when),
            NodeKindDef::Loop { condition, .. } => Some(condition),
            _ => None,
        };
        if let Some(expr) = expr {
            if let Err(e) = condition::parse(expr) {
                problems.push(format!("node '{}': {}", node.id, e));
            }
        }
    }

    if let Some(start) = &definition.start {
        if !ids.contains(&start.as_str()) {
            problems.push(format!("start node '{}' does not exist", start));
        }
    } else if definition.nodes.is_empty() {
        problems.push("definition has no nodes".to_string());
    }

    for id in &definition.terminal {
        if !ids.contains(&id.as_str()) {
            problems.push(format!("terminal node '{}' does not exist", id));
        }
    }

    problems
}

fn print_summary(definition: &GraphDefinition) {
    println!("graph: {}", definition.name);
    if !definition.description.is_empty() {
        println!("  {}", definition.description);
    }
    println!("state fields: {}", definition.state.fields.len());
    println!("nodes:");
    for node in &definition.nodes {
        let kind = match &node.kind {
            NodeKindDef::Function { capability, .. } => format!("function ({})", capability),
            NodeKindDef::Conditional { when, .. } => format!("conditional ({})", when),
            NodeKindDef::Loop {
                condition,
                max_iterations,
                ..
            } => format!("loop ({}, cap {})", condition, max_iterations),
            NodeKindDef::Action { request_key, .. } => format!("action (from '{}')", request_key),
            NodeKindDef::Aggregator { sources, .. } => {
                format!("aggregator ({} sources)", sources.len())
            }
        };
        println!("  {} - {}", node.id, kind);
    }
    println!("edges:");
    for edge in &definition.edges {
        match &edge.when {
            Some(when) => println!("  {} -> {} when {}", edge.from, edge.to, when),
            None => println!("  {} -> {}", edge.from, edge.to),
        }
    }
    if let Some(start) = &definition.start {
        println!("start: {}", start);
    }
    if !definition.terminal.is_empty() {
        println!("terminal: {}", definition.terminal.join(", "));
    }
}
