mod cli;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::prelude::*;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

use cfglink::binary::Blob;
use cfglink::compiler::{compile_json, CompiledGrammar};
use cfglink::engine::{publish_list, MemoryRecognizer, Recognizer};
use cfglink::generator::generate;
use cfglink::phrase::{match_phrase, RecognizedWord};
use cli::{Cli, Command, ListArgs};

fn load_grammar(path: &Path) -> Result<CompiledGrammar> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let grammar = compile_json(&text).with_context(|| format!("compiling {}", path.display()))?;
    Ok(grammar)
}

// Loads the grammar into an in-memory recognizer and fills its lists the same
// way a live engine would be updated
fn load_with_lists(path: &Path, lists: &ListArgs) -> Result<CompiledGrammar> {
    let mut grammar = load_grammar(path)?;
    let mut engine = MemoryRecognizer::new();
    engine.load_grammar(grammar.name(), grammar.blob())?;
    for (name, items) in &lists.lists {
        publish_list(&mut grammar, &mut engine, name, items)?;
    }
    Ok(grammar)
}

fn compile(path: &Path, output: Option<PathBuf>) -> Result<()> {
    let grammar = load_grammar(path)?;
    let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.bin", grammar.name())));
    fs::write(&output, grammar.blob()).with_context(|| format!("writing {}", output.display()))?;
    println!(
        "compiled `{}`: {} rules, {} words, {} lists, {} imports, {} bytes -> {}",
        grammar.name(),
        grammar.rules().len(),
        grammar.words().len(),
        grammar.lists().len(),
        grammar.imports().len(),
        grammar.blob().len(),
        output.display()
    );
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let blob = Blob::parse(&data).with_context(|| format!("decoding {}", path.display()))?;
    print!("{}", blob);
    Ok(())
}

fn read_words(words: Vec<String>, input: Option<PathBuf>) -> Result<Vec<RecognizedWord>> {
    match input {
        Some(path) => {
            let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(words.iter().map(|word| RecognizedWord::verbatim(word)).collect()),
    }
}

fn match_words(path: &Path, words: Vec<String>, input: Option<PathBuf>, lists: &ListArgs) -> Result<()> {
    let grammar = load_with_lists(path, lists)?;
    let mut words = read_words(words, input)?;
    let result = match_phrase(&grammar, &mut words);
    println!("{}", serde_json::to_string_pretty(&result.to_json(&words))?);

    if !result.accepts(words.len()) {
        bail!("phrase not accepted: matched {} of {} words", result.consumed, words.len());
    }
    Ok(())
}

fn sample(path: &Path, amount: u32, seed: Option<u64>, lists: &ListArgs) -> Result<()> {
    let grammar = load_with_lists(path, lists)?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    for _ in 0..amount {
        let words = generate(&grammar, &mut rng)?;
        let texts: Vec<&str> = words.iter().map(|word| word.text.as_str()).collect();
        println!("{}", texts.join(" "));
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Compile { grammar, output } => compile(&grammar, output),
        Command::Dump { grammar } => {
            print!("{}", load_grammar(&grammar)?.dump());
            Ok(())
        }
        Command::Inspect { blob } => inspect(&blob),
        Command::Match { grammar, words, input, lists } => match_words(&grammar, words, input, &lists),
        Command::Sample { grammar, amount, seed, lists } => sample(&grammar, amount, seed, &lists),
    }
}
