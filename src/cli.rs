use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile a grammar document into a binary grammar
    Compile {
        /// JSON grammar document
        grammar: PathBuf,

        /// Where to write the blob (default: <grammar name>.bin)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print every rule's optimized tree and automaton
    Dump {
        /// JSON grammar document
        grammar: PathBuf,
    },

    /// Decode and print a binary grammar
    Inspect {
        /// Compiled blob
        blob: PathBuf,
    },

    /// Match a phrase against a grammar and print the attribution
    Match {
        /// JSON grammar document
        grammar: PathBuf,

        /// Words of the phrase, matched by text
        words: Vec<String>,

        /// JSON file with an array of recognized words, used instead of WORDS
        #[arg(short, long, value_name = "FILE", conflicts_with = "words")]
        input: Option<PathBuf>,

        #[command(flatten)]
        lists: ListArgs,
    },

    /// Print random phrases the grammar accepts
    Sample {
        /// JSON grammar document
        grammar: PathBuf,

        /// Amount to generate (default: 1)
        #[arg(short = 'n', long, value_name = "AMOUNT", default_value_t = 1)]
        amount: u32,

        /// Seed for repeatable output
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        lists: ListArgs,
    },
}

#[derive(Args)]
pub struct ListArgs {
    /// Words for a list, as name=word,word (repeatable)
    #[arg(short, long = "list", value_name = "NAME=WORDS", value_parser = parse_list)]
    pub lists: Vec<(String, Vec<String>)>,
}

fn parse_list(arg: &str) -> Result<(String, Vec<String>), String> {
    let (name, words) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=WORDS, got `{}`", arg))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("list name is empty".to_string());
    }
    let words = words
        .split(',')
        .map(str::trim)
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect();
    Ok((name.to_string(), words))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_args() {
        let args = vec!["room=kitchen,living room", " pets = cat, , dog", "empty="];
        let answers = vec![
            ("room", vec!["kitchen", "living room"]),
            ("pets", vec!["cat", "dog"]),
            ("empty", vec![]),
        ];

        for (arg, (name, words)) in args.into_iter().zip(answers) {
            assert_eq!(parse_list(arg), Ok((name.to_string(), words.into_iter().map(str::to_string).collect())));
        }
        assert!(parse_list("room").is_err());
        assert!(parse_list("=a,b").is_err());
    }

    #[test]
    fn parse_commands() {
        let cli = Cli::try_parse_from(["cfglink", "match", "g.json", "go", "to", "-l", "room=kitchen"]).unwrap();
        match cli.command {
            Command::Match { words, lists, input, .. } => {
                assert_eq!(words, vec!["go", "to"]);
                assert_eq!(lists.lists, vec![("room".to_string(), vec!["kitchen".to_string()])]);
                assert!(input.is_none());
            }
            _ => panic!("expected match"),
        }

        let cli = Cli::try_parse_from(["cfglink", "sample", "g.json", "-n", "3", "--seed", "9"]).unwrap();
        assert!(matches!(cli.command, Command::Sample { amount: 3, seed: Some(9), .. }));
    }
}
