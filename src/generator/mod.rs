/*
    This module generates random phrases a compiled grammar accepts
*/

use rand::prelude::*;
use thiserror::Error;
use tracing::trace;

use crate::automaton::{Edge, LeafKind, State};
use crate::compiler::CompiledGrammar;
use crate::error_handling::*;
use crate::phrase::RecognizedWord;

// Rules nested deeper than this are taken to recurse without end
const MAX_DEPTH: usize = 32;
// States visited within one rule before giving up on a loop
const MAX_STEPS: usize = 256;

// Stand-ins for what a speaker might dictate into an imported rule
const DICTATION: &[&str] = &["alpha", "bravo", "charlie", "delta", "echo"];

#[derive(Debug, PartialEq, Error)]
pub enum GenerateErrorType {
    // A rule id with no automaton behind it
    #[error("no automaton for rule id {0}")]
    MissingRule(u32),
    // A list reached during generation has no words yet
    #[error("list `{0}` is empty")]
    EmptyList(String),
    #[error("gave up after recursing too deep")]
    RecursionLimit,
}

impl ErrorType for GenerateErrorType {}

pub type GenerateError = Error<GenerateErrorType>;
pub type GenResult = Result<(), GenerateError>;

struct Generator<'g, R: Rng + ?Sized> {
    grammar: &'g CompiledGrammar,
    rng: &'g mut R,
    words: Vec<RecognizedWord>,
}

impl<R: Rng + ?Sized> Generator<'_, R> {
    fn fail(rule: &str, error: GenerateErrorType) -> GenResult {
        Err(GenerateError {
            location: Location::rule(rule),
            error,
        })
    }

    fn generate_rule(&mut self, name: &str, rule_id: u32, depth: usize) -> GenResult {
        if depth > MAX_DEPTH {
            return Self::fail(name, GenerateErrorType::RecursionLimit);
        }
        let grammar = self.grammar;
        let Some(automaton) = grammar.automaton(rule_id) else {
            return Self::fail(name, GenerateErrorType::MissingRule(rule_id));
        };

        if let Some(stub) = automaton.import_leaf() {
            let number = grammar.terminal(stub).leaf.id;
            let count = self.rng.gen_range(1..=3);
            for _ in 0..count {
                if let Some(text) = DICTATION.choose(&mut *self.rng) {
                    self.words.push(RecognizedWord::new(text, 0, number));
                }
            }
            return Ok(());
        }

        let mut edge = automaton.entry();
        let mut steps = 0;
        while let Edge::State(id) = edge {
            steps += 1;
            if steps > MAX_STEPS {
                return Self::fail(name, GenerateErrorType::RecursionLimit);
            }
            edge = match automaton.state(id) {
                State::Branch(edges) => match edges.choose(&mut *self.rng) {
                    Some(next) => *next,
                    None => Edge::End,
                },
                State::Leaf { leaf, next } => {
                    let terminal = grammar.terminal(*leaf);
                    match terminal.kind {
                        LeafKind::Literal => {
                            self.words.push(RecognizedWord::new(&terminal.leaf.name, terminal.leaf.id, rule_id));
                        }
                        LeafKind::List => {
                            let item = grammar
                                .list_words(terminal.leaf.id)
                                .and_then(|list| list.items().choose(&mut *self.rng));
                            match item {
                                Some(item) => self.words.push(RecognizedWord::new(item, 0, rule_id)),
                                None => {
                                    return Self::fail(name, GenerateErrorType::EmptyList(terminal.leaf.name.clone()))
                                }
                            }
                        }
                        LeafKind::Rule => {
                            self.generate_rule(&terminal.leaf.name, terminal.leaf.id, depth + 1)?;
                        }
                    }
                    *next
                }
                State::Stub { .. } => Edge::End,
            };
        }
        Ok(())
    }
}

// Generates one phrase starting at the grammar's main rule
pub fn generate<R: Rng + ?Sized>(grammar: &CompiledGrammar, rng: &mut R) -> Result<Vec<RecognizedWord>, GenerateError> {
    let main_rule = grammar.main_rule();
    let Some(main_id) = grammar.rules().id(main_rule) else {
        return Err(GenerateError {
            location: Location::rule(main_rule),
            error: GenerateErrorType::MissingRule(0),
        });
    };

    let mut generator = Generator {
        grammar,
        rng,
        words: Vec::new(),
    };
    generator.generate_rule(main_rule, main_id, 0)?;
    trace!(grammar = grammar.name(), words = generator.words.len(), "generated phrase");
    return Ok(generator.words);
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::rngs::StdRng;

    use super::*;
    use crate::compiler::compile_json;
    use crate::phrase::match_phrase;

    fn texts(words: &[RecognizedWord]) -> Vec<&str> {
        words.iter().map(|word| word.text.as_str()).collect()
    }

    fn home() -> CompiledGrammar {
        let mut grammar = compile_json(
            r#"{
                "name": "home",
                "public": {
                    "lights": "turn (on | off) [the] {room} lights",
                    "count": "ping+",
                    "note": "take a note <dgndictation>"
                }
            }"#,
        )
        .unwrap();
        grammar.set_list("room", &["kitchen", "living room"]).unwrap();
        grammar
    }

    #[test]
    fn generate_fixed_phrase() {
        let grammar = compile_json(r#"{"name": "demo", "public": {"greet": "hello world"}}"#).unwrap();
        let words = generate(&grammar, &mut StdRng::seed_from_u64(7)).unwrap();

        assert_eq!(words, vec![RecognizedWord::new("hello world", 1, 1)]);
    }

    #[test]
    fn same_seed_same_phrase() {
        let grammar = home();
        let first = generate(&grammar, &mut StdRng::seed_from_u64(42)).unwrap();
        let second = generate(&grammar, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn imports_use_engine_numbers() {
        let grammar = compile_json(r#"{"name": "n", "public": {"note": "note <dgndictation>"}}"#).unwrap();
        let words = generate(&grammar, &mut StdRng::seed_from_u64(3)).unwrap();

        assert_eq!(texts(&words[..1]), vec!["note"]);
        assert!(words.len() >= 2 && words.len() <= 4);
        assert!(words[1..].iter().all(|word| word.rule == 1_000_000 && word.id == 0));
    }

    #[test]
    fn empty_list_fails() {
        let grammar = compile_json(r#"{"name": "home", "public": {"go": "go to {room}"}}"#).unwrap();
        let error = generate(&grammar, &mut StdRng::seed_from_u64(1)).unwrap_err();

        assert_eq!(error.error, GenerateErrorType::EmptyList("room".to_string()));
        assert_eq!(error.location, Location::rule("go"));
    }

    #[test]
    fn endless_recursion_fails() {
        let grammar = compile_json(r#"{"name": "demo", "public": {"a": "x <a>"}}"#).unwrap();
        let error = generate(&grammar, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert_eq!(error.error, GenerateErrorType::RecursionLimit);
    }

    proptest! {
        #[test]
        fn generated_phrases_match(seed in any::<u64>()) {
            let grammar = home();
            let mut words = generate(&grammar, &mut StdRng::seed_from_u64(seed)).unwrap();
            let total = words.len();
            let result = match_phrase(&grammar, &mut words);

            prop_assert!(result.accepts(total), "{:?}", texts(&words));
            prop_assert!(result.rule.is_some());
        }
    }
}
