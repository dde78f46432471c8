/*
    This module compiles a grammar document into the engine's binary grammar
    and the automata used to attribute recognized words to rules
*/

mod document;
pub mod verifier;

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, warn};

use crate::automaton::{Automaton, LeafId, LeafKind, Terminal};
use crate::binary::{self, GroupKind, Record};
use crate::error_handling::*;
use crate::grammar::{optimize, Leaf, Node};
use crate::parser::{parse_rule, SyntaxError, SyntaxErrorType};
use crate::symbols::SymbolTable;
use verifier::verify_rules;

pub use document::{GrammarSource, RuleBody};

#[derive(Debug, PartialEq, Clone, Error)]
pub enum CompileErrorType {
    // A rule body could not be parsed
    #[error("{0}")]
    Syntax(SyntaxErrorType),
    // The grammar document has the wrong shape
    #[error("{0}")]
    Document(String),
    // A rule was used but never defined, and the engine does not provide it
    #[error("rule referenced but not defined \"{0}\"")]
    UndefinedRule(String),
    // The automaton table fell out of step with the rule table.
    // This is a problem with cfglink, not the grammar
    #[error("no automaton for rule id {0} (this is a problem with cfglink, not the grammar)")]
    MissingAutomaton(u32),
}

impl ErrorType for CompileErrorType {}

pub type CompileError = Error<CompileErrorType>;

impl From<SyntaxError> for CompileError {
    fn from(error: SyntaxError) -> Self {
        CompileError {
            location: error.location,
            error: CompileErrorType::Syntax(error.error),
        }
    }
}

#[derive(Debug, PartialEq, Error)]
pub enum ListError {
    #[error("list does not exist in grammar: {0}")]
    UnknownList(String),
}

// The current words of one list. Replaced wholesale, never edited.
#[derive(Debug, Clone, Default)]
pub struct ListWords {
    items: Vec<String>,
    members: HashSet<String>,
}

impl ListWords {
    pub fn new<S: AsRef<str>>(items: &[S]) -> Self {
        let items: Vec<String> = items.iter().map(|i| i.as_ref().to_string()).collect();
        let members = items.iter().cloned().collect();
        ListWords { items, members }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn contains(&self, word: &str) -> bool {
        self.members.contains(word)
    }
}

// Everything produced by one compile pass. It is built in full or not at
// all, and the automata, their leaves, and the tables are released together.
#[derive(Debug)]
pub struct CompiledGrammar {
    name: String,
    main_rule: String,
    rules: SymbolTable<Vec<u8>>,
    words: SymbolTable,
    lists: SymbolTable,
    exports: SymbolTable,
    imports: Vec<(u32, String)>,
    trees: Vec<(String, Node)>,
    leaves: Vec<Terminal>,
    // Indexed by rule id - 1
    automata: Vec<Automaton>,
    // Indexed by list id - 1
    list_words: Vec<ListWords>,
    blob: Vec<u8>,
}

impl CompiledGrammar {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn main_rule(&self) -> &str {
        &self.main_rule
    }

    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn rules(&self) -> &SymbolTable<Vec<u8>> {
        &self.rules
    }

    pub fn words(&self) -> &SymbolTable {
        &self.words
    }

    pub fn lists(&self) -> &SymbolTable {
        &self.lists
    }

    pub fn exports(&self) -> &SymbolTable {
        &self.exports
    }

    pub fn imports(&self) -> &[(u32, String)] {
        &self.imports
    }

    // Optimized rule bodies in compile order
    pub fn trees(&self) -> &[(String, Node)] {
        &self.trees
    }

    pub fn automaton(&self, rule_id: u32) -> Option<&Automaton> {
        self.automata.get((rule_id as usize).checked_sub(1)?)
    }

    pub fn main_automaton(&self) -> Option<&Automaton> {
        self.automaton(self.rules.id(&self.main_rule)?)
    }

    pub fn terminal(&self, leaf: LeafId) -> &Terminal {
        &self.leaves[leaf.0]
    }

    pub fn list_words(&self, list_id: u32) -> Option<&ListWords> {
        self.list_words.get((list_id as usize).checked_sub(1)?)
    }

    pub fn list_items(&self, name: &str) -> Option<&[String]> {
        self.list_words(self.lists.id(name)?).map(ListWords::items)
    }

    // Replaces the words of a list. Takes effect from the next match.
    pub fn set_list<S: AsRef<str>>(&mut self, name: &str, items: &[S]) -> Result<(), ListError> {
        let slot = self
            .lists
            .id(name)
            .and_then(|id| self.list_words.get_mut(id as usize - 1))
            .ok_or_else(|| ListError::UnknownList(name.to_string()))?;
        *slot = ListWords::new(items);
        debug!(grammar = %self.name, list = name, count = items.len(), "list replaced");
        Ok(())
    }

    // Human readable view of every rule body and its automaton
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (name, tree) in &self.trees {
            let Some(id) = self.rules.id(name) else { continue };
            out.push_str(&format!("rule {} <{}>\n{}", id, name, tree));
            if let Some(automaton) = self.automaton(id) {
                out.push_str(&automaton.dump(&self.leaves));
            }
            out.push('\n');
        }
        for (id, name) in &self.imports {
            out.push_str(&format!("import {} <{}>\n", id, name));
        }
        out
    }
}

fn group_kind(node: &Node) -> Option<GroupKind> {
    match node {
        Node::Sequence(_) => Some(GroupKind::Sequence),
        Node::Alternation(_) => Some(GroupKind::Alternation),
        Node::Optional(_) => Some(GroupKind::Optional),
        Node::Repetition(_) => Some(GroupKind::Repetition),
        _ => None,
    }
}

struct Compiler {
    name: String,
    rules: SymbolTable<Vec<u8>>,
    words: SymbolTable,
    lists: SymbolTable,
    exports: SymbolTable,
    exported: Vec<String>,
    imports: Vec<(u32, String)>,
    trees: Vec<(String, Node)>,
    leaves: Vec<Terminal>,
    automata: Vec<Option<Automaton>>,
}

impl Compiler {
    fn new(name: &str) -> Self {
        Compiler {
            name: name.to_string(),
            rules: SymbolTable::new(),
            words: SymbolTable::new(),
            lists: SymbolTable::new(),
            exports: SymbolTable::new(),
            exported: Vec::new(),
            imports: Vec::new(),
            trees: Vec::new(),
            leaves: Vec::new(),
            automata: Vec::new(),
        }
    }

    fn set_automaton(&mut self, rule_id: u32, automaton: Automaton) {
        let slot = rule_id as usize - 1;
        if self.automata.len() <= slot {
            self.automata.resize_with(slot + 1, || None);
        }
        self.automata[slot] = Some(automaton);
    }

    // Emits the records of `node`, interning every leaf name on the way
    fn encode(&mut self, node: &mut Node, records: &mut Vec<Record>) {
        match node {
            Node::Literal(leaf) => {
                leaf.id = self.words.intern(&leaf.name);
                records.push(Record::word(leaf.id));
            }
            Node::RuleRef(leaf) => {
                leaf.id = self.rules.intern(&leaf.name);
                records.push(Record::rule(leaf.id));
            }
            Node::ListRef(leaf) => {
                leaf.id = self.lists.intern(&leaf.name);
                records.push(Record::list(leaf.id));
            }
            _ => {
                let Some(kind) = group_kind(node) else { return };
                records.push(Record::start(kind));
                if let Some(children) = node.children_mut() {
                    for child in children {
                        self.encode(child, records);
                    }
                }
                records.push(Record::end(kind));
            }
        }
    }

    fn compile_root(&mut self, name: &str, mut root: Node) {
        let id = self.rules.intern(name);
        if self.rules.get(name).and_then(|rule| rule.payload.as_ref()).is_some() {
            warn!(grammar = %self.name, rule = name, "duplicate rule definition, keeping the first");
            return;
        }

        optimize(&mut root);
        let mut records = Vec::with_capacity(root.record_count());
        self.encode(&mut root, &mut records);

        // Automaton indices must stay in step with rule ids
        let automaton = Automaton::compile(&root, &mut self.leaves);
        self.set_automaton(id, automaton);

        if let Some(rule) = self.rules.get_mut(name) {
            rule.payload = Some(binary::encode_rule(id, &records));
        }
        debug!(grammar = %self.name, rule = name, id, records = records.len(), "compiled rule");
        self.trees.push((name.to_string(), root));
    }

    fn compile_rule(&mut self, name: &str, body: &RuleBody) -> Result<(), CompileError> {
        let root = match body {
            RuleBody::Text(text) => parse_rule(name, text)?,
            RuleBody::Alternatives(texts) => Node::Alternation(
                texts
                    .iter()
                    .map(|text| parse_rule(name, text))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };
        self.compile_root(name, root);
        Ok(())
    }

    fn export(&mut self, name: &str) {
        let Some(id) = self.rules.id(name) else { return };
        let qualified = format!("{}:{}", self.name, name);
        if self.exports.alias(&qualified, id) {
            self.exported.push(name.to_string());
        } else {
            warn!(grammar = %self.name, rule = name, "skipping duplicate export");
        }
    }

    // Every rule still without a body must be one the engine provides
    fn resolve_imports(&mut self) -> Result<(), CompileError> {
        let undefined: Vec<String> = self
            .rules
            .iter()
            .filter(|rule| rule.payload.is_none())
            .map(|rule| rule.name.clone())
            .collect();
        let imports = verify_rules(undefined.iter().map(String::as_str), &self.trees)?;

        for (name, number) in imports {
            let Some(id) = self.rules.id(name) else { continue };
            // The stub carries the engine's rule number, which is what
            // recognized words are attributed with
            self.leaves.push(Terminal {
                kind: LeafKind::Rule,
                leaf: Leaf {
                    name: name.to_string(),
                    id: number,
                },
            });
            let leaf = LeafId(self.leaves.len() - 1);
            self.set_automaton(id, Automaton::import(leaf));
            self.imports.push((id, name.to_string()));
            debug!(grammar = %self.name, rule = name, id, number, "imported rule");
        }
        Ok(())
    }

    // One alternation over every exported rule is the grammar's entry point
    fn compile_main(&mut self) -> String {
        let main_rule = format!("{}::main", self.name);
        let root = Node::Alternation(self.exported.iter().map(|name| Node::rule(name.as_str())).collect());
        self.compile_root(&main_rule, root);
        if let Some(id) = self.rules.id(&main_rule) {
            self.exports.alias(&main_rule, id);
        }
        main_rule
    }

    fn pack(&self) -> Vec<u8> {
        let table = |chunk_type: u32, pairs: &[(u32, String)]| {
            binary::pack_ids(chunk_type, pairs.iter().map(|(id, name)| (*id, name.as_str())))
        };

        let chunks = [
            table(binary::CHUNK_EXPORTS, &self.exports.pairs()),
            table(binary::CHUNK_IMPORTS, &self.imports),
            table(binary::CHUNK_LISTS, &self.lists.pairs()),
            table(binary::CHUNK_WORDS, &self.words.pairs()),
            binary::pack_rules(self.rules.iter().filter_map(|rule| rule.payload.as_deref())),
        ];
        binary::pack_grammar(0, &chunks)
    }

    fn finish(self, main_rule: String) -> Result<CompiledGrammar, CompileError> {
        let blob = self.pack();
        let mut automata = Vec::with_capacity(self.automata.len());
        for (slot, automaton) in self.automata.into_iter().enumerate() {
            match automaton {
                Some(automaton) => automata.push(automaton),
                None => {
                    return Err(CompileError {
                        location: Location::rule(&self.name),
                        error: CompileErrorType::MissingAutomaton(slot as u32 + 1),
                    })
                }
            }
        }
        if automata.len() != self.rules.len() {
            return Err(CompileError {
                location: Location::rule(&self.name),
                error: CompileErrorType::MissingAutomaton(automata.len() as u32 + 1),
            });
        }

        debug!(
            grammar = %self.name,
            rules = self.rules.len(),
            words = self.words.len(),
            lists = self.lists.len(),
            imports = self.imports.len(),
            bytes = blob.len(),
            "compiled grammar"
        );
        Ok(CompiledGrammar {
            list_words: vec![ListWords::default(); self.lists.len()],
            name: self.name,
            main_rule,
            rules: self.rules,
            words: self.words,
            lists: self.lists,
            exports: self.exports,
            imports: self.imports,
            trees: self.trees,
            leaves: self.leaves,
            automata,
            blob,
        })
    }
}

// Compiles private rules, then public rules, then the synthetic main rule.
// Any error abandons the whole grammar.
pub fn compile(source: &GrammarSource) -> Result<CompiledGrammar, CompileError> {
    let mut compiler = Compiler::new(&source.name);

    for (name, body) in &source.private {
        compiler.compile_rule(name, body)?;
    }
    for (name, body) in &source.public {
        compiler.compile_rule(name, body)?;
        compiler.export(name);
    }

    compiler.resolve_imports()?;
    let main_rule = compiler.compile_main();
    compiler.finish(main_rule)
}

pub fn compile_json(text: &str) -> Result<CompiledGrammar, CompileError> {
    compile(&GrammarSource::from_json(text)?)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::automaton::{Edge, State};
    use crate::binary::Blob;
    use crate::grammar::arb_node;

    fn demo() -> CompiledGrammar {
        compile_json(r#"{"name": "demo", "public": {"greet": "hello world"}}"#).unwrap()
    }

    #[test]
    fn compile_single_rule() {
        let grammar = demo();

        assert_eq!(grammar.main_rule(), "demo::main");
        assert_eq!(grammar.rules().pairs(), vec![(1, "greet".to_string()), (2, "demo::main".to_string())]);
        assert_eq!(grammar.words().pairs(), vec![(1, "hello world".to_string())]);
        assert_eq!(
            grammar.exports().pairs(),
            vec![(1, "demo:greet".to_string()), (2, "demo::main".to_string())]
        );

        // The main rule keeps its alternation even with one export
        let (name, main) = grammar.trees().last().unwrap();
        assert_eq!(name, "demo::main");
        let greet = Leaf {
            name: "greet".to_string(),
            id: 1,
        };
        assert_eq!(main, &Node::Alternation(vec![Node::RuleRef(greet)]));
    }

    #[test]
    fn blob_matches_tables() {
        let grammar = demo();
        let blob = Blob::parse(grammar.blob()).unwrap();

        assert_eq!(blob.flags, 0);
        assert_eq!(blob.exports, grammar.exports().pairs());
        assert!(blob.imports.is_empty());
        assert!(blob.lists.is_empty());
        assert_eq!(blob.words, vec![(1, "hello world".to_string())]);
        assert_eq!(blob.rules.len(), 2);
        assert_eq!(blob.rules[0].records, vec![
            Record::start(GroupKind::Sequence),
            Record::word(1),
            Record::end(GroupKind::Sequence),
        ]);
        assert_eq!(blob.rules[1].id, 2);
        assert_eq!(blob.rules[1].records, vec![
            Record::start(GroupKind::Alternation),
            Record::rule(1),
            Record::end(GroupKind::Alternation),
        ]);
    }

    #[test]
    fn rule_bytes_follow_tree_shape() {
        let grammar = compile_json(
            r#"{"name": "home", "public": {"cat": "feed [the] (cat | kitty) {pets}*"}}"#,
        )
        .unwrap();
        for (name, tree) in grammar.trees() {
            let bytes = grammar.rules().get(name).unwrap().payload.as_ref().unwrap();
            assert_eq!(bytes.len(), binary::RULE_HEADER_SIZE + tree.record_count() * binary::RECORD_SIZE);
        }
    }

    proptest! {
        #[test]
        fn rule_bytes_follow_any_tree(mut tree in arb_node()) {
            let mut compiler = Compiler::new("shapes");
            let mut records = Vec::new();
            compiler.encode(&mut tree, &mut records);

            prop_assert_eq!(records.len(), tree.record_count());
            let bytes = binary::encode_rule(1, &records);
            prop_assert_eq!(bytes.len(), binary::RULE_HEADER_SIZE + tree.record_count() * binary::RECORD_SIZE);
        }
    }

    #[test]
    fn ids_follow_first_reference() {
        let grammar = compile_json(
            r#"{
                "name": "test",
                "private": {"door": "{door}", "room": "{room}"},
                "public": {
                    "doors": "(open | close) [the] <door> door",
                    "lights": "lights in <room>"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(grammar.lists().pairs(), vec![(1, "door".to_string()), (2, "room".to_string())]);
        assert_eq!(
            grammar.words().pairs(),
            vec![
                (1, "open".to_string()),
                (2, "close".to_string()),
                (3, "the".to_string()),
                (4, "door".to_string()),
                (5, "lights in".to_string()),
            ]
        );
        assert_eq!(grammar.rules().id("doors"), Some(3));
        assert_eq!(grammar.rules().id("test::main"), Some(5));
        assert_eq!(grammar.automaton(5), grammar.main_automaton());
    }

    #[test]
    fn alternatives_array_is_an_alternation() {
        let grammar = compile_json(r#"{"name": "demo", "public": {"pick": ["red", "blue"]}}"#).unwrap();
        let (_, pick) = &grammar.trees()[0];
        assert!(matches!(pick, Node::Alternation(children) if children.len() == 2));
    }

    #[test]
    fn first_definition_wins() {
        let source = GrammarSource::new("demo")
            .private_rule("x", "first")
            .public_rule("x", "second");
        let grammar = compile(&source).unwrap();

        assert_eq!(grammar.words().pairs(), vec![(1, "first".to_string())]);
        assert_eq!(grammar.exports().id("demo:x"), Some(1));
    }

    #[test]
    fn duplicate_export_is_skipped() {
        let source = GrammarSource::new("demo")
            .public_rule("x", "one")
            .public_rule("x", "two");
        let grammar = compile(&source).unwrap();

        assert_eq!(
            grammar.exports().pairs(),
            vec![(1, "demo:x".to_string()), (2, "demo::main".to_string())]
        );
        let (_, main) = grammar.trees().last().unwrap();
        assert_eq!(main.children().len(), 1);
    }

    #[test]
    fn builtin_rules_are_imported() {
        let grammar = compile_json(
            r#"{"name": "w", "public": {"weather": "what is the weather <dgndictation>"}}"#,
        )
        .unwrap();

        assert_eq!(grammar.imports(), &[(2, "dgndictation".to_string())]);
        let stub = grammar.automaton(2).unwrap();
        assert!(stub.is_import());
        match stub.state(crate::automaton::StateId(0)) {
            State::Stub { leaf } => assert_eq!(grammar.terminal(*leaf).leaf.id, 1_000_000),
            other => panic!("expected a stub, found {:?}", other),
        }

        let blob = Blob::parse(grammar.blob()).unwrap();
        assert_eq!(blob.imports, vec![(2, "dgndictation".to_string())]);
        // Imports have no body of their own
        assert_eq!(blob.rules.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn undefined_rule_fails() {
        let error = compile_json(r#"{"name": "demo", "public": {"lights": "lights in <room>"}}"#).unwrap_err();
        assert_eq!(error.error, CompileErrorType::UndefinedRule("room".to_string()));
        assert_eq!(error.location, Location::rule("lights"));
    }

    #[test]
    fn syntax_error_fails() {
        let error = compile_json(r#"{"name": "demo", "public": {"a": "fine", "b": "open (the"}}"#).unwrap_err();
        assert_eq!(error.error, CompileErrorType::Syntax(SyntaxErrorType::UnclosedGroup('(')));
        assert_eq!(error.location, Location::rule("b").at(6));
    }

    #[test]
    fn lists_are_replaced() {
        let mut grammar = compile_json(r#"{"name": "demo", "public": {"go": "go to {room}"}}"#).unwrap();
        assert_eq!(grammar.list_items("room"), Some(&[][..]));

        grammar.set_list("room", &["kitchen", "bedroom"]).unwrap();
        grammar.set_list("room", &["living room"]).unwrap();
        assert_eq!(grammar.list_items("room").unwrap(), &["living room".to_string()]);
        assert!(grammar.list_words(1).unwrap().contains("living room"));
        assert!(!grammar.list_words(1).unwrap().contains("kitchen"));

        assert_eq!(
            grammar.set_list("door", &["front"]),
            Err(ListError::UnknownList("door".to_string()))
        );
    }

    #[test]
    fn automata_align_with_rule_ids() {
        let grammar = compile_json(
            r#"{"name": "t", "private": {"b": "bee"}, "public": {"a": "<b> <c>", "c": "sea"}}"#,
        )
        .unwrap();
        for rule in grammar.rules().iter() {
            let automaton = grammar.automaton(rule.id).unwrap();
            // Each rule's automaton only holds leaves of that rule's own tree
            let (_, tree) = grammar.trees().iter().find(|(name, _)| *name == rule.name).unwrap();
            let mut names = Vec::new();
            for index in 0..automaton.len() {
                if let State::Leaf { leaf, .. } = automaton.state(crate::automaton::StateId(index)) {
                    names.push(grammar.terminal(*leaf).leaf.name.clone());
                }
            }
            let mut expected: Vec<String> = tree.to_string()
                .lines()
                .filter_map(|line| line.trim().split_once("('").map(|(_, rest)| rest.trim_end_matches("')").to_string()))
                .collect();
            names.sort();
            expected.sort();
            assert_eq!(names, expected);
        }
        assert!(matches!(grammar.automaton(1).unwrap().entry(), Edge::State(_)));
    }

    #[test]
    fn dump_shows_rules() {
        let dump = demo().dump();
        assert!(dump.contains("rule 1 <greet>\n<seq>\n  lit('hello world')\n</seq>\n"));
        assert!(dump.contains("rule 2 <demo::main>"));
        assert!(dump.contains("<greet>"));
    }
}
