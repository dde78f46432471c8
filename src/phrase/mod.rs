/*
    This module matches a flat list of recognized words against a compiled
    grammar and attributes every word to the rule that matched it
*/

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::trace;

use crate::automaton::{Edge, LeafKind, State, StateId, Terminal};
use crate::compiler::CompiledGrammar;

// One word as the engine reported it. An id of 0 means the word is not in the
// grammar's vocabulary and only its text can be compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedWord {
    pub text: String,
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub rule: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
}

impl RecognizedWord {
    pub fn new(text: &str, id: u32, rule: u32) -> Self {
        RecognizedWord {
            text: text.to_string(),
            id,
            rule,
            rule_name: None,
        }
    }

    pub fn verbatim(text: &str) -> Self {
        Self::new(text, 0, 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhraseMatch {
    // The exported rule the phrase was matched as
    pub rule: Option<String>,
    pub consumed: usize,
    pub complete: bool,
}

impl PhraseMatch {
    // True when the walk finished and nothing was left over
    pub fn accepts(&self, total: usize) -> bool {
        self.complete && self.consumed == total
    }

    pub fn to_json(&self, words: &[RecognizedWord]) -> Value {
        let mut groups = Map::new();
        for word in words {
            let Some(name) = &word.rule_name else { continue };
            if self.rule.as_ref() == Some(name) {
                continue;
            }
            let group = groups.entry(name.clone()).or_insert_with(|| Value::Array(Vec::new()));
            if let Some(group) = group.as_array_mut() {
                group.push(Value::String(word.text.clone()));
            }
        }

        let mut result = json!({
            "rule": self.rule,
            "phrase": words.iter().map(|word| word.text.as_str()).collect::<Vec<_>>(),
            "consumed": self.consumed,
            "complete": self.complete,
        });
        if !groups.is_empty() {
            result["groups"] = Value::Object(groups);
        }
        result
    }
}

// Index of the last segment of a path. A path is a chain of segments linked
// back towards the first word.
type PathRef = Option<usize>;

// `count` consecutive words tagged with `tag`
#[derive(Debug, Clone, Copy)]
struct Segment<'g> {
    tag: &'g str,
    count: usize,
    prev: PathRef,
}

// Everything matched on the way to a state
#[derive(Debug, Clone, Copy, Default)]
struct Trail<'g> {
    path: PathRef,
    entry: Option<&'g str>,
}

// Where a walk ended. `end` is the cursor after the last consumed word.
#[derive(Debug, Clone, Copy)]
struct Outcome<'g> {
    end: usize,
    complete: bool,
    trail: Trail<'g>,
}

impl Outcome<'_> {
    // Completion first, then length. Equal candidates keep the earlier one.
    fn beats(&self, other: &Outcome) -> bool {
        if self.complete != other.complete {
            return self.complete;
        }
        self.end > other.end
    }
}

#[derive(Debug, Clone, Copy)]
struct Visit<'g> {
    rule_id: u32,
    state: StateId,
    cursor: usize,
    depth: usize,
    owner: &'g str,
    trail: Trail<'g>,
}

enum Step<'g> {
    Visit(Visit<'g>),
    Done(Outcome<'g>),
}

// One state being explored. Every way the state's own leaf matched is a head,
// and every head is tried against every edge.
struct Frame<'g> {
    visit: Visit<'g>,
    edges: &'g [Edge],
    heads: Vec<(usize, Trail<'g>)>,
    head: usize,
    edge: usize,
    best: Option<Outcome<'g>>,
    // The referenced rule still to walk, and the rule whose outcome is awaited
    call: Option<Visit<'g>>,
    entering: Option<&'g str>,
}

impl<'g> Frame<'g> {
    fn new(visit: Visit<'g>, edges: &'g [Edge]) -> Self {
        Frame {
            visit,
            edges,
            heads: Vec::new(),
            head: 0,
            edge: 0,
            best: None,
            call: None,
            entering: None,
        }
    }

    fn key(&self) -> (u32, StateId, usize) {
        (self.visit.rule_id, self.visit.state, self.visit.cursor)
    }

    fn rejected(&self) -> Outcome<'g> {
        Outcome {
            end: self.visit.cursor,
            complete: false,
            trail: self.visit.trail,
        }
    }

    fn offer(&mut self, outcome: Outcome<'g>) {
        if self.best.as_ref().map_or(true, |best| outcome.beats(best)) {
            self.best = Some(outcome);
        }
    }

    fn receive(&mut self, outcome: Outcome<'g>) {
        match self.entering.take() {
            // Rule boundaries are all or nothing: an incomplete rule leaves no heads
            Some(rule) => {
                if outcome.complete {
                    let entry = if self.visit.depth == 0 { Some(rule) } else { outcome.trail.entry };
                    let trail = Trail {
                        path: outcome.trail.path,
                        entry,
                    };
                    self.heads.push((outcome.end, trail));
                }
            }
            None => {
                self.offer(outcome);
                self.edge += 1;
            }
        }
    }

    fn advance(&mut self, total: usize) -> Step<'g> {
        if let Some(call) = self.call.take() {
            return Step::Visit(call);
        }
        loop {
            let Some(&(cursor, trail)) = self.heads.get(self.head) else {
                return Step::Done(match self.best {
                    Some(best) => best,
                    None => self.rejected(),
                });
            };
            if self.edges.is_empty() {
                self.offer(Outcome {
                    end: cursor,
                    complete: cursor == total,
                    trail,
                });
                self.head += 1;
                continue;
            }
            match self.edges.get(self.edge) {
                None => {
                    self.head += 1;
                    self.edge = 0;
                }
                Some(Edge::End) => {
                    self.offer(Outcome {
                        end: cursor,
                        complete: true,
                        trail,
                    });
                    self.edge += 1;
                }
                Some(Edge::State(next)) => {
                    return Step::Visit(Visit {
                        state: *next,
                        cursor,
                        trail,
                        ..self.visit
                    })
                }
            }
        }
    }
}

// Words consumed by a multi-word text such as "living room", matched one part
// per word
fn phrase_span(text: &str, words: &[RecognizedWord]) -> Option<usize> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() < 2 || words.len() < parts.len() {
        return None;
    }
    parts
        .iter()
        .zip(words)
        .all(|(part, word)| word.text == *part)
        .then_some(parts.len())
}

// Explores the automata with its own stack of frames, so long phrases do not
// grow the call stack. Tags live in one shared segment buffer.
struct Walker<'g, 'w> {
    grammar: &'g CompiledGrammar,
    words: &'w [RecognizedWord],
    // (rule id, state, cursor) of every frame on the stack
    active: HashSet<(u32, StateId, usize)>,
    segments: Vec<Segment<'g>>,
    stack: Vec<Frame<'g>>,
}

impl<'g, 'w> Walker<'g, 'w> {
    fn new(grammar: &'g CompiledGrammar, words: &'w [RecognizedWord]) -> Self {
        Walker {
            grammar,
            words,
            active: HashSet::new(),
            segments: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn tag(&mut self, trail: Trail<'g>, tag: &'g str, count: usize) -> Trail<'g> {
        self.segments.push(Segment {
            tag,
            count,
            prev: trail.path,
        });
        Trail {
            path: Some(self.segments.len() - 1),
            ..trail
        }
    }

    fn walk_rule(&mut self, rule_id: u32, owner: &'g str) -> Outcome<'g> {
        let nothing = Outcome {
            end: 0,
            complete: false,
            trail: Trail::default(),
        };
        let Some(automaton) = self.grammar.automaton(rule_id) else {
            return nothing;
        };
        let first = match automaton.entry() {
            Edge::End => {
                return Outcome {
                    complete: true,
                    ..nothing
                }
            }
            Edge::State(first) => first,
        };

        let mut returned = self.visit(Visit {
            rule_id,
            state: first,
            cursor: 0,
            depth: 0,
            owner,
            trail: Trail::default(),
        });
        let total = self.words.len();
        loop {
            if let Some(outcome) = returned.take() {
                match self.stack.last_mut() {
                    Some(frame) => frame.receive(outcome),
                    None => return outcome,
                }
            }
            let Some(frame) = self.stack.last_mut() else {
                return nothing;
            };
            match frame.advance(total) {
                Step::Visit(visit) => returned = self.visit(visit),
                Step::Done(outcome) => {
                    if let Some(frame) = self.stack.pop() {
                        self.active.remove(&frame.key());
                    }
                    returned = Some(outcome);
                }
            }
        }
    }

    // Starts exploring a state. A state that cannot match returns its outcome
    // at once, any other gets a frame on the stack.
    fn visit(&mut self, visit: Visit<'g>) -> Option<Outcome<'g>> {
        let rejected = Outcome {
            end: visit.cursor,
            complete: false,
            trail: visit.trail,
        };
        let grammar = self.grammar;
        let Some(automaton) = grammar.automaton(visit.rule_id) else {
            return Some(rejected);
        };
        let key = (visit.rule_id, visit.state, visit.cursor);
        if self.active.contains(&key) {
            trace!(rule_id = visit.rule_id, state = visit.state.0, cursor = visit.cursor, "cycle, rejecting");
            return Some(rejected);
        }

        let state = automaton.state(visit.state);
        let mut frame = Frame::new(visit, state.edges());
        let cursor = visit.cursor;
        match state {
            State::Leaf { leaf, .. } => {
                let terminal = grammar.terminal(*leaf);
                let name = terminal.leaf.name.as_str();
                match terminal.kind {
                    LeafKind::Literal | LeafKind::List => {
                        let spans = match terminal.kind {
                            LeafKind::Literal => self.literal_spans(terminal, cursor),
                            _ => self.list_spans(terminal, cursor),
                        };
                        if spans.is_empty() {
                            return Some(rejected);
                        }
                        trace!(leaf = name, cursor, ?spans, "accepted");
                        for count in spans {
                            let trail = self.tag(visit.trail, visit.owner, count);
                            frame.heads.push((cursor + count, trail));
                        }
                    }
                    LeafKind::Rule => {
                        let tag = if visit.depth < 2 { name } else { visit.owner };
                        let Some(target) = grammar.automaton(terminal.leaf.id) else {
                            return Some(rejected);
                        };

                        if let Some(stub) = target.import_leaf() {
                            let number = grammar.terminal(stub).leaf.id;
                            let run = self.words[cursor..].iter().take_while(|word| word.rule == number).count();
                            trace!(rule = name, number, cursor, run, "import");
                            if run == 0 {
                                return Some(rejected);
                            }
                            let mut trail = self.tag(visit.trail, tag, run);
                            if visit.depth == 0 {
                                trail.entry = Some(name);
                            }
                            frame.heads.push((cursor + run, trail));
                        } else {
                            frame.entering = Some(name);
                            match target.entry() {
                                Edge::End => frame.receive(Outcome {
                                    complete: true,
                                    ..rejected
                                }),
                                Edge::State(first) => {
                                    trace!(rule = name, cursor, depth = visit.depth, "entering rule");
                                    frame.call = Some(Visit {
                                        rule_id: terminal.leaf.id,
                                        state: first,
                                        cursor,
                                        depth: visit.depth + 1,
                                        owner: tag,
                                        trail: visit.trail,
                                    });
                                }
                            }
                        }
                    }
                }
            }
            State::Branch(_) | State::Stub { .. } => frame.heads.push((cursor, visit.trail)),
        }

        self.active.insert(key);
        self.stack.push(frame);
        None
    }

    // Lengths the literal matches at `cursor`, shortest first
    fn literal_spans(&self, terminal: &Terminal, cursor: usize) -> Vec<usize> {
        let Some(word) = self.words.get(cursor) else {
            return Vec::new();
        };
        let mut spans = Vec::new();
        if word.id == terminal.leaf.id || (word.id == 0 && word.text == terminal.leaf.name) {
            spans.push(1);
        }
        // Only words the engine could not identify are compared by text
        let verbatim = self.words[cursor..].iter().take_while(|word| word.id == 0).count();
        spans.extend(phrase_span(&terminal.leaf.name, &self.words[cursor..cursor + verbatim]));
        spans
    }

    // Lengths of the list items that match at `cursor`, shortest first
    fn list_spans(&self, terminal: &Terminal, cursor: usize) -> Vec<usize> {
        let (Some(list), Some(word)) = (self.grammar.list_words(terminal.leaf.id), self.words.get(cursor)) else {
            return Vec::new();
        };
        let mut spans: Vec<usize> = list
            .items()
            .iter()
            .filter_map(|item| phrase_span(item, &self.words[cursor..]))
            .collect();
        if list.contains(&word.text) {
            spans.push(1);
        }
        spans.sort_unstable();
        spans.dedup();
        spans
    }
}

// Walks the grammar's main rule over `words` and tags every consumed word with
// the name of the rule it belongs to. Unconsumed words lose their tag.
pub fn match_phrase(grammar: &CompiledGrammar, words: &mut [RecognizedWord]) -> PhraseMatch {
    let mut walker = Walker::new(grammar, words);
    let outcome = match grammar.rules().id(grammar.main_rule()) {
        Some(main_id) => walker.walk_rule(main_id, grammar.main_rule()),
        None => Outcome {
            end: 0,
            complete: false,
            trail: Trail::default(),
        },
    };
    let segments = walker.segments;

    for word in words.iter_mut() {
        word.rule_name = None;
    }
    let mut position = outcome.end;
    let mut path = outcome.trail.path;
    while let Some(index) = path {
        let segment = segments[index];
        for word in &mut words[position - segment.count..position] {
            word.rule_name = Some(segment.tag.to_string());
        }
        position -= segment.count;
        path = segment.prev;
    }
    trace!(grammar = grammar.name(), consumed = outcome.end, complete = outcome.complete, "matched phrase");

    PhraseMatch {
        rule: outcome.trail.entry.map(str::to_string),
        consumed: outcome.end,
        complete: outcome.complete,
    }
}
