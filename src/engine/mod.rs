/*
    This module is the boundary to the recognition engine. Grammars are
    handed over as blobs, and list words as encoded entry payloads.
*/

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::binary::{self, Blob, DecodeError};
use crate::compiler::{CompiledGrammar, ListError};

#[derive(Debug, PartialEq, Error)]
pub enum EngineError {
    #[error("grammar `{0}` is already loaded")]
    AlreadyLoaded(String),
    #[error("grammar `{0}` is not loaded")]
    NotLoaded(String),
    #[error(transparent)]
    List(#[from] ListError),
    #[error("bad grammar data: {0}")]
    Decode(#[from] DecodeError),
}

// What cfglink needs from a recognizer
pub trait Recognizer {
    fn load_grammar(&mut self, name: &str, blob: &[u8]) -> Result<(), EngineError>;
    fn unload_grammar(&mut self, name: &str) -> Result<(), EngineError>;
    // `payload` is a list of entries as made by `binary::encode_list_items`
    fn set_list(&mut self, grammar: &str, list: &str, payload: &[u8]) -> Result<(), EngineError>;
    fn get_list(&self, grammar: &str, list: &str) -> Result<Vec<String>, EngineError>;
}

#[derive(Debug)]
struct LoadedGrammar {
    blob: Blob,
    lists: HashMap<String, Vec<String>>,
}

// Keeps loaded grammars in memory. Used by the CLI and in tests.
#[derive(Debug, Default)]
pub struct MemoryRecognizer {
    grammars: HashMap<String, LoadedGrammar>,
}

impl MemoryRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.grammars.contains_key(name)
    }

    pub fn blob(&self, name: &str) -> Option<&Blob> {
        self.grammars.get(name).map(|grammar| &grammar.blob)
    }

    fn loaded(&self, name: &str) -> Result<&LoadedGrammar, EngineError> {
        self.grammars.get(name).ok_or_else(|| EngineError::NotLoaded(name.to_string()))
    }
}

impl Recognizer for MemoryRecognizer {
    fn load_grammar(&mut self, name: &str, blob: &[u8]) -> Result<(), EngineError> {
        if self.is_loaded(name) {
            return Err(EngineError::AlreadyLoaded(name.to_string()));
        }
        let blob = Blob::parse(blob)?;
        let lists = blob.lists.iter().map(|(_, list)| (list.clone(), Vec::new())).collect();
        debug!(grammar = name, rules = blob.rules.len(), "grammar loaded");
        self.grammars.insert(name.to_string(), LoadedGrammar { blob, lists });
        Ok(())
    }

    fn unload_grammar(&mut self, name: &str) -> Result<(), EngineError> {
        if self.grammars.remove(name).is_none() {
            return Err(EngineError::NotLoaded(name.to_string()));
        }
        debug!(grammar = name, "grammar unloaded");
        Ok(())
    }

    fn set_list(&mut self, grammar: &str, list: &str, payload: &[u8]) -> Result<(), EngineError> {
        let items = binary::decode_list_items(payload)?;
        let loaded = self
            .grammars
            .get_mut(grammar)
            .ok_or_else(|| EngineError::NotLoaded(grammar.to_string()))?;
        let slot = loaded
            .lists
            .get_mut(list)
            .ok_or_else(|| ListError::UnknownList(list.to_string()))?;
        *slot = items;
        Ok(())
    }

    fn get_list(&self, grammar: &str, list: &str) -> Result<Vec<String>, EngineError> {
        self.loaded(grammar)?
            .lists
            .get(list)
            .cloned()
            .ok_or_else(|| ListError::UnknownList(list.to_string()).into())
    }
}

// Replaces a list's words in the recognizer and then in the compiled grammar,
// which the matcher reads. On error neither side has changed.
pub fn publish_list<S: AsRef<str>>(
    grammar: &mut CompiledGrammar,
    engine: &mut impl Recognizer,
    list: &str,
    items: &[S],
) -> Result<(), EngineError> {
    if !grammar.lists().contains(list) {
        return Err(ListError::UnknownList(list.to_string()).into());
    }
    engine.set_list(grammar.name(), list, &binary::encode_list_items(items))?;
    grammar.set_list(list, items)?;
    Ok(())
}
