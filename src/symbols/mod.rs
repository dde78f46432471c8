/*
    This module interns names into stable 1-based ids
*/

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol<T> {
    pub id: u32,
    pub name: String,
    pub payload: Option<T>,
}

// Entries keep first-seen order. Every name maps to exactly one entry.
#[derive(Debug, Clone)]
pub struct SymbolTable<T = ()> {
    entries: Vec<Symbol<T>>,
    index: HashMap<String, usize>,
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        SymbolTable {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> SymbolTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    // Returns the id for `name`, assigning the next one on first sight
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(&position) = self.index.get(name) {
            return self.entries[position].id;
        }
        let id = self.entries.len() as u32 + 1;
        self.push(name, id);
        id
    }

    // Adds an entry that reuses an id from elsewhere. Returns false and leaves
    // the table alone when the name is already present.
    pub fn alias(&mut self, name: &str, id: u32) -> bool {
        if self.contains(name) {
            return false;
        }
        self.push(name, id);
        true
    }

    fn push(&mut self, name: &str, id: u32) {
        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push(Symbol {
            id,
            name: name.to_string(),
            payload: None,
        });
    }

    pub fn get(&self, name: &str) -> Option<&Symbol<T>> {
        self.index.get(name).map(|&position| &self.entries[position])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Symbol<T>> {
        self.index.get(name).map(|&position| &mut self.entries[position])
    }

    pub fn id(&self, name: &str) -> Option<u32> {
        self.get(name).map(|symbol| symbol.id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol<T>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pairs(&self) -> Vec<(u32, String)> {
        self.entries.iter().map(|s| (s.id, s.name.clone())).collect()
    }
}
