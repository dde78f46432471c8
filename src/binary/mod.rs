/*
    This module packs compiled grammars into the binary form loaded by the
    recognition engine, and reads that form back
*/

use std::fmt::Display;

use bytes::{Buf, BufMut};
use thiserror::Error;

// Chunk type codes, in the order chunks appear in a grammar
pub const CHUNK_EXPORTS: u32 = 4;
pub const CHUNK_IMPORTS: u32 = 5;
pub const CHUNK_LISTS: u32 = 6;
pub const CHUNK_WORDS: u32 = 2;
pub const CHUNK_RULES: u32 = 3;

// Record tags
pub const TAG_START: u16 = 1;
pub const TAG_END: u16 = 2;
pub const TAG_WORD: u16 = 3;
pub const TAG_RULE: u16 = 4;
pub const TAG_LIST: u16 = 6;

// Grammar type written in the header. Only context-free grammars are built.
pub const GRAMMAR_CFG: u32 = 0;

pub const HEADER_SIZE: usize = 8;
pub const CHUNK_HEADER_SIZE: usize = 8;
pub const ENTRY_HEADER_SIZE: usize = 8;
pub const RULE_HEADER_SIZE: usize = 8;
pub const RECORD_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Sequence = 1,
    Alternation = 2,
    Repetition = 3,
    Optional = 4,
}

impl GroupKind {
    fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(GroupKind::Sequence),
            2 => Some(GroupKind::Alternation),
            3 => Some(GroupKind::Repetition),
            4 => Some(GroupKind::Optional),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            GroupKind::Sequence => "seq",
            GroupKind::Alternation => "alt",
            GroupKind::Repetition => "rep",
            GroupKind::Optional => "opt",
        }
    }
}

// One entry of a rule body: a group boundary or a (table, id) reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub tag: u16,
    pub probability: u16,
    pub value: u32,
}

impl Record {
    pub fn start(kind: GroupKind) -> Self {
        Record { tag: TAG_START, probability: 0, value: kind as u32 }
    }

    pub fn end(kind: GroupKind) -> Self {
        Record { tag: TAG_END, probability: 0, value: kind as u32 }
    }

    pub fn word(id: u32) -> Self {
        Record { tag: TAG_WORD, probability: 0, value: id }
    }

    pub fn rule(id: u32) -> Self {
        Record { tag: TAG_RULE, probability: 0, value: id }
    }

    pub fn list(id: u32) -> Self {
        Record { tag: TAG_LIST, probability: 0, value: id }
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let group = GroupKind::from_code(self.value).map(GroupKind::label).unwrap_or("?");
        match self.tag {
            TAG_START => write!(f, "start {}", group),
            TAG_END => write!(f, "end {}", group),
            TAG_WORD => write!(f, "word {}", self.value),
            TAG_RULE => write!(f, "rule {}", self.value),
            TAG_LIST => write!(f, "list {}", self.value),
            tag => write!(f, "tag{} {}", tag, self.value),
        }
    }
}

#[derive(Debug, PartialEq, Error)]
pub enum DecodeError {
    #[error("truncated data: needed {needed} bytes at offset {offset}")]
    Truncated { needed: usize, offset: usize },
    #[error("unsupported grammar type {0}")]
    GrammarType(u32),
    #[error("unknown chunk type {0}")]
    UnknownChunk(u32),
    #[error("entry size {size} is invalid at offset {offset}")]
    EntrySize { size: usize, offset: usize },
    #[error("name at offset {0} is not valid UTF-8")]
    Name(usize),
}

// Bytes a name takes up: the name, its NUL terminator, padded to a word
pub fn padded_len(name: &str) -> usize {
    (name.len() + 4) & !3
}

fn put_entry(buf: &mut Vec<u8>, id: u32, name: &str) {
    let padded = padded_len(name);
    buf.put_u32_le((ENTRY_HEADER_SIZE + padded) as u32);
    buf.put_u32_le(id);
    buf.put_slice(name.as_bytes());
    buf.put_bytes(0, padded - name.len());
}

// Packs one id table as a chunk. An empty table produces no chunk at all.
pub fn pack_ids<'a>(chunk_type: u32, entries: impl IntoIterator<Item = (u32, &'a str)>) -> Vec<u8> {
    let mut body = Vec::new();
    for (id, name) in entries {
        put_entry(&mut body, id, name);
    }
    if body.is_empty() {
        return body;
    }

    let mut buf = Vec::with_capacity(CHUNK_HEADER_SIZE + body.len());
    buf.put_u32_le(chunk_type);
    buf.put_u32_le(body.len() as u32);
    buf.put_slice(&body);
    buf
}

// Serializes one rule body: its size and id, then every record
pub fn encode_rule(id: u32, records: &[Record]) -> Vec<u8> {
    let size = RULE_HEADER_SIZE + records.len() * RECORD_SIZE;
    let mut buf = Vec::with_capacity(size);
    buf.put_u32_le(size as u32);
    buf.put_u32_le(id);
    for record in records {
        buf.put_u16_le(record.tag);
        buf.put_u16_le(record.probability);
        buf.put_u32_le(record.value);
    }
    buf
}

pub fn pack_rules<'a>(rules: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let body: Vec<u8> = rules.into_iter().flatten().copied().collect();
    let mut buf = Vec::with_capacity(CHUNK_HEADER_SIZE + body.len());
    buf.put_u32_le(CHUNK_RULES);
    buf.put_u32_le(body.len() as u32);
    buf.put_slice(&body);
    buf
}

// Header followed by the chunks, in wire order
pub fn pack_grammar(flags: u32, chunks: &[Vec<u8>]) -> Vec<u8> {
    let size = HEADER_SIZE + chunks.iter().map(Vec::len).sum::<usize>();
    let mut buf = Vec::with_capacity(size);
    buf.put_u32_le(GRAMMAR_CFG);
    buf.put_u32_le(flags);
    for chunk in chunks {
        buf.put_slice(chunk);
    }
    buf
}

// Payload for replacing a list's words in the engine. Same entry layout as the
// id tables, every id is 0, and there is no chunk header.
pub fn encode_list_items<S: AsRef<str>>(items: &[S]) -> Vec<u8> {
    let mut buf = Vec::new();
    for item in items {
        put_entry(&mut buf, 0, item.as_ref());
    }
    buf
}

pub fn decode_list_items(data: &[u8]) -> Result<Vec<String>, DecodeError> {
    Ok(decode_entries(data, 0)?.into_iter().map(|(_, name)| name).collect())
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], offset: usize) -> Self {
        Reader { data, offset }
    }

    fn need(&self, needed: usize) -> Result<(), DecodeError> {
        if self.data.remaining() < needed {
            return Err(DecodeError::Truncated { needed, offset: self.offset });
        }
        Ok(())
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        self.need(2)?;
        self.offset += 2;
        Ok(self.data.get_u16_le())
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.need(4)?;
        self.offset += 4;
        Ok(self.data.get_u32_le())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.need(len)?;
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        self.offset += len;
        Ok(head)
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// Reads back a run of id entries. `base` is only used for error offsets.
pub fn decode_entries(data: &[u8], base: usize) -> Result<Vec<(u32, String)>, DecodeError> {
    let mut reader = Reader::new(data, base);
    let mut entries = Vec::new();
    while !reader.is_empty() {
        let offset = reader.offset;
        let size = reader.u32()? as usize;
        if size < ENTRY_HEADER_SIZE + 4 || size % 4 != 0 {
            return Err(DecodeError::EntrySize { size, offset });
        }
        let id = reader.u32()?;
        let raw = reader.take(size - ENTRY_HEADER_SIZE)?;
        let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let name = std::str::from_utf8(&raw[..len]).map_err(|_| DecodeError::Name(offset))?;
        entries.push((id, name.to_string()));
    }
    Ok(entries)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleBody {
    pub id: u32,
    pub records: Vec<Record>,
}

fn decode_rules(data: &[u8], base: usize) -> Result<Vec<RuleBody>, DecodeError> {
    let mut reader = Reader::new(data, base);
    let mut rules = Vec::new();
    while !reader.is_empty() {
        let offset = reader.offset;
        let size = reader.u32()? as usize;
        if size < RULE_HEADER_SIZE || (size - RULE_HEADER_SIZE) % RECORD_SIZE != 0 {
            return Err(DecodeError::EntrySize { size, offset });
        }
        let id = reader.u32()?;
        let count = (size - RULE_HEADER_SIZE) / RECORD_SIZE;
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(Record {
                tag: reader.u16()?,
                probability: reader.u16()?,
                value: reader.u32()?,
            });
        }
        rules.push(RuleBody { id, records });
    }
    Ok(rules)
}

// A grammar blob read back into its tables and rule bodies
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blob {
    pub flags: u32,
    pub exports: Vec<(u32, String)>,
    pub imports: Vec<(u32, String)>,
    pub lists: Vec<(u32, String)>,
    pub words: Vec<(u32, String)>,
    pub rules: Vec<RuleBody>,
}

impl Blob {
    pub fn parse(data: &[u8]) -> Result<Blob, DecodeError> {
        let mut reader = Reader::new(data, 0);
        let grammar_type = reader.u32()?;
        if grammar_type != GRAMMAR_CFG {
            return Err(DecodeError::GrammarType(grammar_type));
        }
        let mut blob = Blob {
            flags: reader.u32()?,
            ..Blob::default()
        };

        while !reader.is_empty() {
            let chunk_type = reader.u32()?;
            let size = reader.u32()? as usize;
            let base = reader.offset;
            let body = reader.take(size)?;
            match chunk_type {
                CHUNK_EXPORTS => blob.exports = decode_entries(body, base)?,
                CHUNK_IMPORTS => blob.imports = decode_entries(body, base)?,
                CHUNK_LISTS => blob.lists = decode_entries(body, base)?,
                CHUNK_WORDS => blob.words = decode_entries(body, base)?,
                CHUNK_RULES => blob.rules = decode_rules(body, base)?,
                other => return Err(DecodeError::UnknownChunk(other)),
            }
        }
        Ok(blob)
    }
}

impl Display for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "flags: {}", self.flags)?;
        let tables = [
            ("exports", &self.exports),
            ("imports", &self.imports),
            ("lists", &self.lists),
            ("words", &self.words),
        ];
        for (label, entries) in tables {
            writeln!(f, "{}:", label)?;
            for (id, name) in entries {
                writeln!(f, "  {:>4}  {}", id, name)?;
            }
        }
        writeln!(f, "rules:")?;
        for rule in &self.rules {
            writeln!(f, "  rule {}:", rule.id)?;
            for record in &rule.records {
                writeln!(f, "    {}", record)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn pad_names_to_words() {
        assert_eq!(padded_len(""), 4);
        assert_eq!(padded_len("abc"), 4);
        assert_eq!(padded_len("abcd"), 8);
        assert_eq!(padded_len("hello"), 8);
    }

    #[test]
    fn pack_id_chunk_layout() {
        let chunk = pack_ids(CHUNK_WORDS, vec![(1, "hi"), (2, "dog")]);
        let mut expected = Vec::new();
        for value in [2u32, 24, 12, 1] {
            expected.extend_from_slice(&value.to_le_bytes());
        }
        expected.extend_from_slice(b"hi\0\0");
        for value in [12u32, 2] {
            expected.extend_from_slice(&value.to_le_bytes());
        }
        expected.extend_from_slice(b"dog\0");
        assert_eq!(chunk, expected);
    }

    #[test]
    fn empty_table_has_no_chunk() {
        assert!(pack_ids(CHUNK_LISTS, Vec::<(u32, &str)>::new()).is_empty());
    }

    #[test]
    fn encode_rule_layout() {
        let rule = encode_rule(7, &[Record::start(GroupKind::Sequence), Record::word(3), Record::end(GroupKind::Sequence)]);
        assert_eq!(rule.len(), RULE_HEADER_SIZE + 3 * RECORD_SIZE);
        assert_eq!(&rule[0..4], &32u32.to_le_bytes());
        assert_eq!(&rule[4..8], &7u32.to_le_bytes());
        assert_eq!(&rule[8..10], &TAG_START.to_le_bytes());
        assert_eq!(&rule[12..16], &1u32.to_le_bytes());
        assert_eq!(&rule[16..18], &TAG_WORD.to_le_bytes());
        assert_eq!(&rule[20..24], &3u32.to_le_bytes());
    }

    #[test]
    fn parse_packed_grammar() {
        let rule = encode_rule(1, &[Record::start(GroupKind::Alternation), Record::rule(2), Record::end(GroupKind::Alternation)]);
        let data = pack_grammar(0, &[
            pack_ids(CHUNK_EXPORTS, vec![(1, "demo::main")]),
            pack_ids(CHUNK_IMPORTS, vec![(2, "dgndictation")]),
            pack_ids(CHUNK_LISTS, Vec::<(u32, &str)>::new()),
            pack_ids(CHUNK_WORDS, vec![(1, "hello")]),
            pack_rules(vec![rule.as_slice()]),
        ]);
        let blob = Blob::parse(&data).unwrap();

        assert_eq!(blob.exports, vec![(1, "demo::main".to_string())]);
        assert_eq!(blob.imports, vec![(2, "dgndictation".to_string())]);
        assert!(blob.lists.is_empty());
        assert_eq!(blob.words, vec![(1, "hello".to_string())]);
        assert_eq!(blob.rules, vec![RuleBody {
            id: 1,
            records: vec![Record::start(GroupKind::Alternation), Record::rule(2), Record::end(GroupKind::Alternation)],
        }]);
    }

    #[test]
    fn parse_rejects_bad_data() {
        assert_eq!(Blob::parse(&[0, 0]), Err(DecodeError::Truncated { needed: 4, offset: 0 }));
        assert_eq!(Blob::parse(&pack_grammar(0, &[])).unwrap(), Blob::default());

        let mut data = pack_grammar(0, &[]);
        data[0] = 1;
        assert_eq!(Blob::parse(&data), Err(DecodeError::GrammarType(1)));

        let data = pack_grammar(0, &[pack_ids(9, vec![(1, "x")])]);
        assert_eq!(Blob::parse(&data), Err(DecodeError::UnknownChunk(9)));
    }

    #[test]
    fn list_items_round_trip() {
        let items = vec!["kitchen", "living room"];
        let data = encode_list_items(&items);
        assert_eq!(data.len(), 16 + 20);
        assert_eq!(decode_list_items(&data).unwrap(), items);
    }

    #[test]
    fn display_records() {
        assert_eq!(Record::start(GroupKind::Optional).to_string(), "start opt");
        assert_eq!(Record::list(2).to_string(), "list 2");
    }

    proptest! {
        #[test]
        fn id_chunk_round_trip(names in prop::collection::vec("[a-z ]{0,12}", 1..20)) {
            let entries: Vec<(u32, String)> = names
                .into_iter()
                .enumerate()
                .map(|(i, name)| (i as u32 + 1, name))
                .collect();
            let chunk = pack_ids(CHUNK_WORDS, entries.iter().map(|(id, name)| (*id, name.as_str())));
            let decoded = decode_entries(&chunk[CHUNK_HEADER_SIZE..], CHUNK_HEADER_SIZE).unwrap();
            prop_assert_eq!(decoded, entries);
        }
    }
}
