pub mod automaton;
pub mod binary;
pub mod compiler;
pub mod engine;
pub mod error_handling;
pub mod generator;
pub mod grammar;
pub mod parser;
pub mod phrase;
pub mod symbols;
