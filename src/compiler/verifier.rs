use crate::grammar::Node;
use super::CompileErrorType::UndefinedRule;
use super::{CompileError, Location};

// Rules the engine provides to every grammar, with the rule number the engine
// attributes to words they recognize
pub const BUILTIN_IMPORTS: &[(&str, u32)] = &[
    ("dgndictation", 1_000_000),
    ("dgnwords", 1_000_001),
    ("dgnletters", 1_000_002),
];

pub fn builtin_rule_number(name: &str) -> Option<u32> {
    BUILTIN_IMPORTS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, number)| *number)
}

// Finds the first compiled rule that references `name`, for error locations
fn referencing_rule<'a>(name: &str, trees: &'a [(String, Node)]) -> Option<&'a str> {
    trees
        .iter()
        .find(|(_, tree)| tree.rule_refs().contains(&name))
        .map(|(rule, _)| rule.as_str())
}

// Splits the undefined rules into engine imports, failing on the first one
// that is not a builtin
pub fn verify_rules<'a>(undefined: impl IntoIterator<Item = &'a str>, trees: &[(String, Node)]) -> Result<Vec<(&'a str, u32)>, CompileError> {
    undefined
        .into_iter()
        .map(|name| match builtin_rule_number(name) {
            Some(number) => Ok((name, number)),
            None => Err(CompileError {
                location: Location::rule(referencing_rule(name, trees).unwrap_or(name)),
                error: UndefinedRule(name.to_string()),
            }),
        })
        .collect()
}
