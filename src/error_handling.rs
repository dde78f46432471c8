use std::fmt::Display;

pub trait ErrorType: Display {}

// Where in a grammar an error happened. A column of 0 means the whole rule.
#[derive(Debug, PartialEq, Clone)]
pub struct Location {
    pub rule: String,
    pub column: usize
}

impl Location {
    pub fn rule(rule: &str) -> Self {
        Location {
            rule: rule.to_string(),
            column: 0
        }
    }

    pub fn at(mut self, column: usize) -> Self {
        self.column = column;
        self
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.column == 0 {
            write!(f, "{}", self.rule)
        } else {
            write!(f, "{}:{}", self.rule, self.column)
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Error<T: ErrorType> {
    pub location: Location,
    pub error: T
}

impl<T: ErrorType> Display for Error<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]  {}", self.location, self.error)
    }
}

impl<T: ErrorType + std::fmt::Debug> std::error::Error for Error<T> {}
