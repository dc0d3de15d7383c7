use thiserror::Error;

/// Everything NANO ever says on stderr.
///
/// None of these abort execution: the lexer and parser collect them and keep
/// scanning, the interpreter prints them and continues with a substitute
/// value. Keeping every message shape in one enum means the exact wording is
/// testable and greppable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("Unexpected character '{character}' at line {line}")]
    UnexpectedCharacter { character: char, line: usize },

    #[error("Unterminated string at line {line}")]
    UnterminatedString { line: usize },

    #[error("Invalid numeric literal '{lexeme}' at line {line}")]
    InvalidNumber { lexeme: String, line: usize },

    /// `location` is either `'lexeme'` (quotes included) or `end`.
    #[error("[Line {line}] Error at {location}: {message}")]
    Parse {
        line: usize,
        location: String,
        message: String,
    },

    #[error("Undefined variable '{name}' at line {line}")]
    UndefinedVariable { name: String, line: usize },

    #[error("Runtime Error: {0}")]
    Runtime(String),

    #[error("Error: for-loop requires an array, got {got}")]
    ForLoopIterable { got: String },

    #[error("Error: 'return' used outside of function.")]
    TopLevelReturn,

    #[error("Function expected {expected} args, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("Error: len() expects an array or dict as argument.")]
    LenArgument,

    #[error("Warning: parent '{name}' is not an entity; inheritance ignored.")]
    ParentNotEntity { name: String },
}

impl Diagnostic {
    pub fn runtime(message: impl Into<String>) -> Self {
        Diagnostic::Runtime(message.into())
    }
}
