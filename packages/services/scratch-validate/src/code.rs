use scratch_core::model::{Diagnostic, Language};

pub struct CodeOutcome {
    pub valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

/// Code dialects get a structural check only (`§4.C` non-goal: "does not
/// attempt compiler-grade validation"). Rust gets a real parse via `syn`
/// since that parser is cheap to embed and gives genuine diagnostics for
/// the one dialect this corpus already speaks natively; every other dialect
/// gets a bracket-balance heuristic.
pub fn validate_content(language: Language, content: &str) -> CodeOutcome {
    if language == Language::Rs {
        return validate_rust(content);
    }
    validate_bracket_balance(content)
}

fn validate_rust(content: &str) -> CodeOutcome {
    match syn::parse_file(content) {
        Ok(_) => CodeOutcome {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        },
        Err(e) => {
            let span = e.span().start();
            CodeOutcome {
                valid: false,
                errors: vec![Diagnostic {
                    message: e.to_string(),
                    code: Some("PARSE_ERROR".to_string()),
                    line: Some(span.line as u32),
                    column: Some(span.column as u32),
                    details: None,
                }],
                warnings: Vec::new(),
            }
        }
    }
}

fn validate_bracket_balance(content: &str) -> CodeOutcome {
    let mut stack: Vec<(char, u32, u32)> = Vec::new();
    let mut errors = Vec::new();
    let mut line = 1u32;
    let mut column = 0u32;

    for ch in content.chars() {
        column += 1;
        match ch {
            '\n' => {
                line += 1;
                column = 0;
            }
            '(' | '[' | '{' => stack.push((ch, line, column)),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    '}' => '{',
                    _ => unreachable!(),
                };
                match stack.pop() {
                    Some((open, _, _)) if open == expected => {}
                    Some((open, open_line, open_col)) => errors.push(Diagnostic {
                        message: format!("mismatched bracket: expected closer for '{open}' opened at {open_line}:{open_col}"),
                        code: Some("UNBALANCED_BRACKETS".to_string()),
                        line: Some(line),
                        column: Some(column),
                        details: None,
                    }),
                    None => errors.push(Diagnostic {
                        message: format!("unexpected closing bracket '{ch}'"),
                        code: Some("UNBALANCED_BRACKETS".to_string()),
                        line: Some(line),
                        column: Some(column),
                        details: None,
                    }),
                }
            }
            _ => {}
        }
    }
    for (open, open_line, open_col) in stack {
        errors.push(Diagnostic {
            message: format!("unclosed bracket '{open}' opened at {open_line}:{open_col}"),
            code: Some("UNBALANCED_BRACKETS".to_string()),
            line: Some(open_line),
            column: Some(open_col),
            details: None,
        });
    }

    CodeOutcome {
        valid: errors.is_empty(),
        errors,
        warnings: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_brackets_are_valid() {
        let outcome = validate_bracket_balance("fn main() { let v = [1, 2, (3)]; }");
        assert!(outcome.valid);
    }

    #[test]
    fn unclosed_bracket_is_an_error() {
        let outcome = validate_bracket_balance("function f() { return (1 + 2;");
        assert!(!outcome.valid);
    }

    #[test]
    fn rust_parse_error_is_reported() {
        let outcome = validate_rust("fn main( { }");
        assert!(!outcome.valid);
        assert_eq!(outcome.errors[0].code.as_deref(), Some("PARSE_ERROR"));
    }

    #[test]
    fn rust_parse_success() {
        let outcome = validate_rust("fn main() {}\n");
        assert!(outcome.valid);
    }
}
