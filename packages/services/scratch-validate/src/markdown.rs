use pulldown_cmark::{Event, Parser, Tag};
use scratch_core::model::Diagnostic;

pub struct MarkdownOutcome {
    pub valid: bool,
    pub warnings: Vec<Diagnostic>,
}

/// Markdown is warnings-only per `§4.C`: "never invalid unless the analyzer
/// reports a fatal structural failure" — which `pulldown_cmark` never does
/// (it's an error-tolerant streaming parser), so this always returns
/// `valid=true` and surfaces anomalies it can detect as warnings.
pub fn validate_content(content: &str) -> MarkdownOutcome {
    let mut warnings = Vec::new();
    let mut open_code_blocks = 0i32;
    let mut open_links = 0i32;

    for event in Parser::new(content) {
        match event {
            Event::Start(Tag::CodeBlock(_)) => open_code_blocks += 1,
            Event::End(Tag::CodeBlock(_)) => open_code_blocks -= 1,
            Event::Start(Tag::Link(..)) => open_links += 1,
            Event::End(Tag::Link(..)) => open_links -= 1,
            _ => {}
        }
    }

    if open_code_blocks > 0 {
        warnings.push(Diagnostic {
            message: "unclosed fenced code block".to_string(),
            code: Some("UNCLOSED_CODE_BLOCK".to_string()),
            line: None,
            column: None,
            details: None,
        });
    }
    if open_links > 0 {
        warnings.push(Diagnostic {
            message: "unclosed markdown link".to_string(),
            code: Some("UNCLOSED_LINK".to_string()),
            line: None,
            column: None,
            details: None,
        });
    }

    MarkdownOutcome {
        valid: true,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_markdown_has_no_warnings() {
        let outcome = validate_content("# Title\n\nSome *text* and a [link](http://example.com).\n");
        assert!(outcome.valid);
        assert!(outcome.warnings.is_empty());
    }
}
