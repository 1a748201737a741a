use crate::registry::Registry;
use crate::scope::Scope;
use crate::tokenizer::Token;

pub(crate) fn registry_with(grammars: &[&str]) -> Registry {
    let mut registry = Registry::new();
    for grammar in grammars {
        registry.add_grammar_from_str(grammar).unwrap();
    }
    registry
}

pub(crate) fn scopes(names: &[&str]) -> Vec<Scope> {
    names.iter().map(|n| Scope::new(n)).collect()
}

/// One token per line: `{line}:{start}..{end} {text:?} {scopes}`
pub(crate) fn format_tokens(text: &str, tokens: &[Vec<Token>]) -> String {
    let mut out = Vec::new();
    for (line_index, (line, line_tokens)) in text.split('\n').zip(tokens).enumerate() {
        for token in line_tokens {
            let content: String = line
                .chars()
                .skip(token.span.start)
                .take(token.span.end - token.span.start)
                .collect();
            let scopes: Vec<&str> = token.scopes.iter().map(|s| s.as_str()).collect();
            out.push(format!(
                "{line_index}:{}..{} {content:?} {}",
                token.span.start,
                token.span.end,
                scopes.join(" ")
            ));
        }
    }
    out.join("\n")
}
