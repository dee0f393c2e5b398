//! Command-line template parsing and rendering.
//!
//! A template is plain text with `{name}` placeholders, e.g.
//! `blur --in {input} --out {output} --start {rangeStart}`.
//! Placeholders are resolved against a variable map built from the
//! node's enabled attributes and the chunk's range.

use crate::Error;

mod prelude {
    pub use combine::parser::char::char;
    pub use combine::*;
}
use prelude::*;

/// Variables available to a template during rendering.
pub type CmdVars = util::HashMap<String, String>;

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(String),
    Var(String),
}

/// A parsed command-line template, ready to render repeatedly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub tokens: Vec<Token>,
}

/// Declare a fn that returns an opaque combine parser.
macro_rules! p {
    ($name:ident, $output:ty, $body:expr) => {
        fn $name<'a>() -> impl Parser<&'a str, Output = $output> {
            $body
        }
    };
}

p!(var_name, String, {
    many1(satisfy(|c: char| c.is_alphanumeric() || c == '_' || c == '.'))
});

p!(var_token, Token, {
    between(char('{'), char('}'), var_name()).map(Token::Var)
});

p!(text_token, Token, {
    many1(satisfy(|c: char| c != '{')).map(Token::Text)
});

p!(template, Vec<Token>, {
    many(choice((attempt(var_token()), text_token())))
});

/// Parse a template string into tokens.
///
/// The parse error is stringified at the boundary so callers get a
/// plain `Error` without a lifetime tied to the input.
pub fn parse_template(text: &str) -> Result<Template, Error> {
    let (tokens, remaining) = template()
        .parse(text)
        .map_err(|e| Error::InvalidTemplate(e.to_string()))?;
    if !remaining.is_empty() {
        return Err(Error::InvalidTemplate(format!(
            "unexpected input at: {remaining:?}"
        )));
    }
    Ok(Template { tokens })
}

/// Render a parsed template against a variable map.
pub fn render(template: &Template, vars: &CmdVars) -> Result<String, Error> {
    let mut out = String::new();
    for token in &template.tokens {
        match token {
            Token::Text(text) => out.push_str(text),
            Token::Var(name) => {
                let value = vars
                    .get(name)
                    .ok_or_else(|| Error::UnknownTemplateVar(name.clone()))?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}
