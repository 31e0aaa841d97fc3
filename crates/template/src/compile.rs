//! Template-to-source compilation.
//!
//! Compilation is a pure function of the template: it names every distinct
//! token, synthesizes one declaration per shader input and substitutes names at
//! the interpolation sites. Nested templates are flattened first so their
//! tokens share the enclosing namespace.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::template::{ShaderTemplate, Slot, TemplateId};
use crate::token::{Token, TokenId, TokenKind, TokenType};
use crate::types::BufferTarget;

/// A token together with the identifier it was given in one compilation.
#[derive(Debug, Clone)]
pub struct NamedToken {
    pub name: String,
    pub token: Token,
}

/// Final source text plus the tokens it declares, in first-occurrence order.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    template: TemplateId,
    source: String,
    tokens: Vec<NamedToken>,
}

impl CompiledShader {
    pub fn template(&self) -> TemplateId {
        self.template
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[NamedToken] {
        &self.tokens
    }

    pub fn name_of(&self, id: TokenId) -> Option<&str> {
        self.tokens
            .iter()
            .find(|named| named.token.id() == id)
            .map(|named| named.name.as_str())
    }

    /// Names this source declares as `in` or `uniform` inputs.
    pub fn declared_names(&self) -> impl Iterator<Item = &str> {
        self.tokens
            .iter()
            .filter(|named| declaration(named).is_some())
            .map(|named| named.name.as_str())
    }
}

enum Piece<'a> {
    Text(&'a str),
    Token(&'a Token),
}

pub(crate) fn compile(template: &ShaderTemplate) -> CompiledShader {
    let mut pieces = Vec::new();
    flatten(template, &mut pieces);

    let mut seen = HashSet::new();
    let distinct: Vec<&Token> = pieces
        .iter()
        .filter_map(|piece| match piece {
            Piece::Token(token) if seen.insert(token.id()) => Some(*token),
            _ => None,
        })
        .collect();

    let names = assign_names(&distinct);

    let mut body = String::new();
    for piece in &pieces {
        match piece {
            Piece::Text(text) => body.push_str(text),
            Piece::Token(token) => body.push_str(&names[&token.id()]),
        }
    }

    let tokens: Vec<NamedToken> = distinct
        .into_iter()
        .map(|token| NamedToken {
            name: names[&token.id()].clone(),
            token: token.clone(),
        })
        .collect();

    let declarations: Vec<String> = tokens.iter().filter_map(declaration).collect();
    let source = if declarations.is_empty() {
        body
    } else {
        insert_declarations(&body, &declarations)
    };

    trace!(
        template = template.id().get(),
        tokens = tokens.len(),
        declarations = declarations.len(),
        "compiled shader template"
    );

    CompiledShader {
        template: template.id(),
        source,
        tokens,
    }
}

fn flatten<'a>(template: &'a ShaderTemplate, pieces: &mut Vec<Piece<'a>>) {
    let segments = template.segments();
    for (index, segment) in segments.iter().enumerate() {
        if !segment.is_empty() {
            pieces.push(Piece::Text(segment));
        }
        match template.slots().get(index) {
            Some(Slot::Token(token)) => pieces.push(Piece::Token(token)),
            Some(Slot::Template(nested)) => flatten(nested, pieces),
            None => {}
        }
    }
}

fn prefix(token_type: TokenType) -> Option<&'static str> {
    match token_type {
        TokenType::Attribute => Some("a_"),
        TokenType::Uniform | TokenType::Sampler2D => Some("u_"),
        TokenType::Scope => None,
    }
}

fn assign_names(tokens: &[&Token]) -> HashMap<TokenId, String> {
    let mut names = HashMap::with_capacity(tokens.len());
    let mut taken = HashSet::new();

    // Explicit names are claimed first so synthesized ones can step around them.
    for token in tokens {
        match token.kind() {
            TokenKind::Scope(scope) => {
                names.insert(token.id(), scope.name().to_owned());
            }
            _ => {
                if let Some(name) = token.explicit_name() {
                    if taken.insert(name.to_owned()) {
                        names.insert(token.id(), name.to_owned());
                    }
                }
            }
        }
    }

    let mut counters: HashMap<&'static str, usize> = HashMap::new();
    for token in tokens {
        if names.contains_key(&token.id()) {
            continue;
        }
        let Some(prefix) = prefix(token.token_type()) else {
            continue;
        };
        let counter = counters.entry(prefix).or_insert(0);
        let name = loop {
            let candidate = format!("{prefix}{counter}");
            *counter += 1;
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(name.clone());
        names.insert(token.id(), name);
    }
    names
}

fn declaration(named: &NamedToken) -> Option<String> {
    let data_type = named.token.data_type()?;
    match named.token.kind() {
        TokenKind::Attribute(attribute) if attribute.options().target == BufferTarget::Array => {
            Some(format!("in {data_type} {};", named.name))
        }
        TokenKind::Uniform(_) | TokenKind::Sampler2D(_) => {
            Some(format!("uniform {data_type} {};", named.name))
        }
        _ => None,
    }
}

/// Byte offset where the version/extension/precision preamble ends.
fn preamble_end(body: &str) -> usize {
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with("precision") {
            if let Some(semicolon) = line.find(';') {
                if !line[semicolon + 1..].trim().is_empty() {
                    return offset + semicolon + 1;
                }
            }
        } else if !(trimmed.is_empty()
            || trimmed.starts_with("#version")
            || trimmed.starts_with("#extension")
            || trimmed.starts_with("//"))
        {
            return offset;
        }
        offset += line.len();
    }
    offset
}

fn insert_declarations(body: &str, declarations: &[String]) -> String {
    let split = preamble_end(body);
    let (preamble, rest) = body.split_at(split);
    let mut source = String::with_capacity(body.len() + declarations.len() * 24);
    source.push_str(preamble);
    if !preamble.is_empty() && !preamble.ends_with('\n') {
        source.push('\n');
    }
    for line in declarations {
        source.push_str(line);
        source.push('\n');
    }
    source.push_str(rest.trim_start_matches([' ', '\t']));
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructors::{attribute, uniform};
    use crate::template::ShaderTemplate;
    use crate::token::{Token, UniformOptions};

    fn build(parts: Vec<crate::template::Part>) -> ShaderTemplate {
        parts
            .into_iter()
            .fold(ShaderTemplate::builder(TemplateId::next()), |builder, part| {
                builder.push(part)
            })
            .build()
    }

    #[test]
    fn float_and_mat4_uniforms_declared_before_body() {
        let time = uniform::float(|| 0.5);
        let matrix = uniform::mat4(|| [0.0; 16]);
        let template = build(vec![
            "#version 300 es\nprecision highp float;\nout vec4 color;\nvoid main() { color = vec4(".into(),
            time.into(),
            ") * ".into(),
            matrix.into(),
            "[0]; }".into(),
        ]);
        let compiled = template.compile();
        assert_eq!(
            compiled.source(),
            "#version 300 es\nprecision highp float;\nuniform float u_0;\nuniform mat4 u_1;\n\
             out vec4 color;\nvoid main() { color = vec4(u_0) * u_1[0]; }"
        );
        let names: Vec<_> = compiled.tokens().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["u_0", "u_1"]);
    }

    #[test]
    fn compiling_twice_is_byte_identical() {
        let position = attribute::vec2(|| vec![0.0_f32; 6]).unwrap();
        let tint = uniform::vec4(|| [1.0; 4]);
        let template = build(vec![
            "#version 300 es\nvoid main() { gl_Position = vec4(".into(),
            position.into(),
            ", 0.0, 1.0) * ".into(),
            tint.into(),
            "; }".into(),
        ]);
        assert_eq!(template.compile().source(), template.compile().source());
    }

    #[test]
    fn reused_token_is_declared_once() {
        let scale = uniform::float(|| 2.0);
        let template = build(vec![
            "void main() { float a = ".into(),
            (&scale).into(),
            "; float b = ".into(),
            (&scale).into(),
            "; }".into(),
        ]);
        let compiled = template.compile();
        assert_eq!(compiled.source().matches("uniform float u_0;").count(), 1);
        assert!(compiled.source().contains("a = u_0; float b = u_0;"));
        assert_eq!(compiled.tokens().len(), 1);
    }

    #[test]
    fn attributes_and_uniforms_count_separately() {
        let position = attribute::vec3(|| vec![0.0_f32; 3]).unwrap();
        let time = uniform::float(|| 0.0);
        let template = build(vec!["".into(), position.into(), " ".into(), time.into()]);
        let compiled = template.compile();
        assert_eq!(
            compiled.source(),
            "in vec3 a_0;\nuniform float u_0;\na_0 u_0"
        );
    }

    #[test]
    fn explicit_names_win_and_counters_skip_them() {
        let first = uniform::float(|| 0.0);
        let named = uniform::float_with(|| 0.0, UniformOptions { name: Some("u_0".into()) });
        let duplicate = uniform::int_with(|| 1, UniformOptions { name: Some("u_0".into()) });
        let template = build(vec![
            first.clone().into(),
            " ".into(),
            named.clone().into(),
            " ".into(),
            duplicate.clone().into(),
        ]);
        let compiled = template.compile();
        assert_eq!(compiled.name_of(named.id()), Some("u_0"));
        assert_eq!(compiled.name_of(first.id()), Some("u_1"));
        assert_eq!(compiled.name_of(duplicate.id()), Some("u_2"));
        let declared: HashSet<_> = compiled.declared_names().collect();
        assert_eq!(declared.len(), 3);
    }

    #[test]
    fn no_tokens_yields_concatenated_text() {
        let template = build(vec!["#version 300 es\n".into(), "void main() {}".into()]);
        assert_eq!(template.compile().source(), "#version 300 es\nvoid main() {}");
    }

    #[test]
    fn scope_and_index_tokens_are_not_declared() {
        let indices = attribute::indices(|| vec![0_u16, 1, 2]).unwrap();
        let reference = Token::scope("v_color").unwrap();
        let template = build(vec![
            "out vec4 c; void main() { c = ".into(),
            reference.into(),
            "; }".into(),
            indices.clone().into(),
        ]);
        let compiled = template.compile();
        assert!(!compiled.source().contains("uniform"));
        assert!(!compiled.source().contains(" in "));
        assert!(compiled.source().contains("c = v_color;"));
        assert_eq!(compiled.name_of(indices.id()), Some("a_0"));
    }

    #[test]
    fn nested_template_tokens_join_the_outer_namespace() {
        let outer_color = uniform::vec4(|| [1.0; 4]).with_name("u_tint");
        let inner_scale = uniform::float(|| 3.0);
        let inner = build(vec![
            "vec4 shade() { return ".into(),
            Token::scope("u_tint").unwrap().into(),
            " * ".into(),
            inner_scale.into(),
            "; }\n".into(),
        ]);
        let outer = build(vec![
            "#version 300 es\nprecision mediump float; out vec4 c;\n".into(),
            inner.into(),
            "void main() { c = shade() + ".into(),
            outer_color.into(),
            "; }".into(),
        ]);
        let compiled = outer.compile();
        assert_eq!(
            compiled.source(),
            "#version 300 es\nprecision mediump float;\nuniform float u_0;\nuniform vec4 u_tint;\n\
             out vec4 c;\nvec4 shade() { return u_tint * u_0; }\nvoid main() { c = shade() + u_tint; }"
        );
    }
}
