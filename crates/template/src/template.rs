use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::compile::{compile, CompiledShader};
use crate::token::Token;

/// Identity of a template call site, used as the program cache key.
///
/// Two templates with byte-identical text still get different ids unless they
/// come from the same call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(u64);

impl TemplateId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TemplateId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Interpolated value between two text segments.
#[derive(Debug, Clone)]
pub enum Slot {
    Token(Token),
    /// Nested template spliced in place; its tokens join the enclosing compilation.
    Template(ShaderTemplate),
}

/// Interleaved text segments and slots: `text₀ slot₀ text₁ … textₙ`.
#[derive(Debug, Clone)]
pub struct ShaderTemplate {
    id: TemplateId,
    segments: Vec<Cow<'static, str>>,
    slots: Vec<Slot>,
}

impl ShaderTemplate {
    pub fn builder(id: TemplateId) -> TemplateBuilder {
        TemplateBuilder {
            id,
            segments: vec![Cow::Borrowed("")],
            slots: Vec::new(),
        }
    }

    pub fn id(&self) -> TemplateId {
        self.id
    }

    /// Static text; always one longer than [`slots`](Self::slots).
    pub fn segments(&self) -> &[Cow<'static, str>] {
        &self.segments
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Produces the final source and named token list for the current tokens.
    pub fn compile(&self) -> CompiledShader {
        compile(self)
    }
}

/// One piece handed to [`TemplateBuilder::push`].
pub enum Part {
    Text(Cow<'static, str>),
    Token(Token),
    Template(ShaderTemplate),
}

impl From<&'static str> for Part {
    fn from(text: &'static str) -> Self {
        Part::Text(Cow::Borrowed(text))
    }
}

impl From<String> for Part {
    fn from(text: String) -> Self {
        Part::Text(Cow::Owned(text))
    }
}

impl From<Token> for Part {
    fn from(token: Token) -> Self {
        Part::Token(token)
    }
}

impl From<&Token> for Part {
    fn from(token: &Token) -> Self {
        Part::Token(token.clone())
    }
}

impl From<ShaderTemplate> for Part {
    fn from(template: ShaderTemplate) -> Self {
        Part::Template(template)
    }
}

impl From<&ShaderTemplate> for Part {
    fn from(template: &ShaderTemplate) -> Self {
        Part::Template(template.clone())
    }
}

pub struct TemplateBuilder {
    id: TemplateId,
    segments: Vec<Cow<'static, str>>,
    slots: Vec<Slot>,
}

impl TemplateBuilder {
    /// Appends text to the current segment, or closes it with a slot.
    pub fn push(mut self, part: impl Into<Part>) -> Self {
        match part.into() {
            Part::Text(text) => {
                if let Some(last) = self.segments.last_mut() {
                    if last.is_empty() {
                        *last = text;
                    } else {
                        last.to_mut().push_str(&text);
                    }
                }
            }
            Part::Token(token) => self.close_segment(Slot::Token(token)),
            Part::Template(template) => self.close_segment(Slot::Template(template)),
        }
        self
    }

    fn close_segment(&mut self, slot: Slot) {
        self.slots.push(slot);
        self.segments.push(Cow::Borrowed(""));
    }

    pub fn build(self) -> ShaderTemplate {
        ShaderTemplate {
            id: self.id,
            segments: self.segments,
            slots: self.slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructors::uniform;

    #[test]
    fn adjacent_text_merges_into_one_segment() {
        let template = ShaderTemplate::builder(TemplateId::next())
            .push("void ")
            .push(String::from("main"))
            .push(uniform::float(|| 1.0))
            .build();
        assert_eq!(template.segments().len(), 2);
        assert_eq!(template.segments()[0], "void main");
        assert_eq!(template.segments()[1], "");
    }

    #[test]
    fn ids_are_distinct() {
        assert_ne!(TemplateId::next(), TemplateId::next());
    }
}
